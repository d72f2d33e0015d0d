use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{error::SecretError, ttl::TtlChoice, AppState};

/// Largest secret accepted, in bytes.
pub const MAX_SECRET_BYTES: usize = 1_048_576;

/// Body limit for `POST /secrets`. JSON escaping can grow a secret up to six
/// times (`\u00XX`), so the wire size of a secret at the cap exceeds it.
pub const MAX_CREATE_BODY_BYTES: usize = 6 * MAX_SECRET_BYTES + 4096;

/// Chat apps fetch links to render previews. Answering them as if the
/// secret did not exist keeps an unfurl from revealing that it does.
const LINK_PREVIEW_AGENTS: &[&str] = &[
    "Slackbot",
    "facebookexternalhit",
    "Twitterbot",
    "Facebot",
    "WhatsApp",
    "SkypeUriPreview",
    "Iframely",
    "Google",
];

pub fn is_link_preview_agent(headers: &HeaderMap) -> bool {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| LINK_PREVIEW_AGENTS.iter().any(|bot| ua.contains(bot)))
}

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> Response {
    match state.engine.store().ping() {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(e) => {
            warn!(error = %e, "health check: store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable"})),
            )
                .into_response()
        }
    }
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub secret: String,
    pub ttl: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub token: String,
    pub link: Option<String>,
    pub ttl: TtlChoice,
    pub expires_in_seconds: u64,
}

pub async fn create_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateRequest>,
) -> Response {
    if body.secret.is_empty() {
        return bad_request("secret must not be empty");
    }
    if body.secret.len() > MAX_SECRET_BYTES {
        return bad_request("secret exceeds 1 MiB limit");
    }
    let choice = match body.ttl.as_deref().map(str::trim) {
        None | Some("") => return bad_request("ttl is required (hour, day or week)"),
        Some(raw) => match raw.parse::<TtlChoice>() {
            Ok(choice) => choice,
            Err(e) => return bad_request(&e.to_string()),
        },
    };
    let ttl = state.ttl_policy.duration(choice);

    match state.engine.submit(&body.secret, ttl) {
        Ok(token) => {
            info!(ttl = %choice, "secret created via api");
            let link = state.links.share_link(&headers, &token);
            (
                StatusCode::CREATED,
                Json(CreateResponse {
                    token,
                    link,
                    ttl: choice,
                    expires_in_seconds: ttl.as_secs(),
                }),
            )
                .into_response()
        }
        Err(e) => secret_error(e),
    }
}

// ── Preview ───────────────────────────────────────────────────────────────────

pub async fn preview_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Response {
    if is_link_preview_agent(&headers) {
        return not_found();
    }
    match state.engine.exists(&token) {
        Ok(true) => Json(json!({"exists": true})).into_response(),
        Ok(false) => not_found(),
        Err(e) => secret_error(e),
    }
}

// ── Redeem ────────────────────────────────────────────────────────────────────

pub async fn redeem_secret(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    match state.engine.redeem(&token) {
        Ok(secret) => (
            [(header::CACHE_CONTROL, "no-store")],
            Json(json!({ "secret": secret })),
        )
            .into_response(),
        Err(e) => secret_error(e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
}

/// Collapse engine errors into the four responses a client may see.
/// A decryption failure answers exactly like a miss.
fn secret_error(e: SecretError) -> Response {
    if e.is_not_found() {
        return not_found();
    }
    match e {
        SecretError::InvalidInput(msg) => bad_request(&msg),
        e => {
            tracing::error!(error = %e, "internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal server error"})),
            )
                .into_response()
        }
    }
}
