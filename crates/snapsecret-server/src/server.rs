use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    crypto::Cipher,
    engine::SecretEngine,
    handlers::{create_secret, health, preview_secret, redeem_secret, MAX_CREATE_BODY_BYTES},
    link::LinkConfig,
    store::{self, MemoryStore, RedbStore, SecretStore},
    ttl::TtlPolicy,
    AppState,
};

/// Which [`SecretStore`] implementation backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Lost on restart. Suitable for tests and throwaway instances.
    Memory,
    /// `snapsecret.db` in the data directory.
    Redb,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redb" => Ok(Self::Redb),
            other => anyhow::bail!("unknown store backend '{other}' (expected memory or redb)"),
        }
    }
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backend: StoreBackend,
    pub data_dir: Option<PathBuf>,
    /// Namespace for storage keys (`$SNAPSECRET_PREFIX`).
    pub key_prefix: String,
    pub links: LinkConfig,
    pub ttl_policy: TtlPolicy,
    pub sweep_interval: Duration,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SNAPSECRET_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("SNAPSECRET_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            backend: std::env::var("SNAPSECRET_STORE")
                .ok()
                .and_then(|b| b.parse().ok())
                .unwrap_or(StoreBackend::Redb),
            data_dir: std::env::var("SNAPSECRET_DATA_DIR").ok().map(PathBuf::from),
            key_prefix: std::env::var("SNAPSECRET_PREFIX").unwrap_or_else(|_| "snapsecret".into()),
            links: LinkConfig {
                public_url: std::env::var("SNAPSECRET_PUBLIC_URL").ok(),
                no_ssl: std::env::var("SNAPSECRET_NO_SSL")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
                url_prefix: std::env::var("SNAPSECRET_URL_PREFIX").ok(),
            },
            ttl_policy: TtlPolicy::default(),
            sweep_interval: Duration::from_secs(300),
            cors_origins: std::env::var("SNAPSECRET_CORS_ORIGINS").ok(),
        }
    }
}

/// Open the configured backend.
pub fn open_store(cfg: &ServerConfig) -> Result<Arc<dyn SecretStore>> {
    match cfg.backend {
        StoreBackend::Memory => {
            info!("using in-memory store; secrets do not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redb => {
            let data_dir = crate::dirs::data_dir(cfg.data_dir.as_deref())?;
            let db_path = data_dir.join("snapsecret.db");
            info!(path = %db_path.display(), "using redb store");
            let store = RedbStore::open(&db_path).context("open store")?;
            Ok(Arc::new(store))
        }
    }
}

/// The full HTTP surface, ready to serve or to drive from tests.
pub fn build_router(state: AppState, cors_origins: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/secrets",
            post(create_secret).layer(DefaultBodyLimit::max(MAX_CREATE_BODY_BYTES)),
        )
        .route("/secrets/{token}", get(preview_secret).post(redeem_secret))
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let store = open_store(&cfg)?;

    // A store that is down at startup is fatal; per-request failures are not.
    store
        .ping()
        .context("store health check failed; refusing to start")?;

    store::spawn_sweep(store.clone(), cfg.sweep_interval);

    let engine = SecretEngine::new(store, Cipher::new(), cfg.key_prefix.clone())
        .context("invalid SNAPSECRET_PREFIX")?;

    let state = AppState {
        engine: Arc::new(engine),
        ttl_policy: cfg.ttl_policy.clone(),
        links: cfg.links.clone(),
    };

    let app = build_router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "snapsecret server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
