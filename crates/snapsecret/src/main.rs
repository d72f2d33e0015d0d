use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use snapsecret_server::{link::LinkConfig, ServerConfig, StoreBackend, TtlChoice};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "snapsecret",
    about = "snapsecret: share a secret through a link that works exactly once",
    version
)]
struct Cli {
    /// snapsecret server URL (default: http://localhost:8080 or $SNAPSECRET_SERVER)
    #[arg(long, env = "SNAPSECRET_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the snapsecret HTTP server
    Serve(ServeArgs),
    /// Store a secret and print its one-time link
    Share {
        /// The secret. Read from stdin when omitted.
        secret: Option<String>,
        /// How long the link stays valid: hour, day or week
        #[arg(long, default_value = "day")]
        ttl: TtlChoice,
    },
    /// Check whether a link is still live, without using it up
    Peek {
        /// Token or full share link
        token: String,
    },
    /// Reveal a secret. The link stops working afterwards.
    Reveal {
        /// Token or full share link
        token: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Port to listen on (default: $SNAPSECRET_PORT or 8080)
    #[arg(long, env = "SNAPSECRET_PORT", default_value = "8080")]
    port: u16,
    /// Host to bind (default: $SNAPSECRET_HOST or 0.0.0.0)
    #[arg(long, env = "SNAPSECRET_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Storage backend: memory or redb
    #[arg(long, env = "SNAPSECRET_STORE", default_value = "redb")]
    store: StoreBackend,
    /// Directory for snapsecret.db (redb backend only)
    #[arg(long, env = "SNAPSECRET_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// Namespace prepended to every storage key
    #[arg(long, env = "SNAPSECRET_PREFIX", default_value = "snapsecret")]
    prefix: String,
    /// Base URL for share links; the request's Host header is used when unset
    #[arg(long, env = "SNAPSECRET_PUBLIC_URL")]
    public_url: Option<String>,
    /// Build share links with http:// instead of https://
    #[arg(long, env = "SNAPSECRET_NO_SSL")]
    no_ssl: bool,
    /// Path segment inserted before /secrets in share links
    #[arg(long, env = "SNAPSECRET_URL_PREFIX")]
    url_prefix: Option<String>,
    /// Comma-separated allowed CORS origins (default: any)
    #[arg(long, env = "SNAPSECRET_CORS_ORIGINS")]
    cors_origins: Option<String>,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            backend: self.store,
            data_dir: self.data_dir,
            key_prefix: self.prefix,
            links: LinkConfig {
                public_url: self.public_url,
                no_ssl: self.no_ssl,
                url_prefix: self.url_prefix,
            },
            cors_origins: self.cors_origins,
            ..Default::default()
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SNAPSECRET_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => snapsecret_server::run(args.into_config()).await,
        Commands::Share { secret, ttl } => cmd_share(&cli.server, secret, ttl).await,
        Commands::Peek { token } => cmd_peek(&cli.server, &token).await,
        Commands::Reveal { token } => cmd_reveal(&cli.server, &token).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_share(server: &str, secret: Option<String>, ttl: TtlChoice) -> Result<()> {
    let secret = match secret {
        Some(s) => s,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read secret from stdin")?;
            // Drop the newline a shell pipe appends.
            buf.trim_end_matches(['\r', '\n']).to_owned()
        }
    };
    if secret.is_empty() {
        anyhow::bail!("refusing to share an empty secret");
    }

    let body = serde_json::json!({ "secret": secret, "ttl": ttl });
    let resp = Client::new()
        .post(format!("{}/secrets", server.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!("server returned {status}: {}", error_of(&json));
    }

    match json["link"].as_str() {
        Some(link) => println!("{link}"),
        None => println!("{}", json["token"].as_str().unwrap_or_default()),
    }
    Ok(())
}

async fn cmd_peek(server: &str, token: &str) -> Result<()> {
    let resp = Client::new()
        .get(secret_url(server, token))
        .send()
        .await
        .context("HTTP request failed")?;

    match resp.status() {
        StatusCode::OK => println!("✓ secret is waiting to be revealed"),
        StatusCode::NOT_FOUND => println!("✗ no such secret (already revealed or expired)"),
        status => anyhow::bail!("server returned {status}"),
    }
    Ok(())
}

async fn cmd_reveal(server: &str, token: &str) -> Result<()> {
    let resp = Client::new()
        .post(secret_url(server, token))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if status.is_success() {
        println!("{}", json["secret"].as_str().unwrap_or_default());
        Ok(())
    } else if status == StatusCode::NOT_FOUND {
        anyhow::bail!("secret not found (already revealed or expired)")
    } else {
        anyhow::bail!("server returned {status}: {}", error_of(&json))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Accept either a bare token or a share link and return the token part.
fn token_of(input: &str) -> &str {
    let trimmed = input.trim().trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, last)) if trimmed.contains("://") => last,
        _ => trimmed,
    }
}

fn secret_url(server: &str, token: &str) -> String {
    format!(
        "{}/secrets/{}",
        server.trim_end_matches('/'),
        token_of(token)
    )
}

fn error_of(json: &Value) -> &str {
    json["error"].as_str().unwrap_or("unknown error")
}
