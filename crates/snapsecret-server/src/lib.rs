use std::sync::Arc;

pub mod crypto;
pub mod dirs;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod link;
pub mod server;
pub mod store;
pub mod token;
pub mod ttl;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<engine::SecretEngine>,
    pub ttl_policy: ttl::TtlPolicy,
    pub links: link::LinkConfig,
}

pub use crypto::Cipher;
pub use engine::SecretEngine;
pub use error::SecretError;
pub use server::{build_router, open_store, run, ServerConfig, StoreBackend};
pub use store::{MemoryStore, RedbStore, SecretStore, StoreError};
pub use ttl::{TtlChoice, TtlPolicy};
