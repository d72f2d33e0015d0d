//! Ephemeral key-value storage with mandatory expiry.
//!
//! The engine only sees [`SecretStore`]. Two backends ship here:
//!
//! - [`MemoryStore`] - a mutex-guarded map, for tests and single-process use
//! - [`RedbStore`] - an on-disk redb database that survives restarts
//!
//! Both guarantee that [`SecretStore::get_and_delete`] hands a value to at
//! most one caller.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time;
use tracing::{debug, warn};

pub mod db;
pub mod memory;
pub mod model;

pub use db::RedbStore;
pub use memory::MemoryStore;
pub use model::StoredRecord;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] BoxError),
    /// A record exists but its bytes could not be decoded.
    #[error("corrupt record under {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    pub fn unavailable(e: impl Into<BoxError>) -> Self {
        Self::Unavailable(e.into())
    }
}

pub trait SecretStore: Send + Sync {
    /// Store `value` under `key`; the key becomes unreadable once `ttl`
    /// elapses. Keys are always fresh, overwriting is never relied upon.
    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Atomically return and remove the value under `key`. `None` if the key
    /// never existed, already expired or was already taken.
    fn get_and_delete(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Non-destructive check. Never extends the TTL.
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Cheap liveness check.
    fn ping(&self) -> Result<(), StoreError>;

    /// Drop every expired record. Returns how many were removed.
    fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// Spawn a background Tokio task that calls `purge_expired()` every `interval`.
pub fn spawn_sweep(store: Arc<dyn SecretStore>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // skip first immediate tick
        loop {
            ticker.tick().await;
            match store.purge_expired() {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "swept expired secrets"),
                Err(e) => warn!(error = %e, "background sweep error"),
            }
        }
    });
}
