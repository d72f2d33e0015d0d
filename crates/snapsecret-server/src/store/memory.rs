use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;
use zeroize::Zeroizing;

use super::{SecretStore, StoreError};

struct Entry {
    value: Zeroizing<Vec<u8>>,
    /// `None` when `now + ttl` overflows `Instant`, i.e. effectively never.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }
}

/// In-process store. A single mutex covers every operation, so read and
/// delete in [`SecretStore::get_and_delete`] can never interleave.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))
    }

    /// Number of records held, expired or not.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }
}

impl SecretStore for MemoryStore {
    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let entry = Entry {
            value: Zeroizing::new(value.to_vec()),
            expires_at: Instant::now().checked_add(ttl),
        };
        self.lock()?.insert(key.to_owned(), entry);
        debug!(storage_key = %key, ttl_secs = ttl.as_secs(), "stored secret");
        Ok(())
    }

    fn get_and_delete(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let Some(entry) = self.lock()?.remove(key) else {
            return Ok(None);
        };
        if entry.is_expired(now) {
            debug!(storage_key = %key, "lazy-evicted expired secret");
            return Ok(None);
        }
        Ok(Some(entry.value.to_vec()))
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries.get(key).is_some_and(|e| !e.is_expired(now)))
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        Ok(before - entries.len())
    }
}
