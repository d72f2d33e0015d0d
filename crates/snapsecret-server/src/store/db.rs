use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use super::model::{now_ms, StoredRecord};
use super::{SecretStore, StoreError};

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Thread-safe handle to the redb store.
///
/// redb runs one write transaction at a time, so removing a row inside a
/// write transaction is an atomic take.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::unavailable)?;

        // Ensure the table exists so read transactions never miss it.
        let write_txn = db.begin_write().map_err(StoreError::unavailable)?;
        write_txn
            .open_table(SECRETS)
            .map_err(StoreError::unavailable)?;
        write_txn.commit().map_err(StoreError::unavailable)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn take_raw(&self, key: &str) -> Result<Option<Vec<u8>>, redb::Error> {
        let write_txn = self.db.begin_write()?;
        let raw = {
            let mut table = write_txn.open_table(SECRETS)?;
            // Copy out immediately so the guard's borrow of `table` ends.
            let removed = table.remove(key)?.map(|guard| guard.value().to_vec());
            removed
        };
        write_txn.commit()?;
        Ok(raw)
    }

    fn peek_raw(&self, key: &str) -> Result<Option<Vec<u8>>, redb::Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        let raw = table.get(key)?.map(|guard| guard.value().to_vec());
        Ok(raw)
    }

    fn insert_raw(&self, key: &str, bytes: &[u8]) -> Result<(), redb::Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            table.insert(key, bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn purge_raw(&self, now: u64) -> Result<usize, redb::Error> {
        // Collect expired keys in a read pass first.
        let expired_keys: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SECRETS)?;
            let mut keys = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                // Undecodable rows are garbage too.
                let expired = decode(k.value(), v.value())
                    .map(|record| record.is_expired(now))
                    .unwrap_or(true);
                if expired {
                    keys.push(k.value().to_owned());
                }
            }
            keys
        };

        if expired_keys.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        let mut removed = 0usize;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            for key in &expired_keys {
                // Re-check: a row might have been taken since the read pass.
                let still_expired = match table.get(key.as_str())? {
                    Some(guard) => decode(key, guard.value())
                        .map(|record| record.is_expired(now))
                        .unwrap_or(true),
                    None => false,
                };
                if still_expired {
                    table.remove(key.as_str())?;
                    removed += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(removed)
    }
}

impl SecretStore for RedbStore {
    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let record = StoredRecord::new(value, ttl, now_ms());
        let bytes = encode(&record)?;
        self.insert_raw(key, &bytes)
            .map_err(StoreError::unavailable)?;
        debug!(storage_key = %key, ttl_secs = ttl.as_secs(), "stored secret");
        Ok(())
    }

    fn get_and_delete(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = now_ms();
        let Some(raw) = self.take_raw(key).map_err(StoreError::unavailable)? else {
            return Ok(None);
        };
        // The row is gone whatever happens below.
        let record = decode(key, &raw)?;
        if record.is_expired(now) {
            debug!(storage_key = %key, "lazy-evicted expired secret");
            return Ok(None);
        }
        Ok(Some(record.value.clone()))
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = now_ms();
        match self.peek_raw(key).map_err(StoreError::unavailable)? {
            None => Ok(false),
            Some(raw) => Ok(!decode(key, &raw)?.is_expired(now)),
        }
    }

    fn ping(&self) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::unavailable)?;
        read_txn
            .open_table(SECRETS)
            .map_err(StoreError::unavailable)?;
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let removed = self.purge_raw(now_ms()).map_err(StoreError::unavailable)?;
        if removed > 0 {
            info!(removed, "pruned expired secrets");
        }
        Ok(removed)
    }
}

fn encode(record: &StoredRecord) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(record, bincode::config::standard())
        .map_err(StoreError::unavailable)
}

fn decode(key: &str, bytes: &[u8]) -> Result<StoredRecord, StoreError> {
    let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Corrupt {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;
    Ok(record)
}
