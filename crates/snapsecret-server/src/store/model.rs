use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Stored in redb as bincode-encoded bytes.
/// `value` is whatever the engine handed over (ciphertext for every token
/// minted by this crate). Expiry is plaintext so the sweep never needs a key.
#[derive(Debug, Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct StoredRecord {
    pub value: Vec<u8>,
    /// Unix timestamp (milliseconds) when the record was written.
    pub created_at_ms: u64,
    /// Unix timestamp (milliseconds) at and after which the record is gone.
    pub expires_at_ms: u64,
}

impl StoredRecord {
    pub fn new(value: &[u8], ttl: Duration, now_ms: u64) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        Self {
            value: value.to_vec(),
            created_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(ttl_ms),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_is_already_expired() {
        let record = StoredRecord::new(b"v", Duration::ZERO, 1_000);
        assert!(record.is_expired(1_000));
    }

    #[test]
    fn expires_exactly_at_deadline() {
        let record = StoredRecord::new(b"v", Duration::from_secs(2), 1_000);
        assert!(!record.is_expired(2_999));
        assert!(record.is_expired(3_000));
    }

    #[test]
    fn huge_ttl_saturates() {
        let record = StoredRecord::new(b"v", Duration::MAX, 1_000);
        assert_eq!(record.expires_at_ms, u64::MAX);
        assert!(!record.is_expired(now_ms()));
    }
}
