use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{Cipher, CryptoError, OneTimeKey};
use crate::error::SecretError;
use crate::store::SecretStore;
use crate::token::{self, Token, TokenKey};

/// Random bytes in a storage id (128 bits, 32 hex characters).
const STORAGE_ID_BYTES: usize = 16;

/// Ties the cipher, the store and the token codec together.
///
/// Holds no mutable state of its own; share it behind an `Arc` and call it
/// from any number of handlers. Exactly-once redemption rests entirely on
/// [`SecretStore::get_and_delete`].
pub struct SecretEngine {
    store: Arc<dyn SecretStore>,
    cipher: Cipher,
    key_prefix: String,
}

impl SecretEngine {
    /// `key_prefix` namespaces storage keys so several deployments can share
    /// one store. It must be URL-safe and must not contain the separator.
    pub fn new(
        store: Arc<dyn SecretStore>,
        cipher: Cipher,
        key_prefix: impl Into<String>,
    ) -> Result<Self, SecretError> {
        let key_prefix = key_prefix.into();
        if let Some(c) = key_prefix.chars().find(|c| !token::is_prefix_char(*c)) {
            return Err(SecretError::invalid(format!(
                "storage key prefix contains unsupported character {c:?}"
            )));
        }
        Ok(Self {
            store,
            cipher,
            key_prefix,
        })
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// Encrypt `plaintext` under a fresh key, park the ciphertext for `ttl`
    /// and return the token that can take it back exactly once.
    ///
    /// Performs exactly one store write, and none when validation fails.
    pub fn submit(&self, plaintext: &str, ttl: Duration) -> Result<String, SecretError> {
        if plaintext.is_empty() {
            return Err(SecretError::invalid("secret must not be empty"));
        }
        if ttl.is_zero() {
            return Err(SecretError::invalid("ttl must be positive"));
        }

        let key = self.cipher.generate_key();
        let ciphertext = self
            .cipher
            .encrypt(plaintext.as_bytes(), &key)
            .map_err(SecretError::Encryption)?;
        let storage_key = self.new_storage_key();

        self.store.set_with_ttl(&storage_key, &ciphertext, ttl)?;
        info!(storage_key = %storage_key, ttl_secs = ttl.as_secs(), "secret submitted");

        Ok(token::encode(&Token::sealed(storage_key, key.encode())))
    }

    /// Take the secret behind `token`. The record is deleted before
    /// decryption is attempted, so a failed decrypt still burns it.
    pub fn redeem_bytes(&self, token: &str) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        let Token { storage_key, key } = token::decode(token);
        if storage_key.is_empty() {
            return Err(SecretError::NotFound);
        }

        let stored = match self.store.get_and_delete(&storage_key) {
            Ok(Some(bytes)) => Zeroizing::new(bytes),
            Ok(None) => {
                debug!(storage_key = %storage_key, "redeem: not found or expired");
                return Err(SecretError::NotFound);
            }
            Err(e) => {
                let e = SecretError::from(e);
                if matches!(e, SecretError::Decryption(_)) {
                    warn!(storage_key = %storage_key, error = %e, "redeem: stored record unreadable; purged");
                }
                return Err(e);
            }
        };

        match key {
            TokenKey::Sealed(encoded) => {
                let plaintext = OneTimeKey::decode(&encoded)
                    .and_then(|key| self.cipher.decrypt(&stored, &key))
                    .map_err(|e| {
                        warn!(storage_key = %storage_key, error = %e, "redeem: decryption failed; record purged");
                        SecretError::Decryption(e)
                    })?;
                info!(storage_key = %storage_key, "secret redeemed");
                Ok(Zeroizing::new(plaintext))
            }
            TokenKey::Legacy => {
                info!(storage_key = %storage_key, "legacy secret redeemed without decryption");
                Ok(stored)
            }
        }
    }

    /// [`SecretEngine::redeem_bytes`] for text secrets.
    pub fn redeem(&self, token: &str) -> Result<String, SecretError> {
        let bytes = self.redeem_bytes(token)?;
        // Submitted secrets are always text; anything else was not minted here.
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SecretError::Decryption(CryptoError::MalformedCiphertext))
    }

    /// Whether `token` still points at a live record. Does not consume it.
    pub fn exists(&self, token: &str) -> Result<bool, SecretError> {
        let Token { storage_key, .. } = token::decode(token);
        if storage_key.is_empty() {
            return Ok(false);
        }
        Ok(self.store.exists(&storage_key)?)
    }

    fn new_storage_key(&self) -> String {
        let mut id = [0u8; STORAGE_ID_BYTES];
        self.cipher.fill_random(&mut id);
        format!("{}{}", self.key_prefix, hex::encode(id))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::store::{MemoryStore, StoreError};

    const DAY: Duration = Duration::from_secs(86400);

    fn engine() -> (SecretEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = SecretEngine::new(store.clone(), Cipher::new(), "snapsecret").unwrap();
        (engine, store)
    }

    /// A store whose backend is unreachable.
    struct DownStore;

    impl SecretStore for DownStore {
        fn set_with_ttl(&self, _: &str, _: &[u8], _: Duration) -> Result<(), StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        fn get_and_delete(&self, _: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        fn exists(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        fn purge_expired(&self) -> Result<usize, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
    }

    #[test]
    fn round_trip() {
        let (e, _) = engine();
        for secret in ["x", "correct horse battery staple", "ünïcødé ✓", "a~b~c"] {
            let token = e.submit(secret, DAY).unwrap();
            assert_eq!(e.redeem(&token).unwrap(), secret);
        }
    }

    #[test]
    fn second_redeem_is_not_found() {
        let (e, store) = engine();
        let token = e.submit("once", DAY).unwrap();
        assert_eq!(e.redeem(&token).unwrap(), "once");
        assert!(matches!(e.redeem(&token), Err(SecretError::NotFound)));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn token_shape() {
        let (e, _) = engine();
        let token = e.submit("s", DAY).unwrap();
        let (storage_key, key) = token.split_once(token::SEPARATOR).unwrap();
        let id = storage_key.strip_prefix("snapsecret").unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(OneTimeKey::decode(key).is_ok());
    }

    #[test]
    fn store_never_sees_the_key_or_plaintext() {
        let (e, store) = engine();
        let token = e.submit("hunter2", DAY).unwrap();
        let Token { storage_key, key } = token::decode(&token);
        let TokenKey::Sealed(encoded_key) = key else {
            panic!("expected a sealed token");
        };
        let raw = store.get_and_delete(&storage_key).unwrap().unwrap();
        let key_bytes = OneTimeKey::decode(&encoded_key).unwrap();
        assert!(!raw.windows(7).any(|w| w == b"hunter2"));
        assert!(!raw.windows(32).any(|w| w == key_bytes.as_bytes()));
    }

    #[test]
    fn rejects_bad_input_without_writing() {
        let (e, store) = engine();
        assert!(matches!(e.submit("", DAY), Err(SecretError::InvalidInput(_))));
        assert!(matches!(
            e.submit("x", Duration::ZERO),
            Err(SecretError::InvalidInput(_))
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn rejects_unsafe_prefix() {
        let store = Arc::new(MemoryStore::new());
        assert!(SecretEngine::new(store.clone(), Cipher::new(), "a~b").is_err());
        assert!(SecretEngine::new(store.clone(), Cipher::new(), "a/b").is_err());
        assert!(SecretEngine::new(store, Cipher::new(), "").is_ok());
    }

    #[test]
    fn exists_does_not_consume() {
        let (e, _) = engine();
        let token = e.submit("peek", DAY).unwrap();
        assert!(e.exists(&token).unwrap());
        assert!(e.exists(&token).unwrap());
        assert_eq!(e.redeem(&token).unwrap(), "peek");
        assert!(!e.exists(&token).unwrap());
    }

    #[test]
    fn expired_secret_is_not_found() {
        let (e, _) = engine();
        let token = e.submit("short-lived", Duration::from_millis(20)).unwrap();
        thread::sleep(Duration::from_millis(40));
        assert!(!e.exists(&token).unwrap());
        assert!(matches!(e.redeem(&token), Err(SecretError::NotFound)));
    }

    #[test]
    fn wrong_key_burns_the_record() {
        let (e, _) = engine();
        let token = e.submit("guarded", DAY).unwrap();
        let Token { storage_key, .. } = token::decode(&token);
        let forged = token::encode(&Token::sealed(
            storage_key,
            Cipher::new().generate_key().encode(),
        ));

        let err = e.redeem(&forged).unwrap_err();
        assert!(matches!(err, SecretError::Decryption(CryptoError::Authentication)));
        assert!(err.is_not_found());
        // Fail-closed: the genuine token is now dead too.
        assert!(matches!(e.redeem(&token), Err(SecretError::NotFound)));
    }

    #[test]
    fn malformed_key_is_decryption_error() {
        let (e, _) = engine();
        let token = e.submit("guarded", DAY).unwrap();
        let Token { storage_key, .. } = token::decode(&token);
        let err = e.redeem(&format!("{storage_key}~not*base64")).unwrap_err();
        assert!(matches!(err, SecretError::Decryption(CryptoError::MalformedKey)));
    }

    #[test]
    fn every_flipped_bit_is_rejected() {
        let (e, store) = engine();
        let victim = e.submit("tamper me", DAY).unwrap();
        let Token { storage_key, .. } = token::decode(&victim);
        let original = store.get_and_delete(&storage_key).unwrap().unwrap();

        for bit in 0..original.len() * 8 {
            let mut tampered = original.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            store.set_with_ttl(&storage_key, &tampered, DAY).unwrap();

            let err = e.redeem(&victim).unwrap_err();
            assert!(matches!(err, SecretError::Decryption(_)), "bit {bit}: {err}");
            assert!(err.is_not_found());
        }
    }

    #[test]
    fn legacy_token_returns_stored_value_verbatim() {
        let (e, store) = engine();
        store
            .set_with_ttl("snapsecretlegacy", b"plain old secret", DAY)
            .unwrap();
        assert!(e.exists("snapsecretlegacy").unwrap());
        assert_eq!(e.redeem("snapsecretlegacy").unwrap(), "plain old secret");
        assert!(matches!(
            e.redeem("snapsecretlegacy"),
            Err(SecretError::NotFound)
        ));
    }

    #[test]
    fn garbage_tokens_are_not_found() {
        let (e, _) = engine();
        for t in ["", "~", "~~~", "nope", "nope~", "nope~abc~def"] {
            assert!(!e.exists(t).unwrap(), "{t:?}");
            let err = e.redeem(t).unwrap_err();
            assert!(err.is_not_found(), "{t:?}: {err}");
        }
    }

    #[test]
    fn seeded_engines_mint_identical_tokens() {
        let mk = || {
            SecretEngine::new(Arc::new(MemoryStore::new()), Cipher::seeded(42), "t-").unwrap()
        };
        let (a, b) = (mk(), mk());
        assert_eq!(a.submit("same", DAY).unwrap(), b.submit("same", DAY).unwrap());
    }

    #[test]
    fn unavailable_store_fails_submit_and_redeem() {
        let e = SecretEngine::new(Arc::new(DownStore), Cipher::new(), "snapsecret").unwrap();
        assert!(matches!(
            e.submit("x", Duration::from_secs(3600)),
            Err(SecretError::StoreUnavailable(_))
        ));
        let err = e.redeem("snapsecretabc~key").unwrap_err();
        assert!(matches!(err, SecretError::StoreUnavailable(_)));
        assert!(!err.is_not_found());
        assert!(matches!(
            e.exists("snapsecretabc"),
            Err(SecretError::StoreUnavailable(_))
        ));
    }
}
