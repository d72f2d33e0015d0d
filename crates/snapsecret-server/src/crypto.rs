use std::sync::{Mutex, PoisonError};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use thiserror::Error;
use zeroize::ZeroizeOnDrop;

/// Leading byte of every sealed blob. Bumped if the layout ever changes.
const FORMAT_V1: u8 = 0x01;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("decryption key is malformed")]
    MalformedKey,
    #[error("ciphertext is malformed")]
    MalformedCiphertext,
    #[error("ciphertext failed authentication")]
    Authentication,
    #[error("encryption failed")]
    Encryption,
}

/// A 32-byte ChaCha20Poly1305 key used for exactly one secret.
///
/// Travels only inside the token (as unpadded URL-safe base64) and is
/// never written to the store.
#[derive(ZeroizeOnDrop)]
pub struct OneTimeKey([u8; KEY_LEN]);

impl OneTimeKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Encode for embedding in a token. The alphabet is `[A-Za-z0-9_-]`.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parse the token form produced by [`OneTimeKey::encode`].
    pub fn decode(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CryptoError::MalformedKey)?;
        let key: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::MalformedKey)?;
        Ok(Self(key))
    }
}

impl std::fmt::Debug for OneTimeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OneTimeKey(..)")
    }
}

enum Entropy {
    Os,
    Seeded(Mutex<StdRng>),
}

/// Authenticated symmetric cipher with its own randomness source.
///
/// Production code uses [`Cipher::new`] (OS CSPRNG). Tests can use
/// [`Cipher::seeded`] to get reproducible keys, nonces and storage ids.
pub struct Cipher {
    entropy: Entropy,
}

impl Default for Cipher {
    fn default() -> Self {
        Self::new()
    }
}

impl Cipher {
    pub fn new() -> Self {
        Self {
            entropy: Entropy::Os,
        }
    }

    /// Deterministic cipher for tests. Never use outside of tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            entropy: Entropy::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Fill `buf` from this cipher's randomness source.
    pub fn fill_random(&self, buf: &mut [u8]) {
        match &self.entropy {
            Entropy::Os => OsRng.fill_bytes(buf),
            Entropy::Seeded(rng) => rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .fill_bytes(buf),
        }
    }

    pub fn generate_key(&self) -> OneTimeKey {
        let mut key = [0u8; KEY_LEN];
        self.fill_random(&mut key);
        OneTimeKey(key)
    }

    /// Encrypt `plaintext`, returning `FORMAT_V1 || nonce || ciphertext+tag`.
    pub fn encrypt(&self, plaintext: &[u8], key: &OneTimeKey) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.fill_random(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
        out.push(FORMAT_V1);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Decrypt a blob produced by [`Cipher::encrypt`]. All-or-nothing.
    pub fn decrypt(&self, blob: &[u8], key: &OneTimeKey) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < 1 + NONCE_LEN + TAG_LEN || blob[0] != FORMAT_V1 {
            return Err(CryptoError::MalformedCiphertext);
        }
        let (nonce_bytes, sealed) = blob[1..].split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CryptoError::Authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cipher = Cipher::new();
        let key = cipher.generate_key();
        let blob = cipher.encrypt(b"hello, snapsecret!", &key).unwrap();
        assert_eq!(cipher.decrypt(&blob, &key).unwrap(), b"hello, snapsecret!");
    }

    #[test]
    fn wrong_key_fails() {
        let cipher = Cipher::new();
        let key1 = cipher.generate_key();
        let key2 = cipher.generate_key();
        let blob = cipher.encrypt(b"secret", &key1).unwrap();
        assert_eq!(
            cipher.decrypt(&blob, &key2),
            Err(CryptoError::Authentication)
        );
    }

    #[test]
    fn fresh_key_and_nonce_per_call() {
        let cipher = Cipher::new();
        assert_ne!(
            cipher.generate_key().as_bytes(),
            cipher.generate_key().as_bytes()
        );
        let key = cipher.generate_key();
        let a = cipher.encrypt(b"same", &key).unwrap();
        let b = cipher.encrypt(b"same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn truncated_or_unversioned_blob_is_malformed() {
        let cipher = Cipher::new();
        let key = cipher.generate_key();
        let blob = cipher.encrypt(b"x", &key).unwrap();

        assert_eq!(
            cipher.decrypt(&blob[..10], &key),
            Err(CryptoError::MalformedCiphertext)
        );
        let mut unversioned = blob.clone();
        unversioned[0] = 0x80;
        assert_eq!(
            cipher.decrypt(&unversioned, &key),
            Err(CryptoError::MalformedCiphertext)
        );
        assert_eq!(cipher.decrypt(b"", &key), Err(CryptoError::MalformedCiphertext));
    }

    #[test]
    fn key_encoding_is_url_safe_and_reversible() {
        let cipher = Cipher::new();
        for _ in 0..64 {
            let key = cipher.generate_key();
            let encoded = key.encode();
            assert_eq!(encoded.len(), 43);
            assert!(encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            assert_eq!(OneTimeKey::decode(&encoded).unwrap().as_bytes(), key.as_bytes());
        }
    }

    #[test]
    fn garbage_key_is_rejected() {
        assert_eq!(
            OneTimeKey::decode("not base64!").unwrap_err(),
            CryptoError::MalformedKey
        );
        // Valid base64 but the wrong length.
        assert_eq!(
            OneTimeKey::decode("AAAA").unwrap_err(),
            CryptoError::MalformedKey
        );
    }

    #[test]
    fn seeded_cipher_is_deterministic() {
        let a = Cipher::seeded(7);
        let b = Cipher::seeded(7);
        assert_eq!(a.generate_key().as_bytes(), b.generate_key().as_bytes());
        assert_ne!(
            Cipher::seeded(8).generate_key().as_bytes(),
            Cipher::seeded(7).generate_key().as_bytes()
        );
    }
}
