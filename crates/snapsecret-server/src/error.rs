use thiserror::Error;

use crate::crypto::CryptoError;
use crate::store::StoreError;

/// Every way a submit, preview or redeem can fail.
///
/// The variants stay distinct for logs. Callers facing the outside world
/// should branch on [`SecretError::is_not_found`], which folds
/// `Decryption` into `NotFound` so a tampered token looks exactly like an
/// expired one.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    StoreUnavailable(StoreError),
    /// Sealing failed on our side. Never the caller's fault.
    #[error("secret could not be encrypted: {0}")]
    Encryption(#[source] CryptoError),
    #[error("secret could not be decrypted: {0}")]
    Decryption(#[source] CryptoError),
    #[error("secret not found")]
    NotFound,
}

impl SecretError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::Decryption(_))
    }
}

impl From<StoreError> for SecretError {
    fn from(e: StoreError) -> Self {
        match e {
            // An unreadable row is as useless as a wrong key.
            StoreError::Corrupt { .. } => Self::Decryption(CryptoError::MalformedCiphertext),
            e @ StoreError::Unavailable(_) => Self::StoreUnavailable(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_and_not_found_collapse() {
        assert!(SecretError::NotFound.is_not_found());
        assert!(SecretError::Decryption(CryptoError::Authentication).is_not_found());
        assert!(!SecretError::invalid("empty").is_not_found());
        assert!(!SecretError::StoreUnavailable(StoreError::unavailable("down")).is_not_found());
        assert!(!SecretError::Encryption(CryptoError::Encryption).is_not_found());
    }

    #[test]
    fn corrupt_rows_map_to_decryption() {
        let e = SecretError::from(StoreError::Corrupt {
            key: "k".into(),
            reason: "bad".into(),
        });
        assert!(matches!(e, SecretError::Decryption(_)));
        let e = SecretError::from(StoreError::unavailable("refused"));
        assert!(matches!(e, SecretError::StoreUnavailable(_)));
    }
}
