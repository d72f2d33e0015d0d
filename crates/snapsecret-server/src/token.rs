//! Token codec.
//!
//! A token is `storage_key ~ decryption_key`. The storage key names the
//! ciphertext in the store; the decryption key exists only here. Tokens
//! written before encryption was introduced carry the storage key alone.

/// Joins the storage key and the decryption key. `~` is URL-unreserved and
/// absent from both the hex storage ids and the URL-safe base64 key alphabet.
pub const SEPARATOR: char = '~';

/// The key half of a decoded token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKey {
    /// Ciphertext in the store must be decrypted with this encoded key.
    Sealed(String),
    /// No key in the token: the stored value is returned verbatim.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub storage_key: String,
    pub key: TokenKey,
}

impl Token {
    pub fn sealed(storage_key: impl Into<String>, decryption_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
            key: TokenKey::Sealed(decryption_key.into()),
        }
    }

    pub fn legacy(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
            key: TokenKey::Legacy,
        }
    }
}

/// Join a storage key and optional decryption key. A legacy token has no
/// trailing separator.
pub fn encode(token: &Token) -> String {
    match &token.key {
        TokenKey::Sealed(key) => format!("{}{SEPARATOR}{}", token.storage_key, key),
        TokenKey::Legacy => token.storage_key.clone(),
    }
}

/// Split on the first separator only; everything after it is the key,
/// including any further separators.
pub fn decode(token: &str) -> Token {
    match token.split_once(SEPARATOR) {
        Some((storage_key, key)) => Token::sealed(storage_key, key),
        None => Token::legacy(token),
    }
}

/// Returns true if `c` may appear in a storage-key prefix: URL-unreserved
/// ASCII other than the separator.
pub fn is_prefix_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}
