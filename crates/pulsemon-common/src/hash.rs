//! HMAC-SHA256 signing shared by the agent and the server.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default header carrying the hex digest of a request or response body.
pub const DEFAULT_HASH_HEADER: &str = "HashSHA256";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("hash key is empty")]
    EmptyKey,
    #[error("invalid hash key: {0}")]
    InvalidKey(String),
}

/// Signs and verifies payloads with a pre-shared key.
#[derive(Clone)]
pub struct Hasher {
    key: Vec<u8>,
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hasher").field("key", &"<redacted>").finish()
    }
}

impl Hasher {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, HashError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(HashError::EmptyKey);
        }
        Ok(Self { key: key.to_vec() })
    }

    fn mac(&self) -> Result<HmacSha256, HashError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| HashError::InvalidKey(e.to_string()))
    }

    /// Returns the lowercase hex HMAC of `data`.
    pub fn hash(&self, data: &[u8]) -> Result<String, HashError> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Compares `expected_hex` against the HMAC of `data` in constant time.
    /// Anything that is not valid hex fails the check.
    pub fn check(&self, data: &[u8], expected_hex: &str) -> bool {
        let Ok(expected) = hex::decode(expected_hex.trim()) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(data);
        mac.verify_slice(&expected).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        assert_eq!(Hasher::new("").unwrap_err(), HashError::EmptyKey);
    }

    #[test]
    fn check_accepts_own_hash_and_rejects_tampered_data() {
        let hasher = Hasher::new("secret").unwrap();
        let sig = hasher.hash(b"payload").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(hasher.check(b"payload", &sig));
        assert!(!hasher.check(b"payl0ad", &sig));
        assert!(!hasher.check(b"payload", "not-hex"));
    }

    #[test]
    fn different_keys_disagree() {
        let a = Hasher::new("one").unwrap();
        let b = Hasher::new("two").unwrap();
        let sig = a.hash(b"data").unwrap();
        assert!(!b.check(b"data", &sig));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let hasher = Hasher::new("topsecret").unwrap();
        assert!(!format!("{hasher:?}").contains("topsecret"));
    }
}
