//! Symmetric key material.
//!
//! Keys are 32 raw bytes. The SYN frame carries them verbatim; the CLI moves
//! them around as URL-safe base64. For reproducible setups a key can be
//! derived from a shared secret with PBKDF2-HMAC-SHA256.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore as _;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// Key size in bytes, both in memory and on the wire (SYN payload).
pub const KEY_LEN: usize = 32;

/// Salt size for PBKDF2 derivation.
pub const SALT_LEN: usize = 16;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// A 32-byte symmetric envelope key.
///
/// Zeroized on drop. `Debug` redacts the bytes; use [`Key::to_base64`] when
/// a key genuinely has to leave the process.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Generate a fresh random key from the OS entropy source.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Build a key from exactly [`KEY_LEN`] raw bytes.
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidKey` if the slice has any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("{} bytes, need {KEY_LEN}", bytes.len())))?;
        Ok(Self(raw))
    }

    /// Derive a key from a shared secret with PBKDF2-HMAC-SHA256.
    ///
    /// Same secret and salt always yield the same key, so two parties with a
    /// pre-shared secret can arrive at the envelope key independently.
    #[must_use]
    pub fn derive(secret: &[u8], salt: &[u8; SALT_LEN]) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(secret, salt, PBKDF2_ITERATIONS, &mut bytes);
        Self(bytes)
    }

    /// Decode a URL-safe base64 key.
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidKey` if the input is not base64 or decodes to
    /// the wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidKey(format!("not base64: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Encode as URL-safe base64 for CLI transport.
    #[must_use]
    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    /// Raw key bytes, as carried in the SYN payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Key(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        assert_ne!(Key::generate(), Key::generate());
    }

    #[test]
    fn base64_round_trip() {
        let key = Key::generate();
        let decoded = Key::from_base64(&key.to_base64()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn reject_wrong_length() {
        assert!(matches!(Key::from_bytes(&[0u8; 16]), Err(CryptoError::InvalidKey(_))));
        assert!(matches!(Key::from_base64("AAAA"), Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn reject_garbage_base64() {
        assert!(matches!(Key::from_base64("not/base64!!"), Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn derivation_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = Key::derive(b"shared secret", &salt);
        let b = Key::derive(b"shared secret", &salt);
        assert_eq!(a, b);
    }

    #[test]
    fn derivation_depends_on_salt_and_secret() {
        let salt = [7u8; SALT_LEN];
        let other_salt = [8u8; SALT_LEN];
        let base = Key::derive(b"shared secret", &salt);
        assert_ne!(base, Key::derive(b"shared secret", &other_salt));
        assert_ne!(base, Key::derive(b"other secret", &salt));
    }

    #[test]
    fn debug_redacts_bytes() {
        let key = Key::generate();
        assert_eq!(format!("{key:?}"), "Key(..)");
    }
}
