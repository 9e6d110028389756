//! Payload envelope and key handling for the RUDP transport.
//!
//! DATA payloads travel through an [`Envelope`]: either XChaCha20-Poly1305
//! under a shared 32-byte [`Key`], or an identity passthrough. Each chunk is
//! sealed and opened independently, so out-of-order arrivals can be buffered
//! as ciphertext and opened after reordering.

mod envelope;
mod key;

pub use envelope::{ENVELOPE_OVERHEAD, Envelope};
pub use key::{KEY_LEN, Key, PBKDF2_ITERATIONS, SALT_LEN};

use thiserror::Error;

/// Errors from envelope and key operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext failed authentication (wrong key, tamper, or truncation).
    ///
    /// The engines drop the frame without acknowledging it; the peer
    /// recovers by retransmitting.
    #[error("payload authentication failed")]
    AuthFailed,

    /// Key bytes were not a valid 32-byte key
    #[error("malformed key: {0}")]
    InvalidKey(String),
}
