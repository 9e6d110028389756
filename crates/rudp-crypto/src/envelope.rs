//! Payload sealing with XChaCha20-Poly1305, or identity passthrough.
//!
//! A sealed payload is `nonce(24) || ciphertext || tag(16)`. Each seal draws
//! a fresh random nonce, so every chunk is independently decryptable and no
//! chunk depends on its neighbours.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore as _;
use rand::rngs::OsRng;

use crate::{CryptoError, KEY_LEN, Key};

/// XChaCha20 nonce size (24 bytes)
const NONCE_LEN: usize = 24;

/// Poly1305 tag size (16 bytes)
const TAG_LEN: usize = 16;

/// Bytes a sealed payload grows by: nonce prefix plus authentication tag.
pub const ENVELOPE_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Payload envelope installed on a connection at handshake time.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// Authenticated encryption under a shared key
    Sealed(Key),
    /// Identity passthrough
    Plain,
}

impl Envelope {
    /// Interpret a SYN payload as an envelope choice.
    ///
    /// Empty payload selects passthrough; a [`KEY_LEN`]-byte payload selects
    /// AEAD under that key. Any other length is `None` — the caller logs a
    /// warning and falls back to passthrough.
    #[must_use]
    pub fn from_handshake(payload: &[u8]) -> Option<Self> {
        match payload.len() {
            0 => Some(Self::Plain),
            KEY_LEN => Key::from_bytes(payload).ok().map(Self::Sealed),
            _ => None,
        }
    }

    /// Whether payloads are actually encrypted.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }

    /// Encrypt one chunk. Identity in passthrough mode.
    #[must_use]
    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        match self {
            Self::Plain => plaintext.to_vec(),
            Self::Sealed(key) => {
                let mut nonce = [0u8; NONCE_LEN];
                OsRng.fill_bytes(&mut nonce);

                let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
                let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
                    unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs")
                };

                let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                sealed.extend_from_slice(&nonce);
                sealed.extend_from_slice(&ciphertext);
                sealed
            },
        }
    }

    /// Decrypt one chunk. Identity in passthrough mode.
    ///
    /// # Errors
    ///
    /// `CryptoError::AuthFailed` when the ciphertext is truncated, was
    /// tampered with, or was sealed under a different key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Plain => Ok(sealed.to_vec()),
            Self::Sealed(key) => {
                if sealed.len() < NONCE_LEN + TAG_LEN {
                    return Err(CryptoError::AuthFailed);
                }

                let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
                let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
                cipher
                    .decrypt(XNonce::from_slice(nonce), ciphertext)
                    .map_err(|_| CryptoError::AuthFailed)
            },
        }
    }
}
