//! Sender engine for the RUDP transport.
//!
//! A [`Sender`] is the client endpoint: blocking `connect` / `send` /
//! `close` over one UDP socket, stop-and-wait reliability with cumulative
//! acknowledgments, and per-transfer telemetry in
//! [`rudp_core::TransferStats`].

mod errors;
mod sender;

pub use errors::{HandshakeError, TransferError};
pub use sender::{DEFAULT_TIMEOUT, MAX_RETRIES, Sender, SenderConfig};
