//! Sender error types.
//!
//! Reliability masks framing and authentication failures below this layer;
//! what surfaces to the caller is only how a handshake or a transfer as a
//! whole went. Close never fails visibly.

use std::time::Duration;

use rudp_core::{ConnectionState, TransferStats};
use thiserror::Error;

/// Why `connect` failed. The connection is back in `Closed` afterwards and
/// the socket stays reusable.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// No SYN_ACK arrived within the timeout (no SYN retry is attempted)
    #[error("handshake timed out after {elapsed:?}")]
    Timeout {
        /// How long we waited for the SYN_ACK
        elapsed: Duration,
    },

    /// Peer answered with the wrong frame or acknowledged the wrong sequence
    #[error("unexpected handshake reply: {reason}")]
    UnexpectedReply {
        /// What was wrong with the reply
        reason: String,
    },

    /// `connect` called outside `Closed`
    #[error("cannot connect from state {state:?}")]
    InvalidState {
        /// State the connection was in
        state: ConnectionState,
    },

    /// Socket-level failure
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why `send` failed.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Retries exhausted on one chunk; the transfer stops there.
    ///
    /// The carried stats reflect the chunks the peer actually acknowledged.
    #[error("transfer aborted at seq {seq}: retry budget exhausted")]
    Aborted {
        /// Sequence number of the undeliverable chunk
        seq: u32,
        /// Partial telemetry up to the abort
        stats: TransferStats,
    },

    /// `send` called outside `Established`
    #[error("cannot send from state {state:?}")]
    InvalidState {
        /// State the connection was in
        state: ConnectionState,
    },

    /// Socket-level failure
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}
