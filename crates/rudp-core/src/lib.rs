//! Connection state, congestion control, and telemetry for the RUDP
//! transport.
//!
//! The pieces here are pure: no sockets, no clocks. [`Connection`] is the
//! per-peer record both engines keep, and doubles as the receiver-side state
//! machine — [`Connection::handle_frame`] returns [`ConnectionEvent`]s for
//! the driving loop to execute. [`Congestion`] tracks the sender's window,
//! [`LossInjector`] simulates a lossy link for evaluation, and
//! [`TransferStats`] is the telemetry record a transfer returns.

mod congestion;
mod connection;
mod loss;
mod stats;

pub use congestion::{Congestion, DEFAULT_SSTHRESH, INITIAL_CWND};
pub use connection::{Connection, ConnectionEvent, ConnectionState, DEFAULT_RECV_BUFFER_CAP};
pub use loss::LossInjector;
pub use stats::TransferStats;
