//! Receiver engine for the RUDP transport.
//!
//! A [`Receiver`] owns one UDP socket and runs a single-threaded blocking
//! loop: receive a datagram, consult the loss injector, decode the frame,
//! dispatch it to the per-peer [`Connection`], and execute the events the
//! state machine returns. There is no locking because there is no sharing —
//! concurrent peers are serialized through the one socket.

mod sink;

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};

use rudp_core::{Connection, ConnectionEvent, ConnectionState, DEFAULT_RECV_BUFFER_CAP, LossInjector};
use rudp_proto::{Frame, PacketType};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use sink::{DeliverySink, LogSink, MemorySink};

/// Largest UDP datagram the receiver will accept.
const MAX_DATAGRAM: usize = 65_535;

/// Errors that can occur in the receiver.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Bind address did not parse or could not be bound.
    ///
    /// Fatal at startup; fix the configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket I/O failure in the receive loop.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Address to bind, e.g. `"0.0.0.0:9000"`
    pub bind_address: String,
    /// Probability of dropping each inbound datagram (evaluation)
    pub drop_prob: f64,
    /// Fixed loss-injector seed for reproducible runs
    pub loss_seed: Option<u64>,
    /// Receive-buffer capacity backing the advertised window
    pub recv_buffer_cap: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            drop_prob: 0.0,
            loss_seed: None,
            recv_buffer_cap: DEFAULT_RECV_BUFFER_CAP,
        }
    }
}

/// Blocking receiver: one socket, one thread, one connection table.
pub struct Receiver<S: DeliverySink = LogSink> {
    socket: UdpSocket,
    connections: HashMap<SocketAddr, Connection>,
    loss: LossInjector,
    sink: S,
    recv_buffer_cap: usize,
}

impl Receiver<LogSink> {
    /// Bind with the default log-and-discard sink.
    ///
    /// # Errors
    ///
    /// `ServerError::Config` when the address cannot be bound.
    pub fn bind(config: ReceiverConfig) -> Result<Self, ServerError> {
        Self::bind_with_sink(config, LogSink)
    }
}

impl<S: DeliverySink> Receiver<S> {
    /// Bind and install a delivery sink.
    ///
    /// # Errors
    ///
    /// `ServerError::Config` when the address cannot be bound.
    pub fn bind_with_sink(config: ReceiverConfig, sink: S) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(&config.bind_address).map_err(|e| {
            ServerError::Config(format!("cannot bind '{}': {e}", config.bind_address))
        })?;

        let loss = match config.loss_seed {
            Some(seed) => LossInjector::with_seed(config.drop_prob, seed),
            None => LossInjector::new(config.drop_prob),
        };

        Ok(Self {
            socket,
            connections: HashMap::new(),
            loss,
            sink,
            recv_buffer_cap: config.recv_buffer_cap,
        })
    }

    /// Address the socket actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Run the receive loop until a socket error.
    ///
    /// Blocks forever in normal operation; a stranded receiver stays parked
    /// in `recv` until the operator terminates the process.
    pub fn run(mut self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr()?, drop_prob = self.loss.prob(), "receiver listening");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, addr) = self.socket.recv_from(&mut buf)?;
            self.handle_datagram(&buf[..len], addr);
        }
    }

    /// Process one inbound datagram end to end.
    fn handle_datagram(&mut self, raw: &[u8], addr: SocketAddr) {
        if self.loss.should_drop() {
            warn!(peer = %addr, "simulating loss, datagram dropped");
            return;
        }

        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(peer = %addr, %err, len = raw.len(), "invalid datagram dropped");
                return;
            },
        };

        // A SYN from a peer whose previous connection is past the handshake
        // starts a fresh transfer; mid-handshake SYNs stay with the existing
        // record so the SYN_ACK can be re-emitted.
        if frame.ptype == PacketType::Syn
            && self
                .connections
                .get(&addr)
                .is_some_and(|conn| conn.state != ConnectionState::SynReceived)
        {
            debug!(peer = %addr, "SYN replaces previous connection");
            self.connections.remove(&addr);
        }

        let cap = self.recv_buffer_cap;
        let events = {
            let conn = self.connections.entry(addr).or_insert_with(|| {
                let mut conn = Connection::new(addr);
                conn.recv_buffer_cap = cap;
                conn
            });
            conn.handle_frame(frame)
        };

        for event in events {
            match event {
                ConnectionEvent::Reply(reply) => {
                    if let Err(err) = self.socket.send_to(&reply.encode(), addr) {
                        warn!(peer = %addr, %err, "failed to send reply");
                    }
                },
                ConnectionEvent::Deliver(bytes) => self.sink.on_data(addr, bytes),
                ConnectionEvent::Teardown => {
                    self.connections.remove(&addr);
                    self.sink.on_close(addr);
                },
            }
        }
    }
}
