//! Blocking sender engine.
//!
//! The sender owns its socket for the duration of `connect`, `send`, and
//! `close`. One frame is in flight at a time (stop-and-wait); the congestion
//! window is tracked per chunk and recorded as telemetry, not yet used to
//! pipeline. All waits run against a single monotonic deadline per attempt
//! rather than repeated relative sleeps, so partial receives cannot stretch
//! a timeout.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs as _, UdpSocket};
use std::time::{Duration, Instant};

use rand::RngCore as _;
use rand::rngs::OsRng;
use rudp_core::{Congestion, Connection, ConnectionState, TransferStats};
use rudp_crypto::{Envelope, Key};
use rudp_proto::{Frame, FramingError, PAYLOAD_UNIT, PacketType};
use tracing::{debug, info, trace, warn};

use crate::errors::{HandshakeError, TransferError};

/// Default per-receive timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeouts tolerated per chunk before the transfer aborts.
pub const MAX_RETRIES: u64 = 5;

/// Largest UDP datagram the sender will accept.
const MAX_DATAGRAM: usize = 65_535;

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Peer host name or address
    pub host: String,
    /// Peer port
    pub port: u16,
    /// Per-receive timeout
    pub timeout: Duration,
    /// Seal DATA payloads and carry the key in the SYN
    pub use_crypto: bool,
    /// Explicit envelope key; a fresh one is generated when absent
    pub key: Option<Key>,
    /// Congestion-control toggle (off pins the window fully open)
    pub cc_enabled: bool,
    /// Timeouts tolerated per chunk before aborting
    pub max_retries: u64,
}

impl SenderConfig {
    /// Config for `host:port` with the given timeout and crypto choice;
    /// everything else at its default.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration, use_crypto: bool) -> Self {
        Self { host: host.into(), port, timeout, use_crypto, ..Self::default() }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            timeout: DEFAULT_TIMEOUT,
            use_crypto: false,
            key: None,
            cc_enabled: true,
            max_retries: MAX_RETRIES,
        }
    }
}

/// Outcome of waiting for one acknowledgment.
enum AckWait {
    /// Cumulative ACK covering the awaited sequence arrived
    Acked,
    /// Deadline passed
    TimedOut,
}

/// Outcome of the per-chunk stop-and-wait loop.
enum ChunkOutcome {
    /// Acknowledged after this many timeouts
    Delivered(u64),
    /// Retry budget spent; the counter includes the final timeout
    Exhausted(u64),
}

/// Blocking sender endpoint.
///
/// `connect`, `send`, and `close` are synchronous and own the socket while
/// they run. A `Sender` can reconnect after `close` (a fresh ISN is drawn).
pub struct Sender {
    socket: UdpSocket,
    conn: Connection,
    congestion: Congestion,
    timeout: Duration,
    max_retries: u64,
    key: Option<Key>,
    buf: Vec<u8>,
}

impl Sender {
    /// Resolve the peer, bind an ephemeral socket, and prepare the envelope.
    ///
    /// No traffic is sent until [`Sender::connect`].
    ///
    /// # Errors
    ///
    /// `HandshakeError::Io` when the peer does not resolve or the local
    /// socket cannot be bound.
    pub fn new(config: SenderConfig) -> Result<Self, HandshakeError> {
        let target = format!("{}:{}", config.host, config.port);
        let peer: SocketAddr = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {target}")))?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(peer)?;

        let key = config.use_crypto.then(|| config.key.clone().unwrap_or_else(Key::generate));

        let mut conn = Connection::new(peer);
        conn.envelope = match &key {
            Some(key) => Envelope::Sealed(key.clone()),
            None => Envelope::Plain,
        };

        let congestion = if config.cc_enabled { Congestion::new() } else { Congestion::disabled() };

        Ok(Self {
            socket,
            conn,
            congestion,
            timeout: config.timeout,
            max_retries: config.max_retries,
            key,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.conn.state
    }

    /// The envelope key in use, if any. Lets a caller persist or display the
    /// generated key.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Three-way handshake.
    ///
    /// Draws a random ISN, sends the SYN (carrying the envelope key when
    /// crypto is on), and waits once for the matching SYN_ACK. There is no
    /// SYN retransmission: a lost leg fails the connect.
    ///
    /// # Errors
    ///
    /// [`HandshakeError`]; the connection is back in `Closed` on any error.
    pub fn connect(&mut self) -> Result<(), HandshakeError> {
        if self.conn.state != ConnectionState::Closed {
            warn!(state = ?self.conn.state, "connect called on open connection");
            return Err(HandshakeError::InvalidState { state: self.conn.state });
        }

        // Random ISN so off-path injection cannot guess the sequence space.
        self.conn.local_seq = OsRng.next_u32();
        let isn = self.conn.local_seq;

        let key_payload = match &self.key {
            Some(key) => key.as_bytes().to_vec(),
            None => Vec::new(),
        };

        self.socket.send(&Frame::syn(isn, key_payload).encode())?;
        self.conn.state = ConnectionState::SynSent;
        debug!(isn, sealed = self.conn.envelope.is_sealed(), "SYN sent");

        let started = Instant::now();
        match self.complete_handshake(isn) {
            Ok(()) => {
                info!(peer = %self.conn.peer, wnd = self.conn.remote_wnd, "connection established");
                Ok(())
            },
            Err(err) => {
                self.conn.state = ConnectionState::Closed;
                warn!(%err, elapsed = ?started.elapsed(), "handshake failed");
                Err(err)
            },
        }
    }

    /// Wait for the SYN_ACK matching `isn` and emit the completing ACK.
    ///
    /// The first well-formed frame decides: a wrong frame type or a SYN_ACK
    /// acknowledging any other sequence number fails the connect. Damaged
    /// datagrams are skipped silently.
    fn complete_handshake(&mut self, isn: u32) -> Result<(), HandshakeError> {
        let deadline = Instant::now() + self.timeout;
        let Some(frame) = self.recv_frame(deadline)? else {
            return Err(HandshakeError::Timeout { elapsed: self.timeout });
        };

        if frame.ptype != PacketType::SynAck {
            return Err(HandshakeError::UnexpectedReply {
                reason: format!("expected SYN_ACK, got {:?}", frame.ptype),
            });
        }
        if frame.ack != isn {
            return Err(HandshakeError::UnexpectedReply {
                reason: format!("SYN_ACK acknowledges {:#010x}, expected {isn:#010x}", frame.ack),
            });
        }

        self.conn.remote_seq = frame.seq;
        self.conn.remote_wnd = frame.wnd;
        self.conn.local_seq = isn.wrapping_add(1);

        self.socket.send(&Frame::ack(self.conn.local_seq, frame.seq, 0).encode())?;
        self.conn.state = ConnectionState::Established;
        Ok(())
    }

    /// Transfer `data` reliably and in order.
    ///
    /// Fragments into [`PAYLOAD_UNIT`]-byte chunks, seals each one
    /// independently, and runs the stop-and-wait loop per chunk. On success
    /// the returned stats satisfy `bytes_sent == data.len()`; on an abort
    /// the error carries the partial stats instead.
    ///
    /// # Errors
    ///
    /// [`TransferError::Aborted`] when a chunk exhausts its retries,
    /// [`TransferError::InvalidState`] outside `Established`.
    pub fn send(&mut self, data: &[u8]) -> Result<TransferStats, TransferError> {
        if self.conn.state != ConnectionState::Established {
            warn!(state = ?self.conn.state, "send called without a connection");
            return Err(TransferError::InvalidState { state: self.conn.state });
        }

        let started = Instant::now();
        let mut stats = TransferStats::default();

        for chunk in data.chunks(PAYLOAD_UNIT) {
            let seq = self.conn.local_seq;
            let frame = Frame::data(seq, self.conn.envelope.seal(chunk));

            stats.cwnd_history.push(self.congestion.effective_window(self.conn.remote_wnd));

            let retries = match self.deliver_chunk(&frame) {
                Ok(ChunkOutcome::Delivered(retries)) => retries,
                Ok(ChunkOutcome::Exhausted(retries)) => {
                    // Retries exhausted: abort, surface what got through.
                    stats.retransmissions += retries;
                    stats.finish(started.elapsed().as_millis() as u64);
                    warn!(seq, retries, "transfer aborted, retries exhausted");
                    return Err(TransferError::Aborted { seq, stats });
                },
                Err(err) => return Err(err.into()),
            };

            stats.packets_sent += 1;
            stats.bytes_sent += chunk.len() as u64;
            stats.retransmissions += retries;
            self.conn.local_seq = seq.wrapping_add(1);
            self.congestion.on_chunk_delivered(retries);
        }

        stats.finish(started.elapsed().as_millis() as u64);
        info!(
            packets = stats.packets_sent,
            bytes = stats.bytes_sent,
            retx = stats.retransmissions,
            kbps = stats.throughput_kbps,
            "transfer complete"
        );
        Ok(stats)
    }

    /// Stop-and-wait delivery of one frame.
    fn deliver_chunk(&mut self, frame: &Frame) -> io::Result<ChunkOutcome> {
        let mut retries: u64 = 0;

        // Flow control: a closed window means the peer asked us to hold off.
        // Wait for an ACK that reopens it, burning the same retry budget.
        while self.conn.remote_wnd == 0 {
            debug!(seq = frame.seq, "zero window, waiting for update");
            if !self.await_window_update()? {
                retries += 1;
                if retries > self.max_retries {
                    return Ok(ChunkOutcome::Exhausted(retries));
                }
            }
        }

        loop {
            self.socket.send(&frame.encode())?;
            trace!(seq = frame.seq, retries, "DATA sent");

            match self.await_ack(frame.seq)? {
                AckWait::Acked => return Ok(ChunkOutcome::Delivered(retries)),
                AckWait::TimedOut => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Ok(ChunkOutcome::Exhausted(retries));
                    }
                    debug!(seq = frame.seq, retries, "timeout, retransmitting");
                },
            }
        }
    }

    /// Wait for a cumulative ACK covering `seq`. Stale ACKs and foreign
    /// frame types are ignored; the deadline is absolute.
    fn await_ack(&mut self, seq: u32) -> io::Result<AckWait> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let Some(frame) = self.recv_frame(deadline)? else {
                return Ok(AckWait::TimedOut);
            };

            match frame.ptype {
                PacketType::Ack if frame.ack >= seq => {
                    self.conn.remote_wnd = frame.wnd;
                    trace!(seq, ack = frame.ack, wnd = frame.wnd, "acknowledged");
                    return Ok(AckWait::Acked);
                },
                PacketType::Ack => {
                    trace!(seq, ack = frame.ack, "stale ACK, still waiting");
                },
                other => {
                    debug!(?other, "unexpected frame while awaiting ACK");
                },
            }
        }
    }

    /// Wait once (one timeout) for any ACK and take its advertised window.
    /// `true` when one arrived.
    fn await_window_update(&mut self) -> io::Result<bool> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let Some(frame) = self.recv_frame(deadline)? else {
                return Ok(false);
            };
            if frame.ptype == PacketType::Ack {
                self.conn.remote_wnd = frame.wnd;
                return Ok(true);
            }
            debug!(ptype = ?frame.ptype, "ignoring frame while window-blocked");
        }
    }

    /// Graceful teardown, best-effort.
    ///
    /// Sends the FIN and waits once for its ACK; a timeout is treated as
    /// acknowledged, since the receiver frees its state on FIN either way.
    /// Outside `Established` this logs and returns without effect.
    pub fn close(&mut self) {
        if self.conn.state != ConnectionState::Established {
            debug!(state = ?self.conn.state, "close called without a connection");
            return;
        }

        let fin_seq = self.conn.local_seq.wrapping_add(1);
        if let Err(err) = self.socket.send(&Frame::fin(fin_seq).encode()) {
            warn!(%err, "failed to send FIN");
            self.conn.state = ConnectionState::Closed;
            return;
        }
        self.conn.state = ConnectionState::FinWait;

        let deadline = Instant::now() + self.timeout;
        loop {
            match self.recv_frame(deadline) {
                Ok(Some(frame)) if frame.ptype == PacketType::Ack => {
                    trace!(ack = frame.ack, "FIN acknowledged");
                    break;
                },
                Ok(Some(frame)) => debug!(ptype = ?frame.ptype, "ignoring frame in FIN_WAIT"),
                Ok(None) => {
                    debug!("no FIN ACK, treating close as complete");
                    break;
                },
                Err(err) => {
                    warn!(%err, "socket error in FIN_WAIT");
                    break;
                },
            }
        }

        self.conn.state = ConnectionState::Closed;
        info!(peer = %self.conn.peer, "connection closed");
    }

    /// Receive one well-formed frame before `deadline`. `None` on timeout;
    /// damaged datagrams are logged and skipped without consuming the
    /// deadline.
    fn recv_frame(&mut self, deadline: Instant) -> io::Result<Option<Frame>> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket.set_read_timeout(Some(remaining))?;

            match self.socket.recv(&mut self.buf) {
                Ok(len) => match Frame::decode(&self.buf[..len]) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(err @ FramingError::CrcMismatch { .. }) => {
                        debug!(%err, "corrupt datagram dropped");
                    },
                    Err(err) => {
                        debug!(%err, "malformed datagram dropped");
                    },
                },
                Err(err)
                    if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Ok(None);
                },
                Err(err) => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("peer", &self.conn.peer)
            .field("state", &self.conn.state)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
