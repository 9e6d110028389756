//! Per-peer connection record and the receiver-side state machine.
//!
//! One endpoint owns each [`Connection`]. The receiver drives it through
//! [`Connection::handle_frame`], which is pure — no I/O, no clock — and
//! returns [`ConnectionEvent`]s for the socket loop to execute. The sender
//! engine reuses the record for its own sequence and window bookkeeping.
//!
//! # State machine
//!
//! ```text
//! CLOSED ── send SYN ──────────────────> SYN_SENT        (sender)
//! CLOSED ── recv SYN / send SYN_ACK ───> SYN_RECEIVED    (receiver)
//! SYN_SENT ── recv SYN_ACK / send ACK ─> ESTABLISHED
//! SYN_RECEIVED ── recv ACK ───────────-> ESTABLISHED
//! ESTABLISHED ── send FIN ────────────-> FIN_WAIT        (sender)
//! ESTABLISHED ── recv FIN / send ACK ──> CLOSE_WAIT ──> CLOSED
//! FIN_WAIT ── recv ACK ───────────────-> CLOSED
//! ```
//!
//! A frame that is not valid in the current state is logged and discarded;
//! that is never a protocol error and never destroys the connection. One
//! exception to the table: DATA or FIN arriving in `SYN_RECEIVED` completes
//! the handshake implicitly, because either frame proves the peer received
//! the SYN_ACK and only the completing ACK was lost.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use rudp_crypto::Envelope;
use rudp_proto::{Frame, PAYLOAD_UNIT, PacketType};
use tracing::{debug, trace, warn};

/// Default receive-buffer capacity in bytes.
pub const DEFAULT_RECV_BUFFER_CAP: usize = 65_536;

/// Connection lifecycle state. Names are shared by both endpoints; each
/// transition fires only at the endpoint that owns the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection
    Closed,
    /// Sender: SYN sent, awaiting SYN_ACK
    SynSent,
    /// Receiver: SYN received, SYN_ACK sent, awaiting ACK
    SynReceived,
    /// Handshake complete, DATA may flow
    Established,
    /// Sender: FIN sent, awaiting ACK
    FinWait,
    /// Receiver: FIN acknowledged, state about to be freed
    CloseWait,
}

/// Actions returned by the receiver-side state machine.
///
/// The socket loop executes these in order: transmit replies to the peer,
/// hand delivered bytes to the application, drop torn-down records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Send this frame to the peer
    Reply(Frame),
    /// In-order plaintext ready for the application
    Deliver(Bytes),
    /// Connection finished; the owner frees the record
    Teardown,
}

/// Per-peer protocol state.
///
/// Field meanings follow the transport's data model; the receiver uses the
/// reassembly side (`expected_seq`, `out_of_order`, `recv_buffer`), the
/// sender the transmission side (`local_seq`, `remote_wnd`).
#[derive(Debug)]
pub struct Connection {
    /// Lifecycle state
    pub state: ConnectionState,
    /// Peer address
    pub peer: SocketAddr,
    /// Next sequence number to send
    pub local_seq: u32,
    /// Highest peer sequence number accepted
    pub remote_seq: u32,
    /// Cumulative acknowledgment most recently emitted
    pub last_ack_sent: u32,
    /// Next in-order sequence number expected from the peer
    pub expected_seq: u32,
    /// Ciphertext buffered past `expected_seq`, keyed by sequence number
    pub out_of_order: HashMap<u32, Bytes>,
    /// In-order plaintext awaiting delivery to the application
    pub recv_buffer: BytesMut,
    /// Capacity backing the advertised window
    pub recv_buffer_cap: usize,
    /// Peer-advertised receive window, in whole payload units
    pub remote_wnd: u32,
    /// Payload envelope installed at handshake time
    pub envelope: Envelope,
    /// Accepted DATA frames (duplicates excluded)
    pub packets_recv: u64,
    /// Plaintext bytes delivered
    pub bytes_recv: u64,
    /// DATA frames discarded as duplicates
    pub duplicates_dropped: u64,
}

impl Connection {
    /// Fresh record for `peer` in [`ConnectionState::Closed`].
    #[must_use]
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            state: ConnectionState::Closed,
            peer,
            local_seq: 0,
            remote_seq: 0,
            last_ack_sent: 0,
            expected_seq: 0,
            out_of_order: HashMap::new(),
            recv_buffer: BytesMut::new(),
            recv_buffer_cap: DEFAULT_RECV_BUFFER_CAP,
            remote_wnd: (DEFAULT_RECV_BUFFER_CAP / PAYLOAD_UNIT) as u32,
            envelope: Envelope::Plain,
            packets_recv: 0,
            bytes_recv: 0,
            duplicates_dropped: 0,
        }
    }

    /// Receive window to advertise, in whole payload units.
    #[must_use]
    pub fn advertised_window(&self) -> u32 {
        (self.recv_buffer_cap.saturating_sub(self.recv_buffer.len()) / PAYLOAD_UNIT) as u32
    }

    /// Upper bound on buffered out-of-order entries, implied by the
    /// receive-buffer capacity.
    fn out_of_order_cap(&self) -> usize {
        self.recv_buffer_cap / PAYLOAD_UNIT
    }

    /// Receiver-side dispatch for one decoded frame.
    ///
    /// Pure: the caller transmits every [`ConnectionEvent::Reply`], passes
    /// [`ConnectionEvent::Deliver`] bytes to the application, and frees the
    /// record on [`ConnectionEvent::Teardown`].
    pub fn handle_frame(&mut self, frame: Frame) -> Vec<ConnectionEvent> {
        match frame.ptype {
            PacketType::Syn => self.on_syn(&frame),
            PacketType::Ack => self.on_ack(&frame),
            PacketType::Data => self.on_data(frame),
            PacketType::Fin => self.on_fin(&frame),
            PacketType::SynAck => {
                debug!(peer = %self.peer, state = ?self.state, "SYN_ACK ignored at receiver");
                Vec::new()
            },
        }
    }

    /// SYN: record the peer's initial sequence number, install the payload
    /// envelope, answer SYN_ACK. A repeated SYN in `SynReceived` re-emits
    /// the SYN_ACK so a lost reply does not strand the handshake.
    fn on_syn(&mut self, frame: &Frame) -> Vec<ConnectionEvent> {
        match self.state {
            ConnectionState::Closed | ConnectionState::SynReceived => {
                self.remote_seq = frame.seq;
                self.local_seq = 0;
                self.envelope = match Envelope::from_handshake(&frame.payload) {
                    Some(envelope) => envelope,
                    None => {
                        warn!(
                            peer = %self.peer,
                            len = frame.payload.len(),
                            "SYN payload is not a valid key, falling back to passthrough"
                        );
                        Envelope::Plain
                    },
                };
                self.state = ConnectionState::SynReceived;

                debug!(
                    peer = %self.peer,
                    seq = frame.seq,
                    sealed = self.envelope.is_sealed(),
                    "handshake opened"
                );

                vec![ConnectionEvent::Reply(Frame::syn_ack(
                    self.local_seq,
                    frame.seq,
                    self.advertised_window(),
                ))]
            },
            _ => {
                debug!(peer = %self.peer, state = ?self.state, "SYN ignored in state");
                Vec::new()
            },
        }
    }

    /// ACK: completes the handshake in `SynReceived`; informational once
    /// established.
    fn on_ack(&mut self, frame: &Frame) -> Vec<ConnectionEvent> {
        match self.state {
            ConnectionState::SynReceived => {
                self.establish();
                Vec::new()
            },
            ConnectionState::Established => {
                trace!(peer = %self.peer, ack = frame.ack, "informational ACK");
                Vec::new()
            },
            _ => {
                debug!(peer = %self.peer, state = ?self.state, "ACK ignored in state");
                Vec::new()
            },
        }
    }

    /// DATA: duplicate suppression, in-order delivery, out-of-order
    /// buffering. Every accepted path answers with a cumulative ACK; the
    /// only silent path is an authentication failure, which must not be
    /// acknowledged so the peer retransmits.
    fn on_data(&mut self, frame: Frame) -> Vec<ConnectionEvent> {
        // DATA in SynReceived proves the peer got our SYN_ACK and its
        // completing ACK was the datagram that got lost. Establish
        // implicitly; otherwise a lossy link strands every such handshake.
        if self.state == ConnectionState::SynReceived {
            self.establish();
        }

        if self.state != ConnectionState::Established {
            debug!(peer = %self.peer, state = ?self.state, seq = frame.seq, "DATA ignored in state");
            return Vec::new();
        }

        let seq = frame.seq;
        let mut events = Vec::new();

        if seq < self.expected_seq {
            self.duplicates_dropped += 1;
            trace!(peer = %self.peer, seq, expected = self.expected_seq, "duplicate DATA");
            // Still acknowledge: the duplicate usually means our ACK was
            // the datagram that got lost.
        } else if seq == self.expected_seq {
            match self.envelope.open(&frame.payload) {
                Ok(plaintext) => {
                    self.accept_chunk(&plaintext);
                    self.drain_out_of_order();
                },
                Err(err) => {
                    warn!(peer = %self.peer, seq, %err, "dropping undecryptable DATA");
                    return Vec::new();
                },
            }
        } else {
            // Future chunk: hold the ciphertext until its predecessors
            // arrive. First arrival wins; the map is bounded by the window
            // the peer was offered.
            if self.out_of_order.len() < self.out_of_order_cap() {
                self.out_of_order.entry(seq).or_insert(frame.payload);
                trace!(peer = %self.peer, seq, expected = self.expected_seq, "buffered out-of-order");
            } else {
                debug!(peer = %self.peer, seq, "out-of-order buffer full, dropping");
            }
        }

        if !self.recv_buffer.is_empty() {
            events.push(ConnectionEvent::Deliver(self.recv_buffer.split().freeze()));
        }

        let ack = self.expected_seq.wrapping_sub(1);
        self.last_ack_sent = ack;
        events.push(ConnectionEvent::Reply(Frame::ack(
            self.local_seq,
            ack,
            self.advertised_window(),
        )));

        events
    }

    /// FIN: acknowledge, discard any unreassembled remainder, tear down.
    fn on_fin(&mut self, frame: &Frame) -> Vec<ConnectionEvent> {
        // Same implicit establishment as DATA: a FIN can only follow a
        // received SYN_ACK.
        if self.state == ConnectionState::SynReceived {
            self.establish();
        }

        if self.state != ConnectionState::Established {
            debug!(peer = %self.peer, state = ?self.state, "FIN ignored in state");
            return Vec::new();
        }

        if !self.out_of_order.is_empty() {
            debug!(
                peer = %self.peer,
                pending = self.out_of_order.len(),
                "FIN with out-of-order chunks pending, discarding them"
            );
            self.out_of_order.clear();
        }

        self.state = ConnectionState::CloseWait;
        debug!(
            peer = %self.peer,
            packets = self.packets_recv,
            bytes = self.bytes_recv,
            duplicates = self.duplicates_dropped,
            "connection closing"
        );

        // The teardown ACK advertises a zero window; peers ignore it.
        self.last_ack_sent = frame.seq;
        let reply = Frame::ack(self.local_seq, frame.seq, 0);

        self.state = ConnectionState::Closed;
        vec![ConnectionEvent::Reply(reply), ConnectionEvent::Teardown]
    }

    /// Complete the handshake: the peer's numbering restarts at its SYN
    /// seq + 1.
    fn establish(&mut self) {
        self.state = ConnectionState::Established;
        self.expected_seq = self.remote_seq.wrapping_add(1);
        debug!(peer = %self.peer, expected_seq = self.expected_seq, "connection established");
    }

    /// Append one in-order plaintext chunk and advance the cursor.
    fn accept_chunk(&mut self, plaintext: &[u8]) {
        self.recv_buffer.extend_from_slice(plaintext);
        self.remote_seq = self.expected_seq;
        self.expected_seq = self.expected_seq.wrapping_add(1);
        self.packets_recv += 1;
        self.bytes_recv += plaintext.len() as u64;
    }

    /// Pop consecutive buffered successors now that the gap has closed.
    fn drain_out_of_order(&mut self) {
        while let Some(ciphertext) = self.out_of_order.remove(&self.expected_seq) {
            match self.envelope.open(&ciphertext) {
                Ok(plaintext) => self.accept_chunk(&plaintext),
                Err(err) => {
                    warn!(
                        peer = %self.peer,
                        seq = self.expected_seq,
                        %err,
                        "dropping undecryptable buffered chunk"
                    );
                    break;
                },
            }
        }
    }
}
