//! Wire format for the RUDP reliable-datagram transport.
//!
//! A datagram on the wire is a fixed 24-byte header followed by an opaque
//! payload. The header carries the packet type, sequence and acknowledgment
//! numbers, the advertised receive window, the payload length, and a CRC-32
//! over the whole datagram. The codec here is pure: [`Frame::encode`] and
//! [`Frame::decode`] share no state with the engines that drive the protocol.

mod errors;
mod frame;

pub use errors::FramingError;
pub use frame::{Frame, HEADER_LEN, MAGIC, PAYLOAD_UNIT, PacketType, VERSION};
