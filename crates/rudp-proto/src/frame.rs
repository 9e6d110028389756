//! Frame type and the fixed-header codec.
//!
//! Wire layout (network byte order, fixed width):
//!
//! ```text
//! magic(2) version(1) ptype(1) flags(1) hdr_len(1)
//! seq(4) ack(4) wnd(4) payload_len(2) crc32(4) | payload(payload_len)
//! ```
//!
//! The CRC-32 is computed over the header serialized with a zeroed `crc32`
//! field, concatenated with the payload. Decoding validates every structural
//! invariant before the payload is copied out.

use bytes::{BufMut, Bytes, BytesMut};
use crc::{CRC_32_ISO_HDLC, Crc};

use crate::errors::FramingError;

/// Two-byte magic prefix on every datagram.
pub const MAGIC: [u8; 2] = *b"RU";

/// Protocol version carried in every header.
pub const VERSION: u8 = 1;

/// Fixed header size in bytes; also the value of the `hdr_len` field.
pub const HEADER_LEN: usize = 24;

/// Fragmentation unit for DATA payloads, and the unit in which receive
/// windows are advertised. Encrypted payloads exceed this on the wire by the
/// envelope overhead; the codec bounds payloads only by the u16 length field.
pub const PAYLOAD_UNIT: usize = 1024;

/// CRC-32 with the zlib/IEEE polynomial.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Byte offset of the `payload_len` field within the header.
const PAYLOAD_LEN_OFFSET: usize = 18;

/// Byte offset of the `crc32` field within the header.
const CRC_OFFSET: usize = 20;

/// Packet type discriminant.
///
/// Control frames (everything except [`PacketType::Data`]) carry a
/// zero-length payload, with one exception: a SYN may carry the sender's
/// envelope key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Payload-bearing segment
    Data,
    /// Cumulative acknowledgment
    Ack,
    /// Connection request (first leg of the handshake)
    Syn,
    /// Teardown request
    Fin,
    /// Connection accept (second leg of the handshake)
    SynAck,
}

impl PacketType {
    /// Wire value of this packet type.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Data => 0x01,
            Self::Ack => 0x02,
            Self::Syn => 0x03,
            Self::Fin => 0x04,
            Self::SynAck => 0x05,
        }
    }

    /// Parse a wire value. `None` if unrecognized.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Data),
            0x02 => Some(Self::Ack),
            0x03 => Some(Self::Syn),
            0x04 => Some(Self::Fin),
            0x05 => Some(Self::SynAck),
            _ => None,
        }
    }
}

/// The unit of wire transmission. Immutable once constructed.
///
/// # Invariants
///
/// - `payload.len()` fits in the u16 `payload_len` field. Enforced by
///   [`Frame::new`]; DATA payloads are bounded far below that by the
///   fragmentation unit plus envelope overhead.
/// - `flags` is reserved and zero on frames this implementation constructs;
///   decode preserves whatever the peer sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Packet type
    pub ptype: PacketType,
    /// Reserved flag bits (zero on the wire)
    pub flags: u8,
    /// Sender's sequence number
    pub seq: u32,
    /// Cumulative acknowledgment: highest in-order seq accepted
    pub ack: u32,
    /// Advertised receive window, in whole payload units
    pub wnd: u32,
    /// Opaque payload bytes (possibly ciphertext)
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with reserved flags zeroed.
    ///
    /// # Panics
    ///
    /// Debug-asserts that the payload fits the u16 length field. Engines
    /// never construct payloads near that bound.
    #[must_use]
    pub fn new(ptype: PacketType, seq: u32, ack: u32, wnd: u32, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        debug_assert!(payload.len() <= usize::from(u16::MAX));
        Self { ptype, flags: 0, seq, ack, wnd, payload }
    }

    /// DATA segment carrying one (possibly sealed) chunk.
    #[must_use]
    pub fn data(seq: u32, payload: impl Into<Bytes>) -> Self {
        Self::new(PacketType::Data, seq, 0, 0, payload)
    }

    /// Cumulative acknowledgment.
    #[must_use]
    pub fn ack(seq: u32, ack: u32, wnd: u32) -> Self {
        Self::new(PacketType::Ack, seq, ack, wnd, Bytes::new())
    }

    /// Connection request. The payload is empty for plaintext connections or
    /// carries the sender's envelope key.
    #[must_use]
    pub fn syn(seq: u32, key: impl Into<Bytes>) -> Self {
        Self::new(PacketType::Syn, seq, 0, 0, key)
    }

    /// Connection accept, acknowledging the peer's SYN.
    #[must_use]
    pub fn syn_ack(seq: u32, ack: u32, wnd: u32) -> Self {
        Self::new(PacketType::SynAck, seq, ack, wnd, Bytes::new())
    }

    /// Teardown request.
    #[must_use]
    pub fn fin(seq: u32) -> Self {
        Self::new(PacketType::Fin, seq, 0, 0, Bytes::new())
    }

    /// Serialize to wire format.
    ///
    /// The header is written with a zeroed CRC field, the CRC-32 is taken
    /// over header + payload, and the result is patched into place.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());

        buf.put_slice(&MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(self.ptype.to_u8());
        buf.put_u8(self.flags);
        buf.put_u8(HEADER_LEN as u8);
        buf.put_u32(self.seq);
        buf.put_u32(self.ack);
        buf.put_u32(self.wnd);
        buf.put_u16(self.payload.len() as u16);
        buf.put_u32(0); // crc32 placeholder
        buf.put_slice(&self.payload);

        let crc = CRC32.checksum(&buf);
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_be_bytes());

        buf.freeze()
    }

    /// Parse and validate a raw datagram.
    ///
    /// Validation runs cheapest-first: length, magic, version, header
    /// length, size consistency, CRC, and finally the packet type.
    ///
    /// # Errors
    ///
    /// One [`FramingError`] variant per violated invariant. Callers log the
    /// reason and drop the datagram; framing failures never travel further.
    pub fn decode(raw: &[u8]) -> Result<Self, FramingError> {
        if raw.len() < HEADER_LEN {
            return Err(FramingError::ShortFrame { expected: HEADER_LEN, actual: raw.len() });
        }

        if raw[0..2] != MAGIC {
            return Err(FramingError::BadMagic { found: u16::from_be_bytes([raw[0], raw[1]]) });
        }

        if raw[2] != VERSION {
            return Err(FramingError::BadVersion(raw[2]));
        }

        if usize::from(raw[5]) != HEADER_LEN {
            return Err(FramingError::BadHdrLen(raw[5]));
        }

        let payload_len = usize::from(u16::from_be_bytes([
            raw[PAYLOAD_LEN_OFFSET],
            raw[PAYLOAD_LEN_OFFSET + 1],
        ]));

        if raw.len() != HEADER_LEN + payload_len {
            return Err(FramingError::SizeMismatch {
                declared: payload_len,
                actual: raw.len() - HEADER_LEN,
            });
        }

        let carried = read_u32(raw, CRC_OFFSET);
        let mut digest = CRC32.digest();
        digest.update(&raw[..CRC_OFFSET]);
        digest.update(&[0u8; 4]);
        digest.update(&raw[HEADER_LEN..]);
        let computed = digest.finalize();

        if computed != carried {
            return Err(FramingError::CrcMismatch { computed, carried });
        }

        let ptype = PacketType::from_u8(raw[3]).ok_or(FramingError::BadType(raw[3]))?;

        Ok(Self {
            ptype,
            flags: raw[4],
            seq: read_u32(raw, 6),
            ack: read_u32(raw, 10),
            wnd: read_u32(raw, 14),
            payload: Bytes::copy_from_slice(&raw[HEADER_LEN..]),
        })
    }
}

fn read_u32(raw: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let frame = Frame::data(0x0102_0304, vec![0xAAu8; 3]);
        let wire = frame.encode();

        assert_eq!(&wire[0..2], b"RU");
        assert_eq!(wire[2], VERSION);
        assert_eq!(wire[3], PacketType::Data.to_u8());
        assert_eq!(wire[4], 0); // flags reserved
        assert_eq!(wire[5], HEADER_LEN as u8);
        assert_eq!(&wire[6..10], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&wire[18..20], &[0x00, 0x03]); // payload_len
        assert_eq!(wire.len(), HEADER_LEN + 3);
    }

    #[test]
    fn round_trip() {
        let frame = Frame::new(PacketType::SynAck, 7, 42, 64, Bytes::new());
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trip_with_payload() {
        let frame = Frame::data(1, b"ola".to_vec());
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.payload.as_ref(), b"ola");
        assert_eq!(decoded.seq, 1);
    }

    #[test]
    fn reject_short_frame() {
        let result = Frame::decode(&[0u8; 10]);
        assert_eq!(result, Err(FramingError::ShortFrame { expected: HEADER_LEN, actual: 10 }));
    }

    #[test]
    fn reject_bad_magic() {
        let mut wire = Frame::ack(0, 1, 64).encode().to_vec();
        wire[0] = b'X';
        assert!(matches!(Frame::decode(&wire), Err(FramingError::BadMagic { .. })));
    }

    #[test]
    fn reject_bad_version() {
        let mut wire = Frame::ack(0, 1, 64).encode().to_vec();
        wire[2] = 9;
        assert_eq!(Frame::decode(&wire), Err(FramingError::BadVersion(9)));
    }

    #[test]
    fn reject_bad_hdr_len() {
        let mut wire = Frame::ack(0, 1, 64).encode().to_vec();
        wire[5] = 22;
        assert_eq!(Frame::decode(&wire), Err(FramingError::BadHdrLen(22)));
    }

    #[test]
    fn reject_truncated_payload() {
        let wire = Frame::data(1, vec![0u8; 100]).encode();
        let result = Frame::decode(&wire[..wire.len() - 1]);
        assert_eq!(result, Err(FramingError::SizeMismatch { declared: 100, actual: 99 }));
    }

    #[test]
    fn reject_corrupted_payload() {
        let mut wire = Frame::data(1, b"payload".to_vec()).encode().to_vec();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert!(matches!(Frame::decode(&wire), Err(FramingError::CrcMismatch { .. })));
    }

    #[test]
    fn reject_corrupted_header() {
        let mut wire = Frame::data(1, b"payload".to_vec()).encode().to_vec();
        wire[7] ^= 0x01; // flip a seq bit
        assert!(matches!(Frame::decode(&wire), Err(FramingError::CrcMismatch { .. })));
    }

    #[test]
    fn reject_unknown_type() {
        // Craft a datagram with an unknown type byte and a valid CRC.
        let mut frame = Frame::ack(0, 1, 64);
        frame.ptype = PacketType::Data;
        let mut wire = frame.encode().to_vec();
        wire[3] = 0x7F;
        let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(&{
            let mut zeroed = wire.clone();
            zeroed[CRC_OFFSET..CRC_OFFSET + 4].fill(0);
            zeroed
        });
        wire[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_be_bytes());

        assert_eq!(Frame::decode(&wire), Err(FramingError::BadType(0x7F)));
    }

    #[test]
    fn packet_type_wire_values() {
        for ptype in
            [PacketType::Data, PacketType::Ack, PacketType::Syn, PacketType::Fin, PacketType::SynAck]
        {
            assert_eq!(PacketType::from_u8(ptype.to_u8()), Some(ptype));
        }
        assert_eq!(PacketType::from_u8(0x00), None);
    }
}
