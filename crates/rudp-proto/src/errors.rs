//! Framing error type.
//!
//! Every way a raw datagram can fail validation gets its own variant so the
//! engines can log a precise reason before discarding. Framing failures are
//! always local: the peer never learns about them and recovers through
//! retransmission.

use thiserror::Error;

/// Reasons a raw datagram is rejected by [`crate::Frame::decode`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Datagram is shorter than the fixed header
    #[error("short frame: {actual} bytes, header needs {expected}")]
    ShortFrame {
        /// Minimum length required (the fixed header size)
        expected: usize,
        /// Length actually received
        actual: usize,
    },

    /// Magic prefix does not match `b"RU"`
    #[error("bad magic: {found:#06x}")]
    BadMagic {
        /// The two prefix bytes, big-endian
        found: u16,
    },

    /// Unsupported protocol version
    #[error("bad version: {0}")]
    BadVersion(u8),

    /// Self-described header length disagrees with the fixed size
    #[error("bad header length: {0}")]
    BadHdrLen(u8),

    /// Datagram length differs from header size + declared payload length
    #[error("size mismatch: header declares {declared} payload bytes, datagram carries {actual}")]
    SizeMismatch {
        /// Payload length declared in the header
        declared: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// CRC-32 recomputation disagrees with the carried value
    #[error("crc mismatch: computed {computed:#010x}, carried {carried:#010x}")]
    CrcMismatch {
        /// CRC computed over the received bytes
        computed: u32,
        /// CRC carried in the header
        carried: u32,
    },

    /// Unrecognized packet type byte
    #[error("bad packet type: {0:#04x}")]
    BadType(u8),
}
