//! Codec error types

use thiserror::Error;

/// Errors raised while encoding or decoding frames and packets
///
/// Framing noise (bytes outside a frame) is never an error; the frame
/// reader absorbs it and only counts it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Encoded payload would not fit the 8-bit length field
    #[error("payload of {size} bytes exceeds the 255 byte frame limit")]
    PayloadTooLarge {
        /// Size the payload would have had
        size: usize,
    },

    /// Declared length does not match what the packet variant needs
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame {
        /// Size required by the packet variant
        expected: usize,
        /// Size actually present
        actual: usize,
    },

    /// First payload byte is not a known packet type
    #[error("unknown packet type: 0x{0:02X}")]
    UnknownPacketType(u8),

    /// Device type byte is outside the closed set
    #[error("unknown device type: 0x{0:02X}")]
    UnknownDeviceType(u8),

    /// 32-byte name field has no null terminator
    #[error("device name is not null-terminated")]
    UnterminatedName,

    /// Name contains bytes outside printable ASCII text
    #[error("device name is not ASCII")]
    NonAsciiName,

    /// Name does not fit the 31 usable bytes of the name field
    #[error("device name of {len} bytes exceeds 31 bytes")]
    NameTooLong {
        /// Length of the rejected name
        len: usize,
    },

    /// Output buffer cannot hold the encoded bytes
    #[error("buffer too small: {needed} bytes needed")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
    },

    /// The same id appears twice in one synchronization set
    #[error("duplicate device id {0}")]
    DuplicateDeviceId(u8),
}
