/// Errors that can occur while decoding console frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The buffer is not the size the frame type requires.
    #[error("bad frame length ({actual} bytes, expected {expected})")]
    BadLength { expected: usize, actual: usize },

    /// A LOOP frame did not start with "LOO".
    #[error("invalid LOOP header")]
    BadHeader,

    /// A LOOP frame carried an unknown packet type at offset 4.
    #[error("unknown LOOP packet type {0}")]
    BadPacketType(u8),

    /// The frame failed its CRC check.
    #[error("CRC mismatch")]
    BadCrc,

    /// A packed date/time that names no real instant.
    #[error("invalid packed timestamp (date 0x{date:04X}, time 0x{time:04X})")]
    InvalidTimestamp { date: u16, time: u16 },

    /// A timestamp that cannot be expressed in the packed format.
    #[error("timestamp out of encodable range: {0}")]
    TimestampOutOfRange(String),

    /// An archive slot with an unrecognised data-structure type.
    #[error("unknown archive record type 0x{0:02X}")]
    UnknownFormat(u8),
}

pub type Result<T> = std::result::Result<T, FrameError>;
