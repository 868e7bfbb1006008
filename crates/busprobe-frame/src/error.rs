/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header carries an unknown message kind tag.
    #[error("invalid message kind tag {0}")]
    InvalidKind(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A complete buffer ended before the message did.
    #[error("truncated message (needed {needed} bytes, got {available})")]
    Truncated { needed: usize, available: usize },

    /// A complete buffer had bytes left over after the message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// An I/O error occurred while reading or writing messages.
    #[error("message I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
