/// Errors that can occur while decoding values, signatures and capability maps.
///
/// Decode errors are local and non-fatal: a malformed stream is reported,
/// never panicked on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The stream ended before the value did.
    #[error("truncated stream (needed {needed} bytes, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// A string or list length prefix points past the end of the stream.
    #[error("length prefix {declared} exceeds the {remaining} remaining bytes")]
    LengthOverflow { declared: usize, remaining: usize },

    /// The signature text does not parse.
    #[error("invalid signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },

    /// A string value is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// Bytes remain after the last complete value.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// A capability map carries the same key twice.
    #[error("duplicate capability key '{0}'")]
    DuplicateKey(String),

    /// Signature or value nesting is deeper than the decoder allows.
    #[error("nesting depth exceeds {0}")]
    DepthExceeded(usize),
}

/// Errors raised when constructing a value that would break its invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// A struct or field name is not an identifier.
    #[error("invalid identifier '{0}'")]
    InvalidName(String),

    /// A list element does not match the list element signature.
    #[error("list element {index} has signature '{found}', expected '{expected}'")]
    ElementMismatch {
        index: usize,
        expected: String,
        found: String,
    },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
