use std::time::Duration;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error (dial, bind, accept).
    #[error("transport error: {0}")]
    Transport(#[from] busprobe_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] busprobe_frame::FrameError),

    /// Payload did not decode.
    #[error("decode error: {0}")]
    Decode(#[from] busprobe_value::DecodeError),

    /// The connection went away before an answer was observed.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// No answer within the caller's deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The peer answered with something the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The peer answered with an error message.
    #[error("remote error: {0}")]
    Remote(String),

    /// The peer explicitly rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The endpoint was closed locally.
    #[error("endpoint closed")]
    Closed,
}

impl PeerError {
    /// True for errors raised before any answer from the peer could be seen.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            PeerError::Transport(_) | PeerError::Disconnected(_) | PeerError::Closed
        )
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
