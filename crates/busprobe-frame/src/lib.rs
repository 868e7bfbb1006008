//! Bus message framing.
//!
//! Every wire message is a fixed 21-byte little-endian header followed by
//! the payload:
//! - 1-byte message kind (call, reply, error, post, event)
//! - 4-byte service id, object id, action id and message id
//! - 4-byte payload length
//!
//! The transport is assumed to be a reliable, ordered byte stream; there is
//! no magic number and no checksum.

pub mod codec;
pub mod error;
pub mod kind;
pub mod stream;

pub use codec::{
    decode_message, encode_message, FrameConfig, Header, Message, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use kind::MessageKind;
pub use stream::MessageCodec;
