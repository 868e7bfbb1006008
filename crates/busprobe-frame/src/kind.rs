use std::fmt;

use crate::error::FrameError;

/// Message kinds and their wire tags.
///
/// Calls expect a `Reply` or `Error` carrying the same message id.
/// Posts and events carry no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Call = 1,
    Reply = 2,
    Error = 3,
    Post = 4,
    Event = 5,
}

impl MessageKind {
    /// Wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Call => "call",
            MessageKind::Reply => "reply",
            MessageKind::Error => "error",
            MessageKind::Post => "post",
            MessageKind::Event => "event",
        }
    }

    /// Returns true for kinds that answer a call.
    pub fn is_response(self) -> bool {
        matches!(self, MessageKind::Reply | MessageKind::Error)
    }

    /// Returns true for kinds that expect no reply.
    pub fn is_one_way(self) -> bool {
        matches!(self, MessageKind::Post | MessageKind::Event)
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, FrameError> {
        match tag {
            1 => Ok(MessageKind::Call),
            2 => Ok(MessageKind::Reply),
            3 => Ok(MessageKind::Error),
            4 => Ok(MessageKind::Post),
            5 => Ok(MessageKind::Event),
            other => Err(FrameError::InvalidKind(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip() {
        for kind in [
            MessageKind::Call,
            MessageKind::Reply,
            MessageKind::Error,
            MessageKind::Post,
            MessageKind::Event,
        ] {
            assert_eq!(MessageKind::try_from(kind.tag()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_tags_rejected() {
        assert!(matches!(
            MessageKind::try_from(0),
            Err(FrameError::InvalidKind(0))
        ));
        assert!(matches!(
            MessageKind::try_from(6),
            Err(FrameError::InvalidKind(6))
        ));
    }

    #[test]
    fn classification() {
        assert!(MessageKind::Reply.is_response());
        assert!(MessageKind::Error.is_response());
        assert!(!MessageKind::Call.is_response());
        assert!(MessageKind::Post.is_one_way());
        assert!(MessageKind::Event.is_one_way());
        assert!(!MessageKind::Call.is_one_way());
    }
}
