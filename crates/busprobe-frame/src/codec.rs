use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::MessageKind;

/// Header: kind (1) + service (4) + object (4) + action (4) + id (4) + length (4) = 21 bytes.
pub const HEADER_SIZE: usize = 21;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Routing part of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    pub kind: MessageKind,
    pub service: u32,
    pub object: u32,
    pub action: u32,
    /// Correlates a call with its reply or error.
    pub id: u32,
}

impl Header {
    pub fn new(kind: MessageKind, service: u32, object: u32, action: u32, id: u32) -> Self {
        Self {
            kind,
            service,
            object,
            action,
            id,
        }
    }

    /// Header of the reply to this message.
    pub fn reply(&self) -> Self {
        Self {
            kind: MessageKind::Reply,
            ..*self
        }
    }

    /// Header of the error answering this message.
    pub fn error(&self) -> Self {
        Self {
            kind: MessageKind::Error,
            ..*self
        }
    }
}

/// A wire message: header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub payload: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(header: Header, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// The total wire size of this message (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode into a standalone buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_message(self, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one message from a complete buffer.
    ///
    /// Fails when the buffer is shorter than the header or the declared
    /// payload, or when bytes remain after the payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let mut src = BytesMut::from(bytes);
        let (header, payload_len) = read_header(&src)?;
        let total = HEADER_SIZE + payload_len;
        if src.len() < total {
            return Err(FrameError::Truncated {
                needed: total,
                available: src.len(),
            });
        }
        if src.len() > total {
            return Err(FrameError::TrailingBytes(src.len() - total));
        }
        src.advance(HEADER_SIZE);
        Ok(Self {
            header,
            payload: src.freeze(),
        })
    }
}

/// Encode a message into the wire format.
///
/// Wire format (all integers little-endian):
/// ```text
/// ┌──────┬─────────┬────────┬────────┬────────┬────────┬───────────────┐
/// │ Kind │ Service │ Object │ Action │ Id     │ Length │ Payload       │
/// │ (1B) │ (4B)    │ (4B)   │ (4B)   │ (4B)   │ (4B)   │ (Length bytes)│
/// └──────┴─────────┴────────┴────────┴────────┴────────┴───────────────┘
/// ```
pub fn encode_message(message: &Message, dst: &mut BytesMut) -> Result<()> {
    let payload = message.payload.as_ref();
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    let header = &message.header;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(header.kind.tag());
    dst.put_u32_le(header.service);
    dst.put_u32_le(header.object);
    dst.put_u32_le(header.action);
    dst.put_u32_le(header.id);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a message from a streaming buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let (header, payload_len) = read_header(src)?;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Message { header, payload }))
}

/// Parse the fixed header without consuming it. Caller guarantees `HEADER_SIZE` bytes.
fn read_header(src: &[u8]) -> Result<(Header, usize)> {
    let mut cursor = &src[..HEADER_SIZE];
    let kind = MessageKind::try_from(cursor.get_u8())?;
    let service = cursor.get_u32_le();
    let object = cursor.get_u32_le();
    let action = cursor.get_u32_le();
    let id = cursor.get_u32_le();
    let payload_len = cursor.get_u32_le() as usize;
    Ok((Header::new(kind, service, object, action, id), payload_len))
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: u32, payload: &'static [u8]) -> Message {
        Message::new(
            Header::new(MessageKind::Call, 0, 0, 8, id),
            Bytes::from_static(payload),
        )
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let message = call(7, b"capabilities");
        let mut buf = BytesMut::new();
        encode_message(&message, &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + 12);

        let decoded = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, message);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_field_order() {
        let message = Message::new(
            Header::new(MessageKind::Post, 0x0403_0201, 0x0807_0605, 0x0c0b_0a09, 0x100f_0e0d),
            Bytes::from_static(b"\xAA"),
        );
        let bytes = message.encode().unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[
                4, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 1, 0, 0, 0, 0xAA
            ]
        );
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[1u8, 0, 0][..]);
        assert!(decode_message(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_message(&call(1, b"hello"), &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_message(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_invalid_kind() {
        let mut buf = BytesMut::from(&[9u8; HEADER_SIZE][..]);
        let result = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::InvalidKind(9))));
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u8(MessageKind::Call.tag());
        buf.put_slice(&[0u8; 16]);
        buf.put_u32_le(32 * 1024 * 1024);

        let result = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_multiple_messages() {
        let mut buf = BytesMut::new();
        encode_message(&call(1, b"first"), &mut buf).unwrap();
        encode_message(&call(2, b"second"), &mut buf).unwrap();

        let m1 = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        let m2 = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(m1.header.id, 1);
        assert_eq!(m2.payload.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let message = call(3, b"");
        let decoded = Message::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(message.wire_size(), HEADER_SIZE);
    }

    #[test]
    fn test_complete_decode_rejects_every_truncation() {
        let bytes = call(5, b"payload").encode().unwrap();
        for cut in 0..bytes.len() {
            let result = Message::decode(&bytes[..cut]);
            assert!(
                matches!(result, Err(FrameError::Truncated { .. })),
                "cut at {cut} should be truncated"
            );
        }
    }

    #[test]
    fn test_complete_decode_rejects_trailing_bytes() {
        let mut bytes = call(5, b"payload").encode().unwrap().to_vec();
        bytes.push(0);
        assert!(matches!(
            Message::decode(&bytes),
            Err(FrameError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_reply_and_error_headers_keep_routing() {
        let header = Header::new(MessageKind::Call, 1, 2, 3, 4);
        assert_eq!(header.reply(), Header::new(MessageKind::Reply, 1, 2, 3, 4));
        assert_eq!(header.error(), Header::new(MessageKind::Error, 1, 2, 3, 4));
    }
}
