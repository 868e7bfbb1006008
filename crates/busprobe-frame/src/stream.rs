use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::{decode_message, encode_message, FrameConfig, Message};
use crate::error::{FrameError, Result};

/// Streaming codec for use with `tokio_util::codec::{FramedRead, FramedWrite}`.
///
/// Handles partial reads internally: the framed stream yields complete
/// messages only.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    config: FrameConfig,
}

impl MessageCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let message = decode_message(src, self.config.max_payload_size)?;
        if let Some(message) = &message {
            trace!(
                kind = %message.header.kind,
                id = message.header.id,
                len = message.payload.len(),
                "decoded message"
            );
        }
        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<()> {
        if message.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: message.payload.len(),
                max: self.config.max_payload_size,
            });
        }
        encode_message(&message, dst)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::{Header, HEADER_SIZE};
    use crate::kind::MessageKind;

    fn message(id: u32, payload: &'static [u8]) -> Message {
        Message::new(
            Header::new(MessageKind::Call, 1, 1, 108, id),
            Bytes::from_static(payload),
        )
    }

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (left, right) = tokio::io::duplex(1024);
        let mut writer = FramedWrite::new(left, MessageCodec::new());
        let mut reader = FramedRead::new(right, MessageCodec::new());

        writer.send(message(1, b"one")).await.unwrap();
        writer.send(message(2, b"two")).await.unwrap();
        writer.send(message(3, b"")).await.unwrap();

        assert_eq!(reader.next().await.unwrap().unwrap(), message(1, b"one"));
        assert_eq!(reader.next().await.unwrap().unwrap(), message(2, b"two"));
        assert_eq!(reader.next().await.unwrap().unwrap(), message(3, b""));
    }

    #[tokio::test]
    async fn partial_reads_are_reassembled() {
        let bytes = message(4, b"slow").encode().unwrap();
        let (mut left, right) = tokio::io::duplex(1);
        let mut reader = FramedRead::new(right, MessageCodec::new());

        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            for byte in bytes.iter() {
                left.write_all(&[*byte]).await.unwrap();
            }
        });

        assert_eq!(reader.next().await.unwrap().unwrap(), message(4, b"slow"));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn clean_eof_ends_stream() {
        let mut reader = FramedRead::new(Cursor::new(Vec::<u8>::new()), MessageCodec::new());
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn eof_mid_message_is_connection_closed() {
        let bytes = message(5, b"cut short").encode().unwrap();
        let partial = bytes[..HEADER_SIZE + 3].to_vec();
        let mut reader = FramedRead::new(Cursor::new(partial), MessageCodec::new());
        let err = reader.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn encoder_enforces_max_payload() {
        let codec = MessageCodec::with_config(FrameConfig {
            max_payload_size: 2,
        });
        let mut writer = FramedWrite::new(Vec::<u8>::new(), codec);
        let err = writer.send(message(6, b"too long")).await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 8, max: 2 }));
    }
}
