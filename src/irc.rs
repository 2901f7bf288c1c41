//! IRC message codec for tokio.
//!
//! Encodes [`Message`] values into CRLF-terminated lines and decodes lines
//! back into messages. The client reads through [`LineCodec`] so that a
//! malformed line reaches the engine as text; this codec's decoder is for
//! callers that want parsed messages directly. An overlong line is reported
//! as [`MessageTooLong`](error::ProtocolError::MessageTooLong) after it has
//! been consumed.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error;
use crate::line::{Line, LineCodec};
use crate::message::Message;

/// Tokio codec for IRC messages.
#[derive(Debug)]
pub struct IrcCodec {
    inner: LineCodec,
}

impl IrcCodec {
    /// Create a codec for the encoding named by `label`.
    pub fn new(label: &str) -> error::Result<Self> {
        LineCodec::new(label).map(|codec| Self { inner: codec })
    }

    /// Create a codec with a custom line limit.
    pub fn with_max_len(label: &str, max_len: usize) -> error::Result<Self> {
        LineCodec::with_max_len(label, max_len).map(|codec| Self { inner: codec })
    }

    /// Reject line breaks and NUL inside an encoded line.
    ///
    /// A parameter carrying `\r` or `\n` would otherwise inject a second
    /// command.
    pub fn sanitize(data: String) -> error::Result<String> {
        match data.chars().find(|c| matches!(c, '\r' | '\n' | '\0')) {
            Some(ch) => Err(error::ProtocolError::IllegalControlChar(ch)),
            None => Ok(data),
        }
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        loop {
            let line = match self.inner.decode(src)? {
                None => return Ok(None),
                Some(Line::Text(line)) => line,
                Some(Line::Overlong { len, .. }) => {
                    return Err(error::ProtocolError::MessageTooLong {
                        actual: len,
                        limit: self.inner.max_len(),
                    });
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return line.parse::<Message>().map(Some);
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        let line = msg
            .encode()
            .map_err(|cause| error::ProtocolError::InvalidMessage {
                string: msg.to_string(),
                cause,
            })?;
        let mut line = Self::sanitize(line)?;
        line.push_str("\r\n");
        if line.len() > self.inner.max_len() {
            return Err(error::ProtocolError::MessageTooLong {
                actual: line.len(),
                limit: self.inner.max_len(),
            });
        }
        self.inner.encode(line, dst)
    }
}
