//! Line-based codec for tokio.
//!
//! Splits an inbound byte stream on `\n` and yields each line with its
//! terminator removed. Decoding never rejects a line for its content:
//! invalid UTF-8 is replaced (or decoded with the configured encoding) and
//! the engine decides what to do with the text. A line over the length
//! limit is discarded up to its terminator and yielded as
//! [`Line::Overlong`], so the stream stays usable.

#[cfg(feature = "encoding")]
use std::borrow::Cow;
#[cfg(feature = "encoding")]
use std::io;

use bytes::BytesMut;
#[cfg(feature = "encoding")]
use encoding::Encoding;
use tokio_util::codec::{Decoder, Encoder};

use crate::error;

/// Longest line accepted, tags included.
pub const MAX_LINE_LEN: usize = 8191;

/// Bytes of a discarded line kept for diagnostics.
const HEAD_LEN: usize = 64;

/// One unit of the inbound stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    /// A complete line, terminator removed.
    Text(String),
    /// A line longer than the limit. Only its first bytes are kept.
    Overlong {
        /// Start of the line.
        head: String,
        /// Total length, terminator included.
        len: usize,
    },
}

/// Newline-delimited text codec.
#[derive(Debug)]
pub struct LineCodec {
    #[cfg(feature = "encoding")]
    encoding: &'static Encoding,
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
    /// Set while skipping the rest of an overlong line.
    discarding: Option<(String, usize)>,
}

impl LineCodec {
    /// Create a codec for the encoding named by `label`.
    ///
    /// Without the `encoding` feature every label decodes as UTF-8.
    pub fn new(_label: &str) -> error::Result<Self> {
        Ok(Self {
            #[cfg(feature = "encoding")]
            encoding: match Encoding::for_label(_label.as_bytes()) {
                Some(enc) => enc,
                None => {
                    return Err(error::ProtocolError::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("unknown encoding: {}", _label),
                    )));
                }
            },
            next_index: 0,
            max_len: MAX_LINE_LEN,
            discarding: None,
        })
    }

    /// Create a codec with a custom line limit.
    pub fn with_max_len(label: &str, max_len: usize) -> error::Result<Self> {
        let mut codec = Self::new(label)?;
        codec.max_len = max_len;
        Ok(codec)
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    fn decode_text(&self, bytes: &[u8]) -> String {
        #[cfg(feature = "encoding")]
        {
            let (cow, _enc, _had_errors) = self.encoding.decode(bytes);
            cow.into_owned()
        }

        #[cfg(not(feature = "encoding"))]
        {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }

    fn head(&self, bytes: &[u8]) -> String {
        self.decode_text(&bytes[..bytes.len().min(HEAD_LEN)])
    }
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Line>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if let Some((head, skipped)) = self.discarding.take() {
                return Ok(Some(Line::Overlong {
                    head,
                    len: skipped + line.len(),
                }));
            }
            if line.len() > self.max_len {
                return Ok(Some(Line::Overlong {
                    head: self.head(&line),
                    len: line.len(),
                }));
            }

            let mut end = line.len() - 1;
            if end > 0 && line[end - 1] == b'\r' {
                end -= 1;
            }
            Ok(Some(Line::Text(self.decode_text(&line[..end]))))
        } else {
            if let Some((_, skipped)) = self.discarding.as_mut() {
                *skipped += src.len();
                src.clear();
                self.next_index = 0;
            } else if src.len() > self.max_len {
                self.discarding = Some((self.head(src), src.len()));
                src.clear();
                self.next_index = 0;
            } else {
                self.next_index = src.len();
            }
            Ok(None)
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> error::Result<Option<Line>> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(self
                .discarding
                .take()
                .map(|(head, len)| Line::Overlong { head, len })),
            None => {
                // Unterminated final line.
                let rest = src.split_to(src.len());
                self.next_index = 0;
                Ok(Some(Line::Text(self.decode_text(&rest))))
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> error::Result<()> {
        #[cfg(feature = "encoding")]
        {
            let (cow_bytes, _enc, _had_errors) = self.encoding.encode(&line);
            match cow_bytes {
                Cow::Borrowed(b) => dst.extend_from_slice(b),
                Cow::Owned(v) => dst.extend_from_slice(&v),
            }
        }

        #[cfg(not(feature = "encoding"))]
        {
            dst.extend_from_slice(line.as_bytes());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_terminators() {
        let mut codec = LineCodec::new("utf-8").unwrap();
        let mut buf = BytesMut::from("PING :test\r\nPONG :x\n");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Line::Text("PING :test".into())));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Line::Text("PONG :x".into())));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = LineCodec::new("utf-8").unwrap();
        let mut buf = BytesMut::from("PING :");

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"later\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Line::Text("PING :later".into())));
    }

    #[test]
    fn test_decode_too_long_is_skipped() {
        let mut codec = LineCodec::with_max_len("utf-8", 10).unwrap();
        let mut buf = BytesMut::from("this is way too long\nPING :x\r\n");

        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Line::Overlong { len: 21, .. })
        ));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Line::Text("PING :x".into())));
    }

    #[test]
    fn test_decode_discards_unterminated_overlong_line() {
        let mut codec = LineCodec::with_max_len("utf-8", 10).unwrap();
        let mut buf = BytesMut::from("0123456789abc");

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
        buf.extend_from_slice(b"defgh");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
        buf.extend_from_slice(b"ij\r\nPONG :y\r\n");

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Line::Overlong {
                head: "0123456789abc".into(),
                len: 22,
            })
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Line::Text("PONG :y".into())));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new("utf-8").unwrap();
        let mut buf = BytesMut::from(&b"PRIVMSG #a :caf\xe9\r\n"[..]);

        let Some(Line::Text(line)) = codec.decode(&mut buf).unwrap() else {
            panic!("expected a text line");
        };
        assert!(line.starts_with("PRIVMSG #a :caf"));
    }

    #[test]
    fn test_decode_eof_flushes_unterminated_line() {
        let mut codec = LineCodec::new("utf-8").unwrap();
        let mut buf = BytesMut::from("ERROR :bye");

        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(Line::Text("ERROR :bye".into())));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode() {
        let mut codec = LineCodec::new("utf-8").unwrap();
        let mut buf = BytesMut::new();

        codec.encode("PONG :test\r\n".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :test\r\n");
    }
}
