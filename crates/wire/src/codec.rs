//! Message framing using tokio-util codecs.
//!
//! [`MessageCodec`] implements `Decoder` and `Encoder` for [`Message`] over
//! one of two framings:
//!
//! ```text
//! Content-Length: <length>\r\n      Framing::ContentLength
//! \r\n
//! <JSON body>
//!
//! <JSON body>\n                     Framing::Lines
//! ```

use bytes::{Buf, BufMut, BytesMut};
use serde::Deserialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WireError;
use crate::message::Message;

/// Default maximum frame size (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Header blocks longer than this are rejected before a terminator is found.
pub const MAX_HEADER_SIZE: usize = 8 * 1024;

/// How messages are delimited on the byte stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// LSP-style `Content-Length` headers.
    #[default]
    ContentLength,
    /// Newline-delimited JSON.
    Lines,
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content-length" => Ok(Framing::ContentLength),
            "lines" => Ok(Framing::Lines),
            other => Err(format!("unknown framing {other:?}")),
        }
    }
}

/// Codec for framed JSON-RPC messages.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    framing: Framing,
    max_frame_size: usize,
    /// Bytes already searched for the header terminator.
    scanned: usize,
}

impl MessageCodec {
    /// Codec for `framing` with the default frame size limit.
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            scanned: 0,
        }
    }

    /// Codec for `Content-Length` framed messages.
    pub fn content_length() -> Self {
        Self::new(Framing::ContentLength)
    }

    /// Codec for newline-delimited messages.
    pub fn lines() -> Self {
        Self::new(Framing::Lines)
    }

    /// Reject frames larger than `max_frame_size` bytes with
    /// [`WireError::FrameTooLarge`].
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    fn check_size(&self, size: usize) -> Result<(), WireError> {
        if size > self.max_frame_size {
            tracing::warn!(size, max = self.max_frame_size, "rejecting oversized frame");
            return Err(WireError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    fn decode_content_length(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        // the terminator may straddle the previous scan boundary
        let start = self
            .scanned
            .saturating_sub(HEADER_TERMINATOR.len() - 1)
            .min(src.len());
        let Some(header_len) = src[start..]
            .windows(HEADER_TERMINATOR.len())
            .position(|w| w == HEADER_TERMINATOR)
            .map(|pos| start + pos)
        else {
            if src.len() > MAX_HEADER_SIZE {
                tracing::warn!(buffered = src.len(), "no header terminator within limit");
                return Err(WireError::FrameTooLarge {
                    size: src.len(),
                    max: MAX_HEADER_SIZE,
                });
            }
            self.scanned = src.len();
            return Ok(None);
        };
        self.scanned = header_len;

        let body_len = content_length(&src[..header_len])?;
        self.check_size(body_len)?;

        let body_start = header_len + HEADER_TERMINATOR.len();
        let frame_len = body_start + body_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let message = serde_json::from_slice(&src[body_start..frame_len]);
        src.advance(frame_len);
        self.scanned = 0;
        message.map(Some).map_err(|e| {
            tracing::debug!(error = %e, "frame body is not a message");
            WireError::Decode(e)
        })
    }

    fn decode_lines(&self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        loop {
            let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                self.check_size(src.len())?;
                return Ok(None);
            };

            let line = src.split_to(newline + 1);
            let line = trim_line(&line);
            if line.is_empty() {
                continue;
            }
            self.check_size(line.len())?;
            return serde_json::from_slice(line)
                .map(Some)
                .map_err(WireError::Decode);
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(Framing::default())
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line.trim_ascii()
}

/// Find and parse the `Content-Length` header, ignoring any others.
fn content_length(header: &[u8]) -> Result<usize, WireError> {
    let header = std::str::from_utf8(header).map_err(|_| WireError::InvalidHeader)?;

    let mut length = None;
    for line in header.split("\r\n").filter(|l| !l.is_empty()) {
        let (name, value) = line.split_once(':').ok_or(WireError::InvalidHeader)?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            let value = value.trim();
            length = Some(
                value
                    .parse()
                    .map_err(|_| WireError::InvalidContentLength(value.to_string()))?,
            );
        }
    }

    length.ok_or(WireError::MissingContentLength)
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.framing {
            Framing::ContentLength => self.decode_content_length(src),
            Framing::Lines => self.decode_lines(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }

        // A final line may legitimately lack its newline.
        if self.framing == Framing::Lines && !src.is_empty() {
            src.put_u8(b'\n');
            return self.decode(src);
        }

        if src.is_empty() {
            Ok(None)
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended inside a frame",
            )
            .into())
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item).map_err(WireError::Encode)?;
        self.check_size(body.len())?;

        match self.framing {
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", body.len());
                dst.reserve(header.len() + body.len());
                dst.put_slice(header.as_bytes());
                dst.put_slice(&body);
            }
            Framing::Lines => {
                dst.reserve(body.len() + 1);
                dst.put_slice(&body);
                dst.put_u8(b'\n');
            }
        }

        Ok(())
    }
}
