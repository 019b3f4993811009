//! Error types for the wire layer.

use std::io;

/// Errors raised while framing, encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A header line was not valid UTF-8 or had no `name: value` shape.
    #[error("invalid frame header")]
    InvalidHeader,

    #[error("frame has no Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),

    /// The frame is larger than the codec accepts.
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("could not decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("could not encode message: {0}")]
    Encode(#[source] serde_json::Error),
}
