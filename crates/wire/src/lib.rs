//! Framed JSON-RPC transport over async byte streams.
//!
//! This crate moves [`Message`]s between two processes and nothing more:
//!
//! - [`MessageCodec`] frames messages with `Content-Length` headers or as
//!   newline-delimited JSON
//! - [`MessageReader`] turns an `AsyncRead` into a `Stream` of messages
//! - [`MessageWriter`] turns an `AsyncWrite` into a `Sink` of messages
//! - [`split`] does both for anything implementing [`Transport`]
//!
//! Matching responses to requests is left to the `correlator` crate.

mod codec;
mod error;
mod message;
mod reader;
mod transport;
mod writer;

pub mod testing;

pub use codec::{DEFAULT_MAX_FRAME_SIZE, Framing, MAX_HEADER_SIZE, MessageCodec};
pub use error::WireError;
pub use message::{JSONRPC_VERSION, Message, MessageKind, RemoteError};
pub use reader::MessageReader;
pub use transport::{Transport, split};
pub use writer::MessageWriter;

use std::io;
use tokio::net::{TcpStream, ToSocketAddrs};

/// Connect over TCP and split the stream.
pub async fn connect(
    addr: impl ToSocketAddrs,
    framing: Framing,
) -> io::Result<(
    MessageReader<tokio::net::tcp::OwnedReadHalf>,
    MessageWriter<tokio::net::tcp::OwnedWriteHalf>,
)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(split(stream, framing))
}
