//! Splitting byte-stream transports into message halves.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::codec::{Framing, MessageCodec};
use crate::reader::MessageReader;
use crate::writer::MessageWriter;

/// A bidirectional byte stream that can be split into owned halves.
///
/// Implemented for TCP and unix sockets here, and for
/// [`MemoryTransport`](crate::testing::MemoryTransport) in tests.
pub trait Transport: Send + 'static {
    type Read: AsyncRead + Unpin + Send + 'static;
    type Write: AsyncWrite + Unpin + Send + 'static;

    fn into_split(self) -> (Self::Read, Self::Write);
}

impl Transport for TcpStream {
    type Read = OwnedReadHalf;
    type Write = OwnedWriteHalf;

    fn into_split(self) -> (Self::Read, Self::Write) {
        TcpStream::into_split(self)
    }
}

#[cfg(unix)]
impl Transport for tokio::net::UnixStream {
    type Read = tokio::net::unix::OwnedReadHalf;
    type Write = tokio::net::unix::OwnedWriteHalf;

    fn into_split(self) -> (Self::Read, Self::Write) {
        tokio::net::UnixStream::into_split(self)
    }
}

/// Split a transport into a message reader and writer using the same framing
/// in both directions.
pub fn split<T: Transport>(
    transport: T,
    framing: Framing,
) -> (MessageReader<T::Read>, MessageWriter<T::Write>) {
    let (read, write) = transport.into_split();
    (
        MessageReader::new(read, MessageCodec::new(framing)),
        MessageWriter::new(write, MessageCodec::new(framing)),
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::message::Message;
    use futures::StreamExt;
    use serde_json::json;
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn unix_socket_halves_carry_messages() {
        let (a, b) = UnixStream::pair().unwrap();
        let (_a_reader, mut a_writer) = split(a, Framing::Lines);
        let (mut b_reader, _b_writer) = split(b, Framing::Lines);

        a_writer
            .send(Message::notification("accountsChanged", Some(json!(["0xabc"]))))
            .await
            .unwrap();

        let received = b_reader.next().await.unwrap().unwrap();
        assert_eq!(received.method.as_deref(), Some("accountsChanged"));
        assert_eq!(received.params, Some(json!(["0xabc"])));
    }
}
