//! In-memory transport.

use tokio::io::{DuplexStream, duplex};

use crate::transport::Transport;

/// One end of an in-memory, bidirectional byte pipe.
///
/// ```
/// use wire::{Framing, split, testing::MemoryTransport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (ui, background) = MemoryTransport::pair();
/// let (ui_reader, ui_writer) = split(ui, Framing::ContentLength);
/// let (bg_reader, bg_writer) = split(background, Framing::ContentLength);
/// # }
/// ```
pub struct MemoryTransport {
    read: DuplexStream,
    write: DuplexStream,
}

impl MemoryTransport {
    /// Two connected transports with 64 KiB of buffering per direction.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_buffer_size(64 * 1024)
    }

    /// Small buffers are useful for exercising backpressure.
    pub fn pair_with_buffer_size(buffer_size: usize) -> (Self, Self) {
        let (a_write, b_read) = duplex(buffer_size);
        let (b_write, a_read) = duplex(buffer_size);

        (
            MemoryTransport {
                read: a_read,
                write: a_write,
            },
            MemoryTransport {
                read: b_read,
                write: b_write,
            },
        )
    }
}

impl Transport for MemoryTransport {
    type Read = DuplexStream;
    type Write = DuplexStream;

    fn into_split(self) -> (Self::Read, Self::Write) {
        (self.read, self.write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Framing;
    use crate::message::Message;
    use crate::split;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn request_and_response_cross_the_pipe() {
        let (client, server) = MemoryTransport::pair();
        let (mut client_reader, mut client_writer) = split(client, Framing::Lines);
        let (mut server_reader, mut server_writer) = split(server, Framing::Lines);

        client_writer
            .send(Message::request(1, "eth_chainId", None))
            .await
            .unwrap();
        let request = server_reader.next().await.unwrap().unwrap();
        assert_eq!(request.method.as_deref(), Some("eth_chainId"));

        server_writer
            .send(Message::response(request.id.unwrap(), json!("0x1")))
            .await
            .unwrap();
        let response = client_reader.next().await.unwrap().unwrap();
        assert_eq!(response.result, Some(json!("0x1")));
    }

    #[tokio::test]
    async fn dropping_the_writer_ends_the_reader() {
        let (client, server) = MemoryTransport::pair();
        let (_client_reader, client_writer) = split(client, Framing::ContentLength);
        let (mut server_reader, _server_writer) = split(server, Framing::ContentLength);

        drop(client_writer);
        assert!(server_reader.next().await.is_none());
    }

    #[tokio::test]
    async fn frames_larger_than_the_buffer_arrive_whole() {
        let (client, server) = MemoryTransport::pair_with_buffer_size(16);
        let (_client_reader, mut client_writer) = split(client, Framing::ContentLength);
        let (mut server_reader, _server_writer) = split(server, Framing::ContentLength);

        let payload = "x".repeat(1024);
        let params = json!([payload]);
        let writer = tokio::spawn(async move {
            client_writer
                .send(Message::request(1, "big", Some(params)))
                .await
                .unwrap();
            client_writer
        });

        let request = server_reader.next().await.unwrap().unwrap();
        assert_eq!(request.params, Some(json!([payload])));
        let _ = writer.await.unwrap();
    }
}
