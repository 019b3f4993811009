//! Incoming half of a transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::MessageCodec;
use crate::error::WireError;
use crate::message::Message;

pin_project! {
    /// A stream of decoded [`Message`]s read from an [`AsyncRead`] source.
    ///
    /// The stream ends when the source reaches EOF. A decode error is
    /// yielded once, after which the stream is finished.
    pub struct MessageReader<R> {
        #[pin]
        inner: FramedRead<R, MessageCodec>,
    }
}

impl<R> MessageReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Decode messages from `reader` with `codec`.
    pub fn new(reader: R, codec: MessageCodec) -> Self {
        Self {
            inner: FramedRead::new(reader, codec),
        }
    }
}

impl<R> Stream for MessageReader<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<Message, WireError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_frames_in_order() {
        let data = crate::testing::encode_frames(
            crate::codec::Framing::ContentLength,
            &[
                json!({"id": 1, "result": "a"}),
                json!({"method": "accountsChanged", "params": []}),
            ],
        );
        let mut reader = MessageReader::new(Cursor::new(data), MessageCodec::content_length());

        let first = reader.next().await.unwrap().unwrap();
        assert_eq!(first.result, Some(json!("a")));

        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(second.method.as_deref(), Some("accountsChanged"));

        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn reads_lines() {
        let data = b"{\"id\":1,\"result\":true}\n{\"id\":2,\"result\":false}".to_vec();
        let reader = MessageReader::new(Cursor::new(data), MessageCodec::lines());

        let ids: Vec<_> = reader
            .map(|m| m.unwrap().id.unwrap())
            .collect()
            .await;
        assert_eq!(ids, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn surfaces_decode_errors() {
        let data = b"Content-Length: 5\r\n\r\nnope!".to_vec();
        let mut reader = MessageReader::new(Cursor::new(data), MessageCodec::content_length());

        assert!(matches!(
            reader.next().await,
            Some(Err(WireError::Decode(_)))
        ));
    }
}
