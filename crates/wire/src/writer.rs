//! Outgoing half of a transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Sink;
use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::MessageCodec;
use crate::error::WireError;
use crate::message::Message;

pin_project! {
    /// A sink that frames [`Message`]s onto an [`AsyncWrite`] destination.
    pub struct MessageWriter<W> {
        #[pin]
        inner: FramedWrite<W, MessageCodec>,
    }
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Encode messages onto `writer` with `codec`.
    pub fn new(writer: W, codec: MessageCodec) -> Self {
        Self {
            inner: FramedWrite::new(writer, codec),
        }
    }

    /// Encode, write and flush a single message.
    pub async fn send(&mut self, msg: Message) -> Result<(), WireError> {
        use futures::SinkExt;
        SinkExt::send(&mut self.inner, msg).await
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W> Sink<Message> for MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    type Error = WireError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}
