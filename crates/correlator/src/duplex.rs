//! The transport-facing side of a correlator.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::{Sink, Stream};
use tokio::sync::mpsc;
use wire::Message;

use crate::correlator::Inner;

/// Duplex handed to the transport.
///
/// As a [`Stream`] it yields tagged requests in the order they were sent. It
/// never produces anything on its own initiative: polling with nothing queued
/// is simply `Pending`. The stream ends after the correlator is shut down or
/// dropped.
///
/// As a [`Sink`] it ingests messages coming back from the remote side. Every
/// write completes immediately, whether or not the message matched a pending
/// call, so an upstream reader is never stalled.
///
/// Holds only a weak reference to the correlator; writes after the correlator
/// is gone are discarded.
pub struct CorrelatorStream {
    correlator: Weak<Inner>,
    outgoing: mpsc::UnboundedReceiver<Message>,
}

impl CorrelatorStream {
    pub(crate) fn new(correlator: Weak<Inner>, outgoing: mpsc::UnboundedReceiver<Message>) -> Self {
        Self {
            correlator,
            outgoing,
        }
    }

    /// Same as writing `message` into the sink.
    pub fn ingest(&self, message: Message) {
        match self.correlator.upgrade() {
            Some(inner) => inner.ingest(message),
            None => tracing::debug!("correlator dropped; discarding incoming message"),
        }
    }
}

impl Stream for CorrelatorStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.outgoing.poll_recv(cx)
    }
}

impl Sink<Message> for CorrelatorStream {
    type Error = Infallible;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.ingest(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
