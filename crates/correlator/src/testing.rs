//! Testing utilities.
//!
//! [`EchoDispatcher`] plays the remote side of a transport: it answers each
//! request with the same id it arrived with, the way a background dispatcher
//! does, and keeps every message it received for later assertions.

use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use wire::{Framing, Message, MessageKind, RemoteError, Transport};

type Handler = Arc<dyn Fn(&str, Option<Value>) -> Result<Value, RemoteError> + Send + Sync>;

/// Remote end of a transport that answers requests from a handler.
pub struct EchoDispatcher {
    received: Arc<Mutex<Vec<Message>>>,
    handle: JoinHandle<()>,
}

impl EchoDispatcher {
    /// Answer every request with its params (or `null` when there are none).
    pub fn spawn<T: Transport>(transport: T, framing: Framing) -> Self {
        Self::spawn_with(transport, framing, |_, params| {
            Ok(params.unwrap_or(Value::Null))
        })
    }

    /// Answer every request with `handler(method, params)`.
    pub fn spawn_with<T, F>(transport: T, framing: Framing, handler: F) -> Self
    where
        T: Transport,
        F: Fn(&str, Option<Value>) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        Self::spawn_inner(transport, framing, 1, Arc::new(handler))
    }

    /// Hold replies until `batch` requests have arrived, then send them in
    /// reverse order. Anything still held when the transport closes is
    /// flushed the same way.
    pub fn spawn_reversed<T, F>(transport: T, framing: Framing, batch: usize, handler: F) -> Self
    where
        T: Transport,
        F: Fn(&str, Option<Value>) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        Self::spawn_inner(transport, framing, batch.max(1), Arc::new(handler))
    }

    fn spawn_inner<T: Transport>(
        transport: T,
        framing: Framing,
        batch: usize,
        handler: Handler,
    ) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let (mut reader, mut writer) = wire::split(transport, framing);

        let log = Arc::clone(&received);
        let handle = tokio::spawn(async move {
            let mut held = Vec::with_capacity(batch);

            while let Some(msg) = reader.next().await {
                let message = match msg {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(error = %e, "dispatcher could not decode message");
                        break;
                    }
                };
                log.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(message.clone());

                if message.kind() != MessageKind::Request {
                    continue;
                }

                held.push(answer(&handler, message));
                if held.len() >= batch {
                    for reply in held.drain(..).rev() {
                        if writer.send(reply).await.is_err() {
                            return;
                        }
                    }
                }
            }

            for reply in held.drain(..).rev() {
                if writer.send(reply).await.is_err() {
                    return;
                }
            }
        });

        Self { received, handle }
    }

    /// Every message received so far, in arrival order.
    pub fn received(&self) -> Vec<Message> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the remote side to close the transport.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

fn answer(handler: &Handler, request: Message) -> Message {
    let id = request.id.unwrap_or(Value::Null);
    let method = request.method.unwrap_or_default();

    match handler(&method, request.params) {
        Ok(result) => Message::response(id, result),
        Err(error) => Message::error_response(id, error),
    }
}
