//! A correlator bound to a wire transport.

use eyre::WrapErr;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wire::{Message, MessageReader, MessageWriter, Transport};

use crate::config::CorrelatorConfig;
use crate::correlator::{CorrelatorBuilder, RequestCorrelator};
use crate::duplex::CorrelatorStream;
use crate::error::Error;
use crate::ids::CorrelationId;

/// RPC channel to a remote dispatcher.
///
/// Owns a reader task that feeds decoded messages into the correlator and a
/// writer task that frames outgoing requests onto the transport. When the
/// transport closes, every pending call resolves with [`Error::Cancelled`].
pub struct Channel {
    correlator: RequestCorrelator,
    cancel_token: CancellationToken,

    reader_handle: Option<JoinHandle<()>>,
    writer_handle: Option<JoinHandle<()>>,
}

impl Channel {
    /// Connect over TCP using the framing named in `config`.
    pub async fn connect(addr: impl ToSocketAddrs, config: CorrelatorConfig) -> eyre::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .wrap_err("connecting to remote dispatcher")?;
        stream.set_nodelay(true).wrap_err("configuring socket")?;

        Ok(Self::from_transport(
            stream,
            RequestCorrelator::builder().config(config),
        ))
    }

    /// Bind a correlator built from `builder` to `transport`.
    ///
    /// Must be called within a tokio runtime.
    pub fn from_transport<T: Transport>(transport: T, builder: CorrelatorBuilder) -> Self {
        let (reader, writer) = wire::split(transport, builder.config_ref().framing);
        let (correlator, duplex) = builder.build();
        let (incoming, outgoing) = duplex.split();
        let cancel_token = CancellationToken::new();

        let reader_handle =
            spawn_reader_task(reader, incoming, correlator.clone(), cancel_token.clone());
        let writer_handle =
            spawn_writer_task(outgoing, writer, correlator.clone(), cancel_token.clone());

        Self {
            correlator,
            cancel_token,
            reader_handle: Some(reader_handle),
            writer_handle: Some(writer_handle),
        }
    }

    /// The correlator driven by this channel.
    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    /// See [`RequestCorrelator::send_async`].
    pub fn send_async<F>(&self, request: Message, callback: F) -> Result<CorrelationId, Error>
    where
        F: FnOnce(Result<Message, Error>) + Send + 'static,
    {
        self.correlator.send_async(request, callback)
    }

    /// See [`RequestCorrelator::call`].
    pub async fn call(&self, request: Message) -> Result<Message, Error> {
        self.correlator.call(request).await
    }

    /// See [`RequestCorrelator::request`].
    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<Value, Error> {
        self.correlator.request(method, params).await
    }

    /// Subscribe to notifications from the remote side.
    pub fn notifications(&self) -> mpsc::UnboundedReceiver<Message> {
        self.correlator.notifications()
    }

    /// Cancel pending calls, stop both tasks and wait for them to finish.
    pub async fn shutdown(mut self) -> eyre::Result<()> {
        self.correlator.shutdown();
        self.cancel_token.cancel();

        if let Some(handle) = self.reader_handle.take() {
            handle.await.wrap_err("joining reader task")?;
        }
        if let Some(handle) = self.writer_handle.take() {
            handle.await.wrap_err("joining writer task")?;
        }

        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.correlator.shutdown();
        self.cancel_token.cancel();
    }
}

fn spawn_reader_task<R>(
    mut reader: MessageReader<R>,
    mut incoming: SplitSink<CorrelatorStream, Message>,
    correlator: RequestCorrelator,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("reader task cancelled");
                    break;
                }
                msg = reader.next() => {
                    match msg {
                        Some(Ok(message)) => {
                            tracing::trace!(?message, "received message");
                            let _ = incoming.send(message).await;
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "transport error");
                            break;
                        }
                        None => {
                            tracing::debug!("transport closed");
                            break;
                        }
                    }
                }
            }
        }

        correlator.shutdown();
    })
}

fn spawn_writer_task<W>(
    mut outgoing: SplitStream<CorrelatorStream>,
    mut writer: MessageWriter<W>,
    correlator: RequestCorrelator,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("writer task cancelled");
                    break;
                }
                msg = outgoing.next() => {
                    let Some(message) = msg else {
                        tracing::debug!("correlator closed");
                        break;
                    };
                    if let Err(e) = writer.send(message).await {
                        tracing::error!(error = %e, "failed to write request");
                        correlator.shutdown();
                        break;
                    }
                }
            }
        }
    })
}
