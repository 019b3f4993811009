//! Request/response correlation over an ordered message stream.
//!
//! The transport underneath only moves discrete messages; it has no notion of
//! which response belongs to which request. [`RequestCorrelator`] provides
//! that by rewriting each outgoing request's `id` to a fresh
//! [`CorrelationId`], remembering the caller's own id and callback, and
//! resolving the callback when a response with the same correlation id is
//! written back through [`CorrelatorStream`]. The caller's id is put back on
//! the response before the callback sees it.
//!
//! ```text
//! send_async ──► pending ──► CorrelatorStream (Stream) ──► transport
//!                   ▲
//! callback ◄─ delivery task ◄─ ingest ◄─ CorrelatorStream (Sink) ◄─ transport
//! ```
//!
//! Callbacks always run on a separate delivery task, in the order their
//! responses were ingested, so a callback may call back into the correlator
//! without observing a half-finished ingestion.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use wire::{Message, MessageKind};

use crate::config::CorrelatorConfig;
use crate::delivery::{Delivery, DeliveryQueue};
use crate::duplex::CorrelatorStream;
use crate::error::{DispatchError, Error, StrayResponseError};
use crate::ids::{CorrelationId, IdGenerator};
use crate::pending::{PendingCall, PendingCalls};

/// Invoked exactly once with the outcome of a call.
pub type Callback = Box<dyn FnOnce(Result<Message, Error>) + Send + 'static>;

/// Observer for responses that match no pending call.
pub type StrayHandler = Arc<dyn Fn(&StrayResponseError) + Send + Sync + 'static>;

/// Configures and builds a [`RequestCorrelator`].
pub struct CorrelatorBuilder {
    config: CorrelatorConfig,
    ids: Option<Arc<dyn IdGenerator>>,
    on_stray: Option<StrayHandler>,
}

impl CorrelatorBuilder {
    fn new() -> Self {
        Self {
            config: CorrelatorConfig::default(),
            ids: None,
            on_stray: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: CorrelatorConfig) -> Self {
        self.config = config;
        self
    }

    /// The configuration the correlator will be built with.
    pub fn config_ref(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Use a specific id generator instead of the one named by the
    /// configuration's `id-scheme`.
    pub fn id_generator(mut self, ids: impl IdGenerator) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Called for every stray response, after it has been logged.
    pub fn on_stray(mut self, handler: impl Fn(&StrayResponseError) + Send + Sync + 'static) -> Self {
        self.on_stray = Some(Arc::new(handler));
        self
    }

    /// Build the correlator and the duplex the transport talks to.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, as it spawns the task that
    /// runs callbacks. Once built, the correlator can be used from any thread.
    pub fn build(self) -> (RequestCorrelator, CorrelatorStream) {
        let runtime = Handle::current();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let ids = self
            .ids
            .unwrap_or_else(|| self.config.id_scheme.generator());

        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                pending: PendingCalls::new(self.config.max_pending),
                outgoing: Some(outgoing_tx),
                notifications: None,
            }),
            ids,
            deliveries: DeliveryQueue::spawn(&runtime),
            runtime,
            on_stray: self.on_stray,
            request_timeout: self.config.request_timeout(),
        });

        let stream = CorrelatorStream::new(Arc::downgrade(&inner), outgoing_rx);
        (RequestCorrelator { inner }, stream)
    }
}

/// Correlates requests pushed onto a message stream with the responses that
/// come back on it.
///
/// Cloning gives another handle to the same correlator. When the last handle
/// is dropped every pending call resolves with [`Error::Cancelled`].
#[derive(Clone)]
pub struct RequestCorrelator {
    inner: Arc<Inner>,
}

impl fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("pending", &self.pending_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RequestCorrelator {
    /// Start from the default configuration.
    pub fn builder() -> CorrelatorBuilder {
        CorrelatorBuilder::new()
    }

    /// See [`CorrelatorBuilder::build`].
    pub fn new(config: CorrelatorConfig) -> (Self, CorrelatorStream) {
        Self::builder().config(config).build()
    }

    /// Send `request` and resolve `callback` with its response.
    ///
    /// The request's `id` is replaced on the wire by the returned correlation
    /// id; the response handed to `callback` carries the original `id` again,
    /// including when it was `null` or absent. The callback is never invoked
    /// from within this call.
    ///
    /// On error nothing is sent and `callback` is dropped without being
    /// invoked.
    pub fn send_async<F>(&self, request: Message, callback: F) -> Result<CorrelationId, Error>
    where
        F: FnOnce(Result<Message, Error>) + Send + 'static,
    {
        self.inner.send_async(request, Box::new(callback))
    }

    /// Synchronous sends cannot be expressed over a stream transport, which
    /// has no way to produce a result before the next turn of the runtime.
    ///
    /// This always fails with [`Error::UnsupportedOperation`] and has no side
    /// effects. It exists so that callers porting code from a synchronous
    /// provider get a clear error rather than a missing method.
    pub fn send(&self, _request: &Message) -> Result<Message, Error> {
        Err(Error::UnsupportedOperation)
    }

    /// Send `request` and wait for its response.
    ///
    /// Dropping the returned future cancels the pending call.
    pub async fn call(&self, request: Message) -> Result<Message, Error> {
        let (tx, rx) = oneshot::channel();
        let id = self.send_async(request, move |outcome| {
            let _ = tx.send(outcome);
        })?;

        let mut guard = CancelOnDrop {
            inner: Arc::downgrade(&self.inner),
            id: Some(id),
        };
        let outcome = rx.await.unwrap_or(Err(Error::Cancelled));
        guard.id = None;
        outcome
    }

    /// Call `method` and return its result, or the remote error as
    /// [`Error::Remote`].
    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<Value, Error> {
        // no caller id of its own; the correlation id alone identifies it
        let response = self.call(Message::notification(method, params)).await?;
        Ok(response.into_result()?)
    }

    /// Feed a message received from the transport.
    ///
    /// Responses resolve their pending call; notifications go to the
    /// [`notifications`](Self::notifications) subscriber. This never fails:
    /// unmatched responses are reported through the stray handler.
    pub fn ingest(&self, message: Message) {
        self.inner.ingest(message);
    }

    /// Subscribe to notifications pushed by the remote side.
    ///
    /// Only one subscriber exists at a time; subscribing again replaces it.
    pub fn notifications(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock();
        if state.outgoing.is_some() {
            state.notifications = Some(tx);
        }
        rx
    }

    /// Resolve a pending call with [`Error::Cancelled`].
    ///
    /// Returns false when no call with this id is pending.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        self.inner.cancel(id)
    }

    /// Stop accepting requests and cancel every pending call.
    ///
    /// The outgoing side of the [`CorrelatorStream`] ends once it has yielded
    /// what was already queued.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Number of calls still waiting for a response.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// True after [`shutdown`](Self::shutdown).
    pub fn is_closed(&self) -> bool {
        self.inner.lock().outgoing.is_none()
    }
}

struct CancelOnDrop {
    inner: Weak<Inner>,
    id: Option<CorrelationId>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let (Some(id), Some(inner)) = (self.id.take(), self.inner.upgrade()) {
            inner.cancel(&id);
        }
    }
}

struct State {
    pending: PendingCalls,
    /// `None` once shut down.
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    notifications: Option<mpsc::UnboundedSender<Message>>,
}

pub(crate) struct Inner {
    state: Mutex<State>,
    ids: Arc<dyn IdGenerator>,
    deliveries: DeliveryQueue,
    /// Runtime the correlator was built on; timers are spawned here.
    runtime: Handle,
    on_stray: Option<StrayHandler>,
    request_timeout: Option<Duration>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_async(
        self: &Arc<Self>,
        mut request: Message,
        callback: Callback,
    ) -> Result<CorrelationId, Error> {
        let id = self.ids.next_id().ok_or(DispatchError::IdsExhausted)?;

        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(outgoing) = &state.outgoing else {
            return Err(DispatchError::Closed.into());
        };

        let original_id = request.id.replace(id.to_value());
        tracing::debug!(
            correlation_id = %id,
            method = request.method.as_deref().unwrap_or_default(),
            "sending request"
        );

        state
            .pending
            .register(id.clone(), PendingCall::new(original_id, callback))?;

        // armed before the request is queued
        if let Some(timeout) = self.request_timeout {
            let timer = self.arm_timer(id.clone(), timeout);
            if let Some(call) = state.pending.get_mut(&id) {
                call.timer = Some(timer);
            }
        }

        if outgoing.send(request).is_err() {
            if let Some(mut call) = state.pending.take(&id) {
                call.disarm();
            }
            return Err(DispatchError::Closed.into());
        }

        Ok(id)
    }

    /// Spawned on the runtime captured at build time, so `send_async` works
    /// from threads outside it.
    fn arm_timer(self: &Arc<Self>, id: CorrelationId, timeout: Duration) -> AbortHandle {
        let inner = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(id, timeout);
            }
        })
        .abort_handle()
    }

    fn expire(&self, id: CorrelationId, after: Duration) {
        let call = self.lock().pending.take(&id);
        if let Some(call) = call {
            tracing::warn!(correlation_id = %id, ?after, "request timed out");
            self.deliveries
                .push(Delivery::new(id, call.callback, Err(Error::TimedOut(after))));
        }
    }

    pub(crate) fn ingest(&self, message: Message) {
        match message.kind() {
            MessageKind::Notification => self.forward_notification(message),
            MessageKind::Request => {
                tracing::warn!(
                    method = message.method.as_deref().unwrap_or_default(),
                    "ignoring request from remote side"
                );
            }
            MessageKind::Response | MessageKind::Invalid => self.resolve(message),
        }
    }

    fn resolve(&self, mut response: Message) {
        let id = response.id.as_ref().and_then(CorrelationId::from_value);
        let call = id.as_ref().and_then(|id| self.lock().pending.take(id));

        let (Some(id), Some(mut call)) = (id, call) else {
            self.report_stray(response);
            return;
        };

        call.disarm();
        tracing::debug!(correlation_id = %id, "resolving pending call");
        response.id = call.original_id;
        self.deliveries
            .push(Delivery::new(id, call.callback, Ok(response)));
    }

    fn report_stray(&self, response: Message) {
        let error = StrayResponseError { response };
        tracing::warn!(%error, "stray response");
        if let Some(handler) = &self.on_stray {
            if catch_unwind(AssertUnwindSafe(|| handler(&error))).is_err() {
                tracing::error!("stray response handler panicked");
            }
        }
    }

    fn forward_notification(&self, notification: Message) {
        let subscriber = self.lock().notifications.clone();
        let delivered = match subscriber {
            Some(tx) => tx.send(notification).is_ok(),
            None => false,
        };
        if !delivered {
            tracing::debug!("no notification subscriber; dropping notification");
        }
    }

    fn cancel(&self, id: &CorrelationId) -> bool {
        let call = self.lock().pending.take(id);
        match call {
            Some(mut call) => {
                call.disarm();
                tracing::debug!(correlation_id = %id, "cancelling pending call");
                self.deliveries
                    .push(Delivery::new(id.clone(), call.callback, Err(Error::Cancelled)));
                true
            }
            None => false,
        }
    }

    fn shutdown(&self) {
        let abandoned: Vec<_> = {
            let mut state = self.lock();
            state.outgoing = None;
            state.notifications = None;
            state.pending.drain().collect()
        };

        if !abandoned.is_empty() {
            tracing::debug!(count = abandoned.len(), "cancelling pending calls on shutdown");
        }
        self.cancel_all(abandoned);
    }

    fn cancel_all(&self, calls: Vec<(CorrelationId, PendingCall)>) {
        for (id, mut call) in calls {
            call.disarm();
            self.deliveries
                .push(Delivery::new(id, call.callback, Err(Error::Cancelled)));
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let abandoned: Vec<_> = state.pending.drain().collect();
        if !abandoned.is_empty() {
            tracing::debug!(count = abandoned.len(), "correlator dropped with pending calls");
        }
        self.cancel_all(abandoned);
    }
}
