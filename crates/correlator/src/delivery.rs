//! Deferred callback invocation.
//!
//! Callbacks are never run on the path that resolved them. They are queued
//! here and invoked, in queue order, by a single delivery task.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use wire::Message;

use crate::correlator::Callback;
use crate::error::Error;
use crate::ids::CorrelationId;

pub(crate) struct Delivery {
    correlation_id: CorrelationId,
    callback: Callback,
    outcome: Result<Message, Error>,
}

impl Delivery {
    pub(crate) fn new(
        correlation_id: CorrelationId,
        callback: Callback,
        outcome: Result<Message, Error>,
    ) -> Self {
        Self {
            correlation_id,
            callback,
            outcome,
        }
    }

    fn run(self) {
        let Delivery {
            correlation_id,
            callback,
            outcome,
        } = self;

        if catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
            tracing::error!(%correlation_id, "response callback panicked");
        }
    }
}

#[derive(Clone)]
pub(crate) struct DeliveryQueue {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl DeliveryQueue {
    /// Spawn the delivery task on `runtime`.
    ///
    /// The task exits once every queue handle is dropped and the backlog
    /// has been delivered.
    pub(crate) fn spawn(runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();

        runtime.spawn(async move {
            while let Some(delivery) = rx.recv().await {
                delivery.run();
            }
            tracing::trace!("delivery queue drained");
        });

        Self { tx }
    }

    pub(crate) fn push(&self, delivery: Delivery) {
        if let Err(mpsc::error::SendError(delivery)) = self.tx.send(delivery) {
            tracing::warn!(
                correlation_id = %delivery.correlation_id,
                "delivery task is gone; dropping callback"
            );
        }
    }
}
