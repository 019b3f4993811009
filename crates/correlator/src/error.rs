//! Error types surfaced by the correlator.

use std::time::Duration;

use serde_json::Value;
use wire::{Message, RemoteError};

use crate::ids::CorrelationId;

/// Errors returned from correlator operations or delivered to callbacks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned by [`RequestCorrelator::send`](crate::RequestCorrelator::send),
    /// always.
    #[error("synchronous send is not supported by a stream transport; use send_async")]
    UnsupportedOperation,

    /// The request could not be registered and was not sent.
    #[error("request not dispatched: {0}")]
    Dispatch(#[from] DispatchError),

    /// The pending call was abandoned before a response arrived.
    #[error("request cancelled before a response arrived")]
    Cancelled,

    #[error("no response after {0:?}")]
    TimedOut(Duration),

    /// The remote side answered with an error object.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Why a pending call slot could not be created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("correlation ids exhausted")]
    IdsExhausted,

    #[error("too many pending calls (limit {limit})")]
    TooManyPending { limit: usize },

    #[error("correlation id {0} is already pending")]
    DuplicateId(CorrelationId),

    #[error("correlator is shut down")]
    Closed,
}

/// A response arrived whose id matches no pending call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("response with id {} matches no pending call", display_id(.response.id.as_ref()))]
pub struct StrayResponseError {
    pub response: Message,
}

impl StrayResponseError {
    /// The unmatched `id`, if the response had one.
    pub fn id(&self) -> Option<&Value> {
        self.response.id.as_ref()
    }
}

fn display_id(id: Option<&Value>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "<absent>".to_string(),
    }
}
