//! Tracking calls that are waiting for a response
//!
//! Each request sent through the correlator is registered here under its
//! correlation id together with the id the caller originally chose and the
//! callback to resolve. When a response carrying that correlation id arrives
//! the entry is taken out, exactly once.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde_json::Value;
use tokio::task::AbortHandle;

use crate::correlator::Callback;
use crate::error::DispatchError;
use crate::ids::CorrelationId;

/// One in-flight request.
pub(crate) struct PendingCall {
    /// Caller-supplied id, restored onto the response verbatim.
    pub(crate) original_id: Option<Value>,
    pub(crate) callback: Callback,
    /// Timeout task, aborted when the call resolves some other way.
    pub(crate) timer: Option<AbortHandle>,
}

impl PendingCall {
    pub(crate) fn new(original_id: Option<Value>, callback: Callback) -> Self {
        Self {
            original_id,
            callback,
            timer: None,
        }
    }

    pub(crate) fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

pub(crate) struct PendingCalls {
    calls: HashMap<CorrelationId, PendingCall>,
    capacity: usize,
}

impl PendingCalls {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            calls: HashMap::new(),
            capacity,
        }
    }

    /// Register a call. Never replaces an existing entry.
    pub(crate) fn register(
        &mut self,
        id: CorrelationId,
        call: PendingCall,
    ) -> Result<(), DispatchError> {
        if self.calls.len() >= self.capacity {
            return Err(DispatchError::TooManyPending {
                limit: self.capacity,
            });
        }

        match self.calls.entry(id) {
            Entry::Occupied(entry) => Err(DispatchError::DuplicateId(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(call);
                Ok(())
            }
        }
    }

    pub(crate) fn take(&mut self, id: &CorrelationId) -> Option<PendingCall> {
        self.calls.remove(id)
    }

    pub(crate) fn get_mut(&mut self, id: &CorrelationId) -> Option<&mut PendingCall> {
        self.calls.get_mut(id)
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (CorrelationId, PendingCall)> + '_ {
        self.calls.drain()
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }
}
