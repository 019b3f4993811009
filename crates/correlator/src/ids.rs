//! Correlation id generation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

/// Token substituted for a request's id while it is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationId {
    Number(u64),
    Text(String),
}

impl CorrelationId {
    /// The JSON form written into the request's `id` field.
    pub fn to_value(&self) -> Value {
        match self {
            CorrelationId::Number(n) => Value::from(*n),
            CorrelationId::Text(s) => Value::from(s.as_str()),
        }
    }

    /// Recover a correlation id from a response's `id` field.
    ///
    /// Only non-negative integers and strings can be correlation ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(CorrelationId::Number),
            Value::String(s) => Some(CorrelationId::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationId::Number(n) => write!(f, "{n}"),
            CorrelationId::Text(s) => f.write_str(s),
        }
    }
}

/// Source of correlation ids.
///
/// Implementations must never hand out the same id twice while it could
/// still be pending. Returning `None` means the generator is exhausted.
pub trait IdGenerator: Send + Sync + 'static {
    fn next_id(&self) -> Option<CorrelationId>;
}

/// Monotonic counter starting at 1. Never wraps.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Counter starting at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Counter whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> Option<CorrelationId> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .ok()
            .map(CorrelationId::Number)
    }
}

/// Random v4 UUIDs rendered as strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> Option<CorrelationId> {
        Some(CorrelationId::Text(uuid::Uuid::new_v4().to_string()))
    }
}
