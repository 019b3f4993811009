//! Request/response correlation for JSON-RPC over ordered message streams.
//!
//! A stream transport (a pipe, a port, a socket) can push messages and
//! deliver messages, but cannot tell which response answers which request.
//! [`RequestCorrelator`] adds that: outgoing requests are tagged with a
//! unique [`CorrelationId`], and each response is routed back to the
//! callback registered for it with the caller's original id restored.
//!
//! - [`RequestCorrelator`] and its [`CorrelatorStream`] are transport-agnostic
//! - [`Channel`] binds a correlator to a [`wire`] transport with reader and
//!   writer tasks
//! - [`CorrelatorConfig`] holds timeout, capacity, id and framing settings
//!
//! ```ignore
//! let channel = Channel::connect("127.0.0.1:7000", CorrelatorConfig::default()).await?;
//! let chain_id = channel.request("eth_chainId", None).await?;
//! ```

mod channel;
mod config;
mod correlator;
mod delivery;
mod duplex;
mod error;
mod ids;
mod pending;

pub mod testing;

pub use channel::Channel;
pub use config::{ConfigError, CorrelatorConfig, DEFAULT_MAX_PENDING, IdScheme};
pub use correlator::{Callback, CorrelatorBuilder, RequestCorrelator, StrayHandler};
pub use duplex::CorrelatorStream;
pub use error::{DispatchError, Error, StrayResponseError};
pub use ids::{CorrelationId, IdGenerator, RandomIds, SequentialIds};
