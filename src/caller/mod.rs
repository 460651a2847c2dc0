//! The two ways a call leaves a context.
//!
//! - [`DirectCaller`]: the context owns a usable native transport
//! - [`ProxyCaller`]: it does not, so the call is relayed over the event
//!   channel to a context that does

pub mod direct;
pub mod proxy;

pub use direct::DirectCaller;
pub use proxy::{CorrelationIdSource, ProxyCaller, RandomIds};
