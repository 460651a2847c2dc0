//! Core types shared by every component.
//!
//! - **IDs**: Strongly-typed identifiers (CorrelationId, SubscriberId)
//! - **Errors**: Error taxonomy for cross-context calls
//! - **Config**: Caller, channel and observability configuration

mod config;
mod errors;
mod ids;

pub use config::{ChannelConfig, ClientConfig, Config, ObservabilityConfig};
pub use errors::{Error, Result};
pub use ids::{CorrelationId, SubscriberId, CORRELATION_ID_BYTES};
