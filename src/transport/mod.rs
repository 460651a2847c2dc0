//! Native transport seam.
//!
//! The host's cross-context primitive is opaque to the bridge: it takes an
//! envelope, and completes once with either a raw reply (possibly nothing) or
//! a delivery-level failure. [`NativeTransport`] is that contract.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::envelope::Envelope;

pub mod local;

pub use local::{LocalTransport, PortHandler};

/// Option set passed with every native send. The relay protocol itself needs
/// no context-binding options, so the bridge always sends the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendOptions {
    #[serde(rename = "includeTlsChannelId", skip_serializing_if = "Option::is_none")]
    pub include_tls_channel_id: Option<bool>,
}

/// Delivery-level failure reported by the transport itself, as opposed to an
/// error string produced by the callee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DeliveryFailure {
    pub message: String,
}

impl DeliveryFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The host's native messaging primitive.
///
/// Implementations complete exactly once per `send`.
#[async_trait]
pub trait NativeTransport: Send + Sync + fmt::Debug {
    async fn send(
        &self,
        envelope: Envelope,
        options: &SendOptions,
    ) -> std::result::Result<Option<Value>, DeliveryFailure>;
}
