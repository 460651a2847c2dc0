//! In-process native transport.
//!
//! Stands in for the privileged side of the host: handlers are registered per
//! logical port and every envelope sent to a port is answered by its handler
//! with a `CallResult`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{DeliveryFailure, NativeTransport, SendOptions};
use crate::envelope::{CallResult, Envelope};
use crate::types::{Error, Result};

/// Message the host reports when nothing listens on a port.
pub const NO_RECEIVER: &str = "Could not establish connection. Receiving end does not exist.";

/// Handler for one logical port.
///
/// `Err(text)` becomes the `error` field of the reply.
#[async_trait]
pub trait PortHandler: Send + Sync {
    async fn handle(&self, msg_type: &str, msg: Value) -> std::result::Result<Value, String>;
}

#[async_trait]
impl<F> PortHandler for F
where
    F: Fn(&str, Value) -> std::result::Result<Value, String> + Send + Sync,
{
    async fn handle(&self, msg_type: &str, msg: Value) -> std::result::Result<Value, String> {
        self(msg_type, msg)
    }
}

/// Port-routed transport living in the privileged context.
#[derive(Clone, Default)]
pub struct LocalTransport {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn PortHandler>>>>,
}

impl fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport").finish_non_exhaustive()
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `port`. One handler per port.
    pub async fn register(&self, port: &str, handler: Arc<dyn PortHandler>) -> Result<()> {
        let mut handlers = self.handlers.write().await;

        if handlers.contains_key(port) {
            return Err(Error::already_registered(format!("port {}", port)));
        }
        handlers.insert(port.to_string(), handler);

        tracing::debug!("Registered port handler: {}", port);

        Ok(())
    }

    /// Remove the handler for `port`, if any.
    pub async fn unregister(&self, port: &str) {
        self.handlers.write().await.remove(port);
        tracing::debug!("Unregistered port handler: {}", port);
    }

    /// Registered port names, sorted.
    pub async fn ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        ports.sort();
        ports
    }
}

#[async_trait]
impl NativeTransport for LocalTransport {
    async fn send(
        &self,
        envelope: Envelope,
        _options: &SendOptions,
    ) -> std::result::Result<Option<Value>, DeliveryFailure> {
        // Handler runs without the registry lock held.
        let handler = self
            .handlers
            .read()
            .await
            .get(&envelope.port)
            .cloned()
            .ok_or_else(|| DeliveryFailure::new(NO_RECEIVER))?;

        let result = match handler.handle(&envelope.msg_type, envelope.msg).await {
            Ok(value) => CallResult::ok(value),
            Err(error) => CallResult::err(error),
        };

        serde_json::to_value(result)
            .map(Some)
            .map_err(|e| DeliveryFailure::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_type(msg_type: &str, _msg: Value) -> std::result::Result<Value, String> {
        Ok(json!(msg_type))
    }

    #[tokio::test]
    async fn test_routes_by_port() {
        let transport = LocalTransport::new();
        transport.register("kv", Arc::new(echo_type)).await.unwrap();

        let envelope = Envelope::relayed("kv".into(), "get".into(), Value::Null);
        let reply = transport.send(envelope, &SendOptions::default()).await.unwrap();

        assert_eq!(reply, Some(json!({"return": "get"})));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_error_field() {
        let transport = LocalTransport::new();
        transport
            .register(
                "kv",
                Arc::new(|_: &str, _: Value| -> std::result::Result<Value, String> {
                    Err("no such key".to_string())
                }),
            )
            .await
            .unwrap();

        let envelope = Envelope::relayed("kv".into(), "get".into(), Value::Null);
        let reply = transport.send(envelope, &SendOptions::default()).await.unwrap();

        assert_eq!(reply, Some(json!({"error": "no such key"})));
    }

    #[tokio::test]
    async fn test_unknown_port_is_delivery_failure() {
        let transport = LocalTransport::new();

        let envelope = Envelope::relayed("nowhere".into(), "get".into(), Value::Null);
        let err = transport
            .send(envelope, &SendOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.message, NO_RECEIVER);
    }

    #[tokio::test]
    async fn test_duplicate_port() {
        let transport = LocalTransport::new();
        transport.register("kv", Arc::new(echo_type)).await.unwrap();

        let result = transport.register("kv", Arc::new(echo_type)).await;
        assert!(matches!(result, Err(Error::AlreadyRegistered(_))));

        transport.unregister("kv").await;
        assert!(transport.ports().await.is_empty());
    }

    #[test]
    fn test_ports_sorted() {
        tokio_test::block_on(async {
            let transport = LocalTransport::new();
            transport.register("kv", Arc::new(echo_type)).await.unwrap();
            transport.register("echo", Arc::new(echo_type)).await.unwrap();

            assert_eq!(transport.ports().await, vec!["echo", "kv"]);
        });
    }
}
