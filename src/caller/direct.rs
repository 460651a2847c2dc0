//! Direct caller: one envelope, one native send, one result.

use serde_json::Value;
use std::sync::Arc;

use crate::envelope::{CallResult, Envelope};
use crate::message::{decode_response, Message};
use crate::probe::{EnvironmentProbe, TransportAvailability};
use crate::transport::{NativeTransport, SendOptions};
use crate::types::{Error, Result};

/// Reported when the context has no native messaging primitive.
pub const UNSUPPORTED: &str = "This environment doesn't support the messaging system for extension";

/// Reported when the primitive exists but the context has no process identity.
pub const NO_IDENTITY: &str = "Context has no process identity; native calls must be proxied";

/// Reported in place of a delivery failure that came without a message.
pub const DELIVERY_FAILED: &str = "Native transport reported a failure without a message";

/// Sends envelopes through the native transport.
///
/// Construction is the capability check: a `DirectCaller` only exists in a
/// context the probe reports as privileged.
#[derive(Debug, Clone)]
pub struct DirectCaller {
    transport: Arc<dyn NativeTransport>,
    options: SendOptions,
}

impl DirectCaller {
    pub fn new(probe: &dyn EnvironmentProbe, transport: Arc<dyn NativeTransport>) -> Result<Self> {
        match probe.probe() {
            TransportAvailability::Unavailable => Err(Error::transport_unavailable(UNSUPPORTED)),
            TransportAvailability::NativeRestricted => {
                Err(Error::transport_unavailable(NO_IDENTITY))
            }
            TransportAvailability::NativePrivileged => Ok(Self {
                transport,
                options: SendOptions::default(),
            }),
        }
    }

    /// Send once and return the raw result, interpreting only delivery
    /// failures. `None` means the callee produced nothing.
    pub async fn send_raw(&self, envelope: Envelope) -> Result<Option<CallResult>> {
        tracing::debug!(
            port = %envelope.port,
            msg_type = %envelope.msg_type,
            "Sending envelope over native transport"
        );

        match self.transport.send(envelope, &self.options).await {
            Ok(reply) => Ok(CallResult::from_reply(reply)),
            Err(failure) => {
                tracing::debug!("Native delivery failed: {}", failure);
                // An empty message would read as "no error" once relayed.
                if failure.message.is_empty() {
                    return Err(Error::delivery(DELIVERY_FAILED));
                }
                Err(Error::delivery(failure.message))
            }
        }
    }

    /// Send once and settle: the `return` value, or the callee's error, or
    /// `EmptyResult`.
    pub async fn send(&self, envelope: Envelope) -> Result<Value> {
        CallResult::settle(self.send_raw(envelope).await?)
    }

    /// Validate, send and decode a typed message.
    pub async fn call<M: Message>(&self, port: &str, msg: &M) -> Result<M::Response> {
        let envelope = Envelope::from_message(port, msg)?;
        decode_response(self.send(envelope).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RawMessage;
    use crate::transport::DeliveryFailure;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a canned outcome and counts sends.
    #[derive(Debug)]
    struct CannedTransport {
        reply: std::result::Result<Option<Value>, DeliveryFailure>,
        sends: AtomicUsize,
    }

    impl CannedTransport {
        fn new(reply: std::result::Result<Option<Value>, DeliveryFailure>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                sends: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NativeTransport for CannedTransport {
        async fn send(
            &self,
            _envelope: Envelope,
            _options: &SendOptions,
        ) -> std::result::Result<Option<Value>, DeliveryFailure> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn privileged(transport: Arc<CannedTransport>) -> DirectCaller {
        DirectCaller::new(&TransportAvailability::NativePrivileged, transport).unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_value() {
        let transport = CannedTransport::new(Ok(Some(json!({"return": 42}))));
        let caller = privileged(transport.clone());

        let msg = RawMessage::new("get", json!({"key": "answer"}));
        let value = caller.call("kv", &msg).await.unwrap();

        assert_eq!(value, json!(42));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_surfaces_message() {
        let transport = CannedTransport::new(Err(DeliveryFailure::new("disconnected")));
        let caller = privileged(transport.clone());

        let err = caller
            .call("kv", &RawMessage::new("get", Value::Null))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TransportDelivery(_)));
        assert_eq!(err.to_string(), "disconnected");
        // No retry.
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_delivery_failure_gets_message() {
        let caller = privileged(CannedTransport::new(Err(DeliveryFailure::new(""))));
        let envelope = Envelope::relayed("kv".into(), "get".into(), Value::Null);

        let err = caller.send_raw(envelope).await.unwrap_err();

        assert!(matches!(err, Error::TransportDelivery(ref m) if m == DELIVERY_FAILED));
        assert_eq!(err.to_result_message(), DELIVERY_FAILED);
    }

    #[tokio::test]
    async fn test_empty_results() {
        for reply in [None, Some(Value::Null), Some(json!({}))] {
            let caller = privileged(CannedTransport::new(Ok(reply)));
            let err = caller
                .call("kv", &RawMessage::new("get", Value::Null))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::EmptyResult));
        }
    }

    #[tokio::test]
    async fn test_application_error() {
        let caller = privileged(CannedTransport::new(Ok(Some(json!({"error": "locked"})))));

        let err = caller
            .call("kv", &RawMessage::new("get", Value::Null))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Application(ref e) if e == "locked"));
    }

    #[tokio::test]
    async fn test_send_raw_keeps_absent_result() {
        let caller = privileged(CannedTransport::new(Ok(None)));
        let envelope = Envelope::relayed("kv".into(), "get".into(), Value::Null);

        assert_eq!(caller.send_raw(envelope).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_message_never_sent() {
        let transport = CannedTransport::new(Ok(Some(json!({"return": 1}))));
        let caller = privileged(transport.clone());

        let err = caller
            .call("kv", &RawMessage::new("", Value::Null))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_construction_requires_privilege() {
        let transport = CannedTransport::new(Ok(None));

        let err = DirectCaller::new(&TransportAvailability::Unavailable, transport.clone())
            .unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable(_)));
        assert!(err.to_string().contains("doesn't support the messaging system"));

        let err = DirectCaller::new(&TransportAvailability::NativeRestricted, transport)
            .unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable(_)));
    }
}
