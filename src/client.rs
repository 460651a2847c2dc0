//! Messenger: the caller-facing entry point.
//!
//! Callers hand over a port and a [`Message`] and get back the decoded
//! response. Envelopes, probing and correlation ids stay inside.
//!
//! Routing per call:
//!
//! | probe              | `Route::Auto`          | `Route::Direct`  | `Route::Proxy` |
//! |--------------------|------------------------|------------------|----------------|
//! | `NativePrivileged` | direct                 | direct           | proxy          |
//! | `NativeRestricted` | proxy                  | unavailable      | proxy          |
//! | `Unavailable`      | unavailable (or proxy) | unavailable      | proxy          |
//!
//! `Unavailable` under `Route::Auto` only proxies when
//! `proxy_when_unavailable` is set.

use std::sync::Arc;
use std::time::Duration;

use crate::caller::direct::UNSUPPORTED;
use crate::caller::{CorrelationIdSource, DirectCaller, ProxyCaller, RandomIds};
use crate::channel::EventChannel;
use crate::envelope::Envelope;
use crate::message::{decode_response, Message};
use crate::probe::{EnvironmentProbe, TransportAvailability};
use crate::transport::NativeTransport;
use crate::types::{Config, Error, Result};

const NO_CHANNEL: &str = "no event channel to relay through";

/// Which path a call may take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Route {
    /// Decide from the probe.
    #[default]
    Auto,
    /// Native transport only; never publish on the channel.
    Direct,
    /// Always relay, even from a privileged context.
    Proxy,
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub route: Route,
    /// Deadline for a proxied call. `None` uses the configured deadline.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn route(route: Route) -> Self {
        Self {
            route,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Sends messages from one context.
#[derive(Debug)]
pub struct Messenger {
    probe: Arc<dyn EnvironmentProbe>,
    transport: Option<Arc<dyn NativeTransport>>,
    proxy: Option<ProxyCaller>,
    config: Config,
}

impl Messenger {
    pub fn builder(probe: Arc<dyn EnvironmentProbe>) -> MessengerBuilder {
        MessengerBuilder {
            probe,
            transport: None,
            channel: None,
            ids: Arc::new(RandomIds),
            config: Config::default(),
        }
    }

    /// Send `msg` to `port` and decode the response.
    pub async fn send_message<M: Message>(&self, port: &str, msg: &M) -> Result<M::Response> {
        self.send_message_with(port, msg, CallOptions::default()).await
    }

    pub async fn send_message_with<M: Message>(
        &self,
        port: &str,
        msg: &M,
        options: CallOptions,
    ) -> Result<M::Response> {
        // Validation happens here, once, before any path is chosen.
        let envelope = Envelope::from_message(port, msg)?;
        let availability = self.probe.probe();

        let value = match (options.route, availability) {
            (Route::Proxy, _) | (Route::Auto, TransportAvailability::NativeRestricted) => {
                self.proxied(envelope, options).await?
            }
            (Route::Auto, TransportAvailability::Unavailable)
                if self.config.client.proxy_when_unavailable =>
            {
                self.proxied(envelope, options).await?
            }
            (Route::Auto | Route::Direct, _) => self.direct(envelope, availability).await?,
        };

        decode_response(value)
    }

    async fn direct(
        &self,
        envelope: Envelope,
        availability: TransportAvailability,
    ) -> Result<serde_json::Value> {
        let transport = match &self.transport {
            Some(transport) => transport.clone(),
            None if !availability.has_native() => {
                return Err(Error::transport_unavailable(UNSUPPORTED))
            }
            None => {
                return Err(Error::transport_unavailable(
                    "no native transport attached to this context",
                ))
            }
        };
        DirectCaller::new(&availability, transport)?.send(envelope).await
    }

    async fn proxied(&self, envelope: Envelope, options: CallOptions) -> Result<serde_json::Value> {
        let proxy = self
            .proxy
            .as_ref()
            .ok_or_else(|| Error::transport_unavailable(NO_CHANNEL))?;

        let deadline = options.timeout.or(self.config.client.call_timeout);
        proxy.send_with_timeout(envelope, deadline).await
    }

    /// The proxy caller, if this context can relay.
    pub fn proxy(&self) -> Option<&ProxyCaller> {
        self.proxy.as_ref()
    }
}

/// Builder for [`Messenger`].
#[derive(Debug)]
pub struct MessengerBuilder {
    probe: Arc<dyn EnvironmentProbe>,
    transport: Option<Arc<dyn NativeTransport>>,
    channel: Option<Arc<EventChannel>>,
    ids: Arc<dyn CorrelationIdSource>,
    config: Config,
}

impl MessengerBuilder {
    /// Native transport reachable from this context.
    pub fn transport(mut self, transport: Arc<dyn NativeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Event channel to relay through.
    pub fn channel(mut self, channel: Arc<EventChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn correlation_ids(mut self, ids: Arc<dyn CorrelationIdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Finish. With a channel this spawns the proxy dispatcher, so it must run
    /// inside a Tokio runtime.
    pub async fn build(self) -> Result<Messenger> {
        let proxy = match self.channel {
            Some(channel) => {
                Some(ProxyCaller::spawn_with_ids(channel, &self.config, self.ids).await?)
            }
            None => None,
        };

        Ok(Messenger {
            probe: self.probe,
            transport: self.transport,
            proxy,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RawMessage;
    use crate::transport::LocalTransport;
    use serde_json::{json, Value};

    async fn kv_transport() -> Arc<LocalTransport> {
        let transport = Arc::new(LocalTransport::new());
        transport
            .register(
                "kv",
                Arc::new(|_: &str, _: Value| -> std::result::Result<Value, String> { Ok(json!(42)) }),
            )
            .await
            .unwrap();
        transport
    }

    #[tokio::test]
    async fn test_privileged_goes_direct() {
        let channel = Arc::new(EventChannel::new());
        let messenger = Messenger::builder(Arc::new(TransportAvailability::NativePrivileged))
            .transport(kv_transport().await)
            .channel(channel.clone())
            .build()
            .await
            .unwrap();

        let value = messenger
            .send_message("kv", &RawMessage::new("get", Value::Null))
            .await
            .unwrap();

        assert_eq!(value, json!(42));
        assert_eq!(channel.get_stats().await.events_published, 0);
    }

    #[tokio::test]
    async fn test_unavailable_without_channel() {
        let messenger = Messenger::builder(Arc::new(TransportAvailability::Unavailable))
            .build()
            .await
            .unwrap();

        let err = messenger
            .send_message("kv", &RawMessage::new("get", Value::Null))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TransportUnavailable(_)));
        assert!(err.to_string().contains(UNSUPPORTED));
    }

    #[tokio::test]
    async fn test_unavailable_fails_fast_by_default() {
        let channel = Arc::new(EventChannel::new());
        let messenger = Messenger::builder(Arc::new(TransportAvailability::Unavailable))
            .channel(channel.clone())
            .build()
            .await
            .unwrap();

        let err = messenger
            .send_message("kv", &RawMessage::new("get", Value::Null))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TransportUnavailable(_)));
        assert_eq!(channel.get_stats().await.events_published, 0);
    }

    #[tokio::test]
    async fn test_restricted_direct_route_refused() {
        let messenger = Messenger::builder(Arc::new(TransportAvailability::NativeRestricted))
            .transport(kv_transport().await)
            .build()
            .await
            .unwrap();

        let err = messenger
            .send_message_with(
                "kv",
                &RawMessage::new("get", Value::Null),
                CallOptions::route(Route::Direct),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TransportUnavailable(_)));
    }

    #[tokio::test]
    async fn test_restricted_without_channel() {
        let messenger = Messenger::builder(Arc::new(TransportAvailability::NativeRestricted))
            .build()
            .await
            .unwrap();

        let err = messenger
            .send_message("kv", &RawMessage::new("get", Value::Null))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TransportUnavailable(ref m) if m == NO_CHANNEL));
    }

    #[tokio::test]
    async fn test_per_call_timeout_override() {
        let channel = Arc::new(EventChannel::new());
        let mut config = Config::default();
        config.client.call_timeout = None;
        let messenger = Messenger::builder(Arc::new(TransportAvailability::NativeRestricted))
            .channel(channel)
            .config(config)
            .build()
            .await
            .unwrap();

        // No relay is listening; only the per-call deadline ends the wait.
        let err = messenger
            .send_message_with(
                "kv",
                &RawMessage::new("get", Value::Null),
                CallOptions::default().with_timeout(Duration::from_millis(30)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(messenger.proxy().unwrap().pending_count().await, 0);
    }
}
