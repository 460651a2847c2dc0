//! Relay listener.
//!
//! Runs in a context that owns the native transport. It keeps one standing
//! subscription on the event channel, executes every `proxy-message` it sees
//! through its own [`DirectCaller`] and publishes the outcome back as a
//! `proxy-message-result` under the same correlation id.
//!
//! The raw transport result is forwarded untouched (an absent result stays
//! absent) so a proxied caller settles exactly as a direct caller would.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::caller::DirectCaller;
use crate::channel::{EventChannel, Subscription};
use crate::envelope::{CallResult, ChannelEvent, Envelope, ProxyEnvelope, ProxyResult};
use crate::types::{ChannelConfig, CorrelationId, Error, Result};

/// Counters for a relay's lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Calls executed and answered.
    pub relayed: u64,
    /// `proxy-message` events dropped for breaking the protocol.
    pub protocol_violations: u64,
}

/// State shared between the listener handle, its loop and in-flight calls.
#[derive(Debug)]
struct RelayCore {
    channel: Arc<EventChannel>,
    direct: DirectCaller,
    stats: RwLock<RelayStats>,
}

impl RelayCore {
    /// Route one channel event. Anything that is not a proxied request is
    /// ignored; requests are executed on their own task.
    async fn handle_event(self: &Arc<Self>, event: Value) {
        let Some(ChannelEvent::ProxyMessage(proxy)) = ChannelEvent::decode(&event) else {
            return;
        };

        let Some(id) = proxy.correlation_id() else {
            self.reject(&proxy).await;
            return;
        };

        let core = self.clone();
        tokio::spawn(async move {
            core.relay(id, proxy.into_envelope()).await;
        });
    }

    async fn reject(&self, proxy: &ProxyEnvelope) {
        let reason = match &proxy.index {
            None => "Empty index",
            Some(Value::String(index)) if index.is_empty() => "Empty index",
            Some(_) => "Index is not a string",
        };
        let err = Error::protocol_violation(reason);
        tracing::error!(
            code = err.code(),
            port = %proxy.port,
            msg_type = %proxy.msg_type,
            "Dropping proxied call: {}",
            err
        );
        self.stats.write().await.protocol_violations += 1;
    }

    async fn relay(&self, id: CorrelationId, envelope: Envelope) {
        tracing::debug!(
            correlation_id = %id,
            port = %envelope.port,
            msg_type = %envelope.msg_type,
            "Relaying proxied call"
        );

        let result = match self.direct.send_raw(envelope).await {
            Ok(result) => result,
            Err(e) => Some(CallResult::err(e.to_result_message())),
        };

        let answer = ChannelEvent::ProxyMessageResult(ProxyResult::new(&id, result));
        if let Err(e) = self.channel.publish_event(&answer).await {
            tracing::warn!(correlation_id = %id, "Failed to publish relay result: {}", e);
            return;
        }

        self.stats.write().await.relayed += 1;
    }
}

#[derive(Debug)]
struct Running {
    cancel: CancellationToken,
    subscription: Subscription,
    task: JoinHandle<()>,
}

/// Standing relay between the event channel and a native transport.
#[derive(Debug)]
pub struct RelayListener {
    core: Arc<RelayCore>,
    channel_config: ChannelConfig,
    running: Mutex<Option<Running>>,
}

impl RelayListener {
    pub fn new(channel: Arc<EventChannel>, direct: DirectCaller, channel_config: &ChannelConfig) -> Self {
        Self {
            core: Arc::new(RelayCore {
                channel,
                direct,
                stats: RwLock::new(RelayStats::default()),
            }),
            channel_config: channel_config.clone(),
            running: Mutex::new(None),
        }
    }

    /// Subscribe and start serving. Calling it again while running is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let (subscription, rx) = self
            .core
            .channel
            .subscribe(self.channel_config.subscriber_id("relay"))
            .await?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(self.core.clone(), rx, cancel.clone()));

        tracing::info!("Relay listener {} started", subscription.id);

        *running = Some(Running {
            cancel,
            subscription,
            task,
        });
        Ok(())
    }

    /// Stop serving and drop the subscription. Calls already being relayed
    /// still publish their results.
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        if let Err(e) = running.task.await {
            tracing::warn!("Relay loop ended abnormally: {}", e);
        }
        self.core.channel.unsubscribe(&running.subscription).await?;

        tracing::info!("Relay listener {} stopped", running.subscription.id);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn stats(&self) -> RelayStats {
        self.core.stats.read().await.clone()
    }
}

impl Drop for RelayListener {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().as_ref() {
            running.cancel.cancel();
        }
    }
}

async fn serve(core: Arc<RelayCore>, mut rx: mpsc::UnboundedReceiver<Value>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => core.handle_event(event).await,
                None => break,
            },
        }
    }
}
