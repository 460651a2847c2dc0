//! Proxy caller: relays calls over the shared event channel.
//!
//! Used from contexts that cannot touch the native transport. Each call mints
//! a correlation id, parks a completion in the caller's pending table and
//! publishes a `proxy-message`. One standing dispatcher per caller watches the
//! channel and settles the parked completion when the matching
//! `proxy-message-result` shows up.
//!
//! ```text
//!   send() ──register(id)──► PendingCalls ◄──take(id)── dispatcher ◄── channel
//!      │                                                                  ▲
//!      └────────────── publish proxy-message{index: id} ──────────────────┘
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::channel::{EventChannel, Subscription};
use crate::envelope::{CallResult, ChannelEvent, Envelope, ProxyEnvelope};
use crate::message::{decode_response, Message};
use crate::types::{Config, CorrelationId, Error, Result};

/// Attempts at drawing an id that is not already pending before giving up.
const MAX_MINT_ATTEMPTS: usize = 8;

/// Where correlation ids come from.
pub trait CorrelationIdSource: Send + Sync + fmt::Debug {
    fn next_id(&self) -> CorrelationId;
}

/// 8 random bytes, hex encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl CorrelationIdSource for RandomIds {
    fn next_id(&self) -> CorrelationId {
        CorrelationId::random()
    }
}

type Completion = oneshot::Sender<Option<CallResult>>;

#[derive(Debug, Default)]
struct PendingState {
    calls: HashMap<CorrelationId, Completion>,
    /// Set once the dispatcher has stopped; nothing may register after that.
    closed: bool,
}

/// Outstanding proxied calls, keyed by correlation id.
#[derive(Debug, Default)]
struct PendingCalls {
    state: Mutex<PendingState>,
}

impl PendingCalls {
    /// Park `completion` under a fresh id that is not currently pending.
    async fn register(
        &self,
        ids: &dyn CorrelationIdSource,
        completion: Completion,
    ) -> Result<CorrelationId> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::cancelled("proxy caller has shut down"));
        }
        for _ in 0..MAX_MINT_ATTEMPTS {
            let id = ids.next_id();
            if !state.calls.contains_key(&id) {
                state.calls.insert(id.clone(), completion);
                return Ok(id);
            }
            tracing::debug!("Correlation id {} already pending, drawing again", id);
        }
        Err(Error::protocol_violation(format!(
            "could not mint a free correlation id in {} attempts",
            MAX_MINT_ATTEMPTS
        )))
    }

    async fn take(&self, id: &CorrelationId) -> Option<Completion> {
        self.state.lock().await.calls.remove(id)
    }

    async fn contains(&self, id: &CorrelationId) -> bool {
        self.state.lock().await.calls.contains_key(id)
    }

    async fn len(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    /// Close the table and drop every completion; their callers see the call
    /// as cancelled, and later registrations fail.
    async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.calls.clear();
    }

    /// Route one channel event. Returns true if it settled a pending call.
    async fn dispatch(&self, event: &Value) -> bool {
        let Some(ChannelEvent::ProxyMessageResult(result)) = ChannelEvent::decode(event) else {
            return false;
        };
        let Ok(id) = CorrelationId::from_string(result.index) else {
            return false;
        };
        let Some(completion) = self.take(&id).await else {
            tracing::trace!("Ignoring result for unknown correlation id {}", id);
            return false;
        };

        tracing::debug!("Settling proxied call {}", id);
        // The caller may have given up already; nothing to do then.
        let _ = completion.send(result.result);
        true
    }
}

/// Caller for contexts without native transport access.
#[derive(Debug)]
pub struct ProxyCaller {
    channel: Arc<EventChannel>,
    pending: Arc<PendingCalls>,
    ids: Arc<dyn CorrelationIdSource>,
    call_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ProxyCaller {
    /// Subscribe to `channel` and start the dispatcher. Needs a Tokio runtime.
    pub async fn spawn(channel: Arc<EventChannel>, config: &Config) -> Result<Self> {
        Self::spawn_with_ids(channel, config, Arc::new(RandomIds)).await
    }

    /// Like [`spawn`](Self::spawn) with a custom id source.
    pub async fn spawn_with_ids(
        channel: Arc<EventChannel>,
        config: &Config,
        ids: Arc<dyn CorrelationIdSource>,
    ) -> Result<Self> {
        let (subscription, rx) = channel
            .subscribe(config.channel.subscriber_id("proxy"))
            .await?;

        let pending = Arc::new(PendingCalls::default());
        let cancel = CancellationToken::new();

        tokio::spawn(run_dispatcher(
            channel.clone(),
            subscription,
            rx,
            pending.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            channel,
            pending,
            ids,
            call_timeout: config.client.call_timeout,
            cancel,
        })
    }

    /// Relay an already validated envelope with the configured deadline.
    pub async fn send(&self, envelope: Envelope) -> Result<Value> {
        self.send_with_timeout(envelope, self.call_timeout).await
    }

    /// Relay an already validated envelope. `None` waits forever.
    pub async fn send_with_timeout(
        &self,
        envelope: Envelope,
        call_timeout: Option<Duration>,
    ) -> Result<Value> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled("proxy caller has shut down"));
        }

        let (tx, rx) = oneshot::channel();
        let id = self.pending.register(self.ids.as_ref(), tx).await?;
        let port = envelope.port.clone();

        // Registered before publishing, so the result cannot outrun us.
        let event = ChannelEvent::ProxyMessage(ProxyEnvelope::new(envelope, &id));
        if let Err(e) = self.channel.publish_event(&event).await {
            self.pending.take(&id).await;
            return Err(e);
        }
        tracing::debug!(correlation_id = %id, port = %port, "Published proxied call");

        let outcome = match call_timeout {
            None => rx.await,
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => {
                    self.pending.take(&id).await;
                    tracing::warn!(
                        correlation_id = %id,
                        port = %port,
                        "Proxied call timed out after {:?}",
                        deadline
                    );
                    return Err(Error::timeout(format!(
                        "no result for {} on port {} after {:?}",
                        id, port, deadline
                    )));
                }
            },
        };

        match outcome {
            Ok(result) => CallResult::settle(result),
            Err(_closed) => Err(Error::cancelled(format!(
                "proxy caller shut down while {} was pending",
                id
            ))),
        }
    }

    /// Validate, relay and decode a typed message.
    pub async fn call<M: Message>(&self, port: &str, msg: &M) -> Result<M::Response> {
        let envelope = Envelope::from_message(port, msg)?;
        decode_response(self.send(envelope).await?)
    }

    /// Number of calls waiting for a result.
    pub async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    pub async fn is_pending(&self, id: &CorrelationId) -> bool {
        self.pending.contains(id).await
    }

    /// Stop the dispatcher; outstanding calls fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ProxyCaller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_dispatcher(
    channel: Arc<EventChannel>,
    subscription: Subscription,
    mut rx: mpsc::UnboundedReceiver<Value>,
    pending: Arc<PendingCalls>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => {
                    pending.dispatch(&event).await;
                }
                None => break,
            },
        }
    }

    pending.close().await;
    if let Err(e) = channel.unsubscribe(&subscription).await {
        tracing::warn!("Proxy dispatcher failed to unsubscribe: {}", e);
    }
    tracing::debug!("Proxy dispatcher {} stopped", subscription.id);
}
