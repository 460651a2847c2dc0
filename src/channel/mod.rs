//! Shared event channel.
//!
//! In-process model of the host's cross-context broadcast mechanism: every
//! published event is delivered to every subscriber, whichever context it
//! belongs to. Consumers never remove each other's events; each subscriber
//! gets its own copy on an unbounded queue.
//!
//! Events are opaque JSON values. The bridge's own traffic is a
//! [`ChannelEvent`](crate::envelope::ChannelEvent); everything else published
//! here is somebody else's and is ignored by the bridge components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::envelope::ChannelEvent;
use crate::types::{Error, Result, SubscriberId};

// =============================================================================
// Subscriber Management
// =============================================================================

/// Subscriber handle for receiving events.
#[derive(Debug)]
struct Subscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<Value>,
}

/// Subscription receipt for managing subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriberId,
}

/// Statistics about channel usage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ChannelStats {
    pub events_published: u64,
    pub deliveries: u64,
    pub active_subscribers: usize,
    pub last_published_at: Option<DateTime<Utc>>,
}

// =============================================================================
// EventChannel
// =============================================================================

/// Broadcast channel shared by every context of the host.
#[derive(Debug, Clone, Default)]
pub struct EventChannel {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    stats: Arc<RwLock<ChannelStats>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to all subscribers.
    ///
    /// Fire-and-forget: the return value is how many subscribers the event
    /// was handed to, not whether anyone acted on it. Subscribers whose
    /// receiver has been dropped are pruned here.
    pub async fn publish(&self, event: Value) -> Result<usize> {
        let mut subscribers = self.subscribers.write().await;

        let mut delivered = 0;
        subscribers.retain(|subscriber| {
            if subscriber.tx.send(event.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                tracing::debug!("Pruning closed subscriber {}", subscriber.id);
                false
            }
        });

        let mut stats = self.stats.write().await;
        stats.events_published += 1;
        stats.deliveries += delivered as u64;
        stats.active_subscribers = subscribers.len();
        stats.last_published_at = Some(Utc::now());

        tracing::trace!("Published event to {} subscribers", delivered);

        Ok(delivered)
    }

    /// Serialise and publish one of the bridge's own events.
    pub async fn publish_event(&self, event: &ChannelEvent) -> Result<usize> {
        self.publish(event.to_value()?).await
    }

    /// Subscribe to every event published from now on.
    ///
    /// Returns (subscription handle, receiver channel).
    pub async fn subscribe(
        &self,
        subscriber_id: SubscriberId,
    ) -> Result<(Subscription, mpsc::UnboundedReceiver<Value>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subscribers = self.subscribers.write().await;
        if subscribers.iter().any(|s| s.id == subscriber_id) {
            return Err(Error::already_registered(format!(
                "subscriber {}",
                subscriber_id
            )));
        }
        subscribers.push(Subscriber {
            id: subscriber_id.clone(),
            tx,
        });

        let mut stats = self.stats.write().await;
        stats.active_subscribers = subscribers.len();

        tracing::debug!("Subscriber {} registered", subscriber_id);

        Ok((Subscription { id: subscriber_id }, rx))
    }

    /// Unsubscribe. Unknown subscriptions are ignored.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|s| s.id != subscription.id);

        let mut stats = self.stats.write().await;
        stats.active_subscribers = subscribers.len();

        tracing::debug!("Unsubscribed: {}", subscription.id);

        Ok(())
    }

    /// Number of live subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get current channel statistics.
    pub async fn get_stats(&self) -> ChannelStats {
        self.stats.read().await.clone()
    }

    /// Reset statistics counters.
    pub async fn reset_stats(&self) {
        let mut stats = self.stats.write().await;
        stats.events_published = 0;
        stats.deliveries = 0;
        stats.last_published_at = None;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_to_zero_subscribers() {
        let channel = EventChannel::new();

        let delivered = channel.publish(json!({"type": "noise"})).await.unwrap();
        assert_eq!(delivered, 0);

        let stats = channel.get_stats().await;
        assert_eq!(stats.events_published, 1);
        assert!(stats.last_published_at.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let channel = EventChannel::new();

        let (subscription, mut rx) = channel
            .subscribe(SubscriberId::from_string("page").unwrap())
            .await
            .unwrap();

        let delivered = channel.publish(json!({"hello": "world"})).await.unwrap();
        assert_eq!(delivered, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, json!({"hello": "world"}));

        channel.unsubscribe(&subscription).await.unwrap();
    }

    #[tokio::test]
    async fn test_multiple_subscribers_fan_out() {
        let channel = EventChannel::new();

        let (_sub1, mut rx1) = channel.subscribe(SubscriberId::new()).await.unwrap();
        let (_sub2, mut rx2) = channel.subscribe(SubscriberId::new()).await.unwrap();

        let delivered = channel.publish(json!(1)).await.unwrap();
        assert_eq!(delivered, 2);

        assert_eq!(rx1.recv().await.unwrap(), json!(1));
        assert_eq!(rx2.recv().await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_publisher_sees_own_events() {
        // A context that both publishes and listens receives its own traffic;
        // filtering by shape and correlation id is the listener's job.
        let channel = EventChannel::new();
        let (_sub, mut rx) = channel.subscribe(SubscriberId::new()).await.unwrap();

        channel.publish(json!("mine")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), json!("mine"));
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let channel = EventChannel::new();

        let (subscription, _rx) = channel.subscribe(SubscriberId::new()).await.unwrap();
        assert_eq!(channel.get_stats().await.active_subscribers, 1);

        channel.unsubscribe(&subscription).await.unwrap();
        assert_eq!(channel.get_stats().await.active_subscribers, 0);

        let delivered = channel.publish(json!({})).await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let channel = EventChannel::new();

        let (_subscription, rx) = channel.subscribe(SubscriberId::new()).await.unwrap();
        drop(rx);

        let delivered = channel.publish(json!({})).await.unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(channel.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_subscriber_id() {
        let channel = EventChannel::new();
        let id = SubscriberId::from_string("relay").unwrap();

        let _first = channel.subscribe(id.clone()).await.unwrap();
        let result = channel.subscribe(id).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let channel = EventChannel::new();

        for _ in 0..5 {
            channel.publish(json!({})).await.unwrap();
        }
        assert_eq!(channel.get_stats().await.events_published, 5);

        channel.reset_stats().await;

        let stats = channel.get_stats().await;
        assert_eq!(stats.events_published, 0);
        assert_eq!(stats.last_published_at, None);
    }
}
