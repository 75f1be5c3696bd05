//! Identity Topics
//!
//! Each topic is an entity identifier. Subscriber connections register a
//! channel under their declared identifier; the worker publishes encoded
//! responses to the topics a response names.
//!
//! Delivery is governed by [`DeliveryPolicy`]:
//! - `Synchronous`: one-slot channels and an awaited send, so the publisher
//!   waits until each subscriber has taken the message.
//! - `Buffered`: bounded channels filled with `try_send`; a full subscriber
//!   loses the message instead of stalling the publisher.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default per-subscriber queue length under buffered delivery.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// An encoded message, shared by every recipient.
pub type Payload = Arc<str>;

/// How published messages reach subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Publisher blocks until each subscriber accepts the message.
    #[default]
    Synchronous,
    /// Publisher never blocks; full subscribers drop messages.
    Buffered {
        /// Queue length per subscriber.
        capacity: usize,
    },
}

impl DeliveryPolicy {
    fn channel_capacity(self) -> usize {
        match self {
            DeliveryPolicy::Synchronous => 1,
            DeliveryPolicy::Buffered { capacity } => capacity.max(1),
        }
    }
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPolicy::Synchronous => write!(f, "synchronous"),
            DeliveryPolicy::Buffered { capacity } => write!(f, "buffered:{capacity}"),
        }
    }
}

/// Parses `synchronous`, `buffered` or `buffered:<capacity>`.
impl FromStr for DeliveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(':') {
            None if s == "synchronous" || s == "sync" => Ok(DeliveryPolicy::Synchronous),
            None if s == "buffered" => Ok(DeliveryPolicy::Buffered {
                capacity: DEFAULT_SUBSCRIBER_BUFFER,
            }),
            Some(("buffered", n)) => n
                .parse::<usize>()
                .ok()
                .filter(|c| *c > 0)
                .map(|capacity| DeliveryPolicy::Buffered { capacity })
                .ok_or_else(|| format!("invalid buffer capacity: {n}")),
            _ => Err(format!("unknown delivery policy: {s}")),
        }
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Payload>,
}

/// Receiving end of one subscriber registration.
pub struct Subscription {
    topic: Uuid,
    id: u64,
    rx: mpsc::Receiver<Payload>,
}

impl Subscription {
    /// Topic this subscription listens on.
    pub fn topic(&self) -> Uuid {
        self.topic
    }

    /// Next published message, or `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// A message already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }
}

/// Identifier-keyed fan-out. Cheap to clone; clones share topics.
#[derive(Clone)]
pub struct TopicRegistry {
    topics: Arc<RwLock<BTreeMap<Uuid, Vec<Subscriber>>>>,
    policy: DeliveryPolicy,
    next_id: Arc<AtomicU64>,
}

impl TopicRegistry {
    /// Empty registry with the given delivery policy.
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self {
            topics: Arc::new(RwLock::new(BTreeMap::new())),
            policy,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Policy in effect.
    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Register a new subscriber on `topic`.
    pub async fn subscribe(&self, topic: Uuid) -> Subscription {
        let (tx, rx) = mpsc::channel(self.policy.channel_capacity());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.topics
            .write()
            .await
            .entry(topic)
            .or_default()
            .push(Subscriber { id, tx });

        debug!(%topic, id, "Subscribed");
        Subscription { topic, id, rx }
    }

    /// Remove a subscription. Messages already queued for it are discarded.
    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let mut topics = self.topics.write().await;
        if let Some(subscribers) = topics.get_mut(&subscription.topic) {
            subscribers.retain(|s| s.id != subscription.id);
            if subscribers.is_empty() {
                topics.remove(&subscription.topic);
            }
        }
        debug!(topic = %subscription.topic, id = subscription.id, "Unsubscribed");
    }

    /// Number of live subscribers on `topic`.
    pub async fn subscriber_count(&self, topic: &Uuid) -> usize {
        self.topics.read().await.get(topic).map_or(0, Vec::len)
    }

    /// Deliver `payload` to every subscriber of `topic`.
    ///
    /// Returns how many subscribers accepted it.
    pub async fn publish(&self, topic: Uuid, payload: Payload) -> usize {
        let targets: Vec<(u64, mpsc::Sender<Payload>)> = {
            let topics = self.topics.read().await;
            match topics.get(&topic) {
                Some(subscribers) => subscribers.iter().map(|s| (s.id, s.tx.clone())).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in targets {
            match self.policy {
                DeliveryPolicy::Synchronous => match tx.send(payload.clone()).await {
                    Ok(()) => delivered += 1,
                    Err(_) => closed.push(id),
                },
                DeliveryPolicy::Buffered { .. } => match tx.try_send(payload.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(%topic, id, "Subscriber queue full, dropping message");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
                },
            }
        }

        if !closed.is_empty() {
            self.prune(topic, &closed).await;
        }

        delivered
    }

    /// Publish to each distinct topic, in first-seen order.
    pub async fn publish_all(&self, topics: &[Uuid], payload: Payload) -> usize {
        let mut seen = Vec::with_capacity(topics.len());
        let mut delivered = 0;
        for topic in topics {
            if seen.contains(topic) {
                continue;
            }
            seen.push(*topic);
            delivered += self.publish(*topic, payload.clone()).await;
        }
        delivered
    }

    async fn prune(&self, topic: Uuid, closed: &[u64]) {
        let mut topics = self.topics.write().await;
        if let Some(subscribers) = topics.get_mut(&topic) {
            subscribers.retain(|s| !closed.contains(&s.id));
            if subscribers.is_empty() {
                topics.remove(&topic);
            }
        }
        debug!(%topic, pruned = closed.len(), "Pruned closed subscribers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn payload(s: &str) -> Payload {
        Arc::from(s)
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("synchronous".parse::<DeliveryPolicy>(), Ok(DeliveryPolicy::Synchronous));
        assert_eq!(
            "Buffered".parse::<DeliveryPolicy>(),
            Ok(DeliveryPolicy::Buffered { capacity: DEFAULT_SUBSCRIBER_BUFFER })
        );
        assert_eq!("buffered:8".parse::<DeliveryPolicy>(), Ok(DeliveryPolicy::Buffered { capacity: 8 }));
        assert!("buffered:0".parse::<DeliveryPolicy>().is_err());
        assert!("eventually".parse::<DeliveryPolicy>().is_err());

        let policy = DeliveryPolicy::Buffered { capacity: 3 };
        assert_eq!(policy.to_string().parse::<DeliveryPolicy>(), Ok(policy));
    }

    #[tokio::test]
    async fn test_publish_reaches_only_matching_topic() {
        let registry = TopicRegistry::new(DeliveryPolicy::Buffered { capacity: 4 });
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut a = registry.subscribe(alice).await;
        let mut b = registry.subscribe(bob).await;

        assert_eq!(registry.publish(alice, payload("hi")).await, 1);
        assert_eq!(a.recv().await.as_deref(), Some("hi"));
        assert!(tokio::time::timeout(Duration::from_millis(20), b.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_all_deduplicates() {
        let registry = TopicRegistry::new(DeliveryPolicy::Buffered { capacity: 4 });
        let alice = Uuid::new_v4();
        let mut a = registry.subscribe(alice).await;

        let delivered = registry.publish_all(&[alice, alice], payload("once")).await;
        assert_eq!(delivered, 1);
        assert_eq!(a.recv().await.as_deref(), Some("once"));
        assert!(tokio::time::timeout(Duration::from_millis(20), a.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_same_topic() {
        let registry = TopicRegistry::new(DeliveryPolicy::Synchronous);
        let alice = Uuid::new_v4();
        let mut first = registry.subscribe(alice).await;
        let mut second = registry.subscribe(alice).await;
        assert_eq!(registry.subscriber_count(&alice).await, 2);

        assert_eq!(registry.publish(alice, payload("x")).await, 2);
        assert_eq!(first.recv().await.as_deref(), Some("x"));
        assert_eq!(second.recv().await.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_synchronous_publish_waits_for_reader() {
        let registry = TopicRegistry::new(DeliveryPolicy::Synchronous);
        let alice = Uuid::new_v4();
        let mut sub = registry.subscribe(alice).await;

        // first message fills the single slot
        registry.publish(alice, payload("1")).await;

        let publisher = registry.clone();
        let blocked = tokio::spawn(async move { publisher.publish(alice, payload("2")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        assert_eq!(sub.recv().await.as_deref(), Some("1"));
        assert_eq!(blocked.await.unwrap(), 1);
        assert_eq!(sub.recv().await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_buffered_publish_drops_when_full() {
        let registry = TopicRegistry::new(DeliveryPolicy::Buffered { capacity: 1 });
        let alice = Uuid::new_v4();
        let mut sub = registry.subscribe(alice).await;

        assert_eq!(registry.publish(alice, payload("kept")).await, 1);
        assert_eq!(registry.publish(alice, payload("dropped")).await, 0);
        assert_eq!(sub.recv().await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let registry = TopicRegistry::new(DeliveryPolicy::Synchronous);
        let alice = Uuid::new_v4();
        let sub = registry.subscribe(alice).await;
        drop(sub);

        assert_eq!(registry.publish(alice, payload("gone")).await, 0);
        assert_eq!(registry.subscriber_count(&alice).await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let registry = TopicRegistry::new(DeliveryPolicy::Synchronous);
        let alice = Uuid::new_v4();
        let sub = registry.subscribe(alice).await;
        let _other = registry.subscribe(alice).await;

        registry.unsubscribe(&sub).await;
        assert_eq!(registry.subscriber_count(&alice).await, 1);
        assert_eq!(sub.topic(), alice);
    }
}
