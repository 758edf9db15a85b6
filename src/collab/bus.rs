//! Message Bus Seams
//! =================
//! The publish/consume interface the collaboration protocol runs over,
//! plus an in-process bus for single-node operation and tests. A concrete
//! broker binding (Kafka) implements the same two traits.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::info;

/// Broker readiness poll: attempts and spacing used at startup.
pub const BUS_READY_ATTEMPTS: u32 = 100;
pub const BUS_READY_DELAY: Duration = Duration::from_secs(1);

/// One message taken off the bus.
#[derive(Clone, Debug)]
pub struct BusRecord {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Publishing side of the bus. Safe to share across tasks.
#[async_trait]
pub trait BusProducer: Send + Sync {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), String>;

    /// Cheap connectivity probe used by the startup readiness poll.
    async fn healthcheck(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Consuming side of the bus: one subscription, polled by one task.
///
/// Broker bindings should start at the latest offset with auto-commit
/// disabled; at-most-once delivery is acceptable because duplicate and
/// echoed requests are filtered by originator.
#[async_trait]
pub trait BusConsumer: Send {
    /// Next record, or `None` once the subscription is closed.
    async fn poll(&mut self) -> Option<BusRecord>;
}

/// Block until the bus answers its healthcheck, polling up to `attempts`
/// times with `delay` spacing. Brokers and their dependencies are often
/// still starting when the node comes up.
pub async fn wait_for_bus(
    producer: &dyn BusProducer,
    attempts: u32,
    delay: Duration,
) -> Result<(), String> {
    for attempt in 1..=attempts {
        match producer.healthcheck().await {
            Ok(()) => {
                info!("message bus connection up");
                return Ok(());
            }
            Err(error) => {
                info!(attempt, %error, "message bus not up yet");
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(format!("message bus unreachable after {attempts} attempts"))
}

/// In-process topic-fanout bus.
///
/// Every record published to a topic is delivered to every subscription
/// registered for that topic, including the publisher's own. That loopback
/// mirrors broker behavior and is what the protocol's self-echo guard
/// exists for.
pub struct InMemoryBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<BusRecord>>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        InMemoryBus {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a subscription over `topics` and return its consumer.
    pub fn subscribe(&self, topics: &[String]) -> InMemoryConsumer {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock();
        for topic in topics {
            subscribers.entry(topic.clone()).or_default().push(tx.clone());
        }
        InMemoryConsumer { rx }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusProducer for InMemoryBus {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> Result<(), String> {
        let mut subscribers = self.subscribers.lock();
        if let Some(senders) = subscribers.get_mut(topic) {
            // drop subscriptions whose consumer went away
            senders.retain(|sender| {
                sender
                    .send(BusRecord {
                        topic: topic.to_string(),
                        key: key.to_vec(),
                        payload: payload.to_vec(),
                    })
                    .is_ok()
            });
        }
        Ok(())
    }
}

/// Consumer half of an [`InMemoryBus`] subscription.
pub struct InMemoryConsumer {
    rx: mpsc::UnboundedReceiver<BusRecord>,
}

#[async_trait]
impl BusConsumer for InMemoryConsumer {
    async fn poll(&mut self) -> Option<BusRecord> {
        self.rx.recv().await
    }
}
