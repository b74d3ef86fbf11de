//! In-memory broker implementation.
//!
//! Single-partition, append-only log per topic. Good enough for the demo
//! binary and for tests; the ports in [`crate::broker`] are the seam for a
//! real broker client later.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{Admin, Consumer, Delivery, Producer};
use crate::envelope::Envelope;
use crate::error::RequeueError;

struct TopicLog {
    messages: Vec<Envelope>,
    /// Wakes the topic's consumer on publish. One consumer per topic, so a
    /// stored permit is enough and no wakeup can be lost.
    notify: Arc<Notify>,
}

impl TopicLog {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// Shared broker state: topic name -> append-only log.
#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicLog>,
}

/// An in-process broker. Cloning the `Arc` shares the same logs; publish is
/// concurrency-safe, consumption goes through per-topic [`InMemoryConsumer`]
/// handles.
#[derive(Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A consumer handle for `topic`, starting at the beginning of the log.
    pub async fn subscribe(&self, topic: &str) -> Result<InMemoryConsumer, RequeueError> {
        let state = self.state.lock().await;
        let log = state
            .topics
            .get(topic)
            .ok_or_else(|| RequeueError::UnknownTopic(topic.to_string()))?;
        Ok(InMemoryConsumer {
            topic: topic.to_string(),
            state: Arc::clone(&self.state),
            notify: Arc::clone(&log.notify),
            position: 0,
            committed: 0,
        })
    }

    /// Snapshot of everything ever published to `topic`. The log is
    /// append-only, so consumed messages stay visible; handy for inspecting
    /// the dead-letter topic.
    pub async fn messages(&self, topic: &str) -> Result<Vec<Envelope>, RequeueError> {
        let state = self.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|log| log.messages.clone())
            .ok_or_else(|| RequeueError::UnknownTopic(topic.to_string()))
    }
}

#[async_trait]
impl Producer for InMemoryBroker {
    async fn send(&self, topic: &str, envelope: Envelope) -> Result<(), RequeueError> {
        let notify = {
            let mut state = self.state.lock().await;
            let log = state
                .topics
                .get_mut(topic)
                .ok_or_else(|| RequeueError::UnknownTopic(topic.to_string()))?;
            log.messages.push(envelope);
            Arc::clone(&log.notify)
        };

        // Notify outside the lock.
        notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl Admin for InMemoryBroker {
    async fn ensure_topics(&self, topics: &[&str]) -> Result<(), RequeueError> {
        let mut state = self.state.lock().await;
        for topic in topics {
            state
                .topics
                .entry(topic.to_string())
                .or_insert_with(TopicLog::new);
        }
        Ok(())
    }
}

/// Single-partition consumer handle.
///
/// `position` is the next offset to hand out, `committed` the next offset the
/// owner has acknowledged. If the owner asks for another delivery without
/// committing the last one, the handle rewinds to `committed` first, which is
/// what gives the at-least-once redelivery the stage loops rely on.
pub struct InMemoryConsumer {
    topic: String,
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
    position: u64,
    committed: u64,
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn receive(&mut self) -> Result<Delivery, RequeueError> {
        loop {
            {
                let state = self.state.lock().await;
                let log = state
                    .topics
                    .get(&self.topic)
                    .ok_or_else(|| RequeueError::UnknownTopic(self.topic.clone()))?;

                // Redeliver anything handed out but never committed.
                if self.position > self.committed {
                    self.position = self.committed;
                }

                if (self.position as usize) < log.messages.len() {
                    let offset = self.position;
                    let envelope = log.messages[offset as usize].clone();
                    self.position += 1;
                    return Ok(Delivery {
                        topic: self.topic.clone(),
                        offset,
                        envelope,
                    });
                }
            }

            self.notify.notified().await;
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), RequeueError> {
        if delivery.topic != self.topic {
            return Err(RequeueError::Broker(format!(
                "commit for topic {} on a {} consumer",
                delivery.topic, self.topic
            )));
        }
        self.committed = self.committed.max(delivery.offset + 1);
        self.position = self.position.max(self.committed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn envelope(key: &str) -> Envelope {
        Envelope::new(key, b"{}".to_vec())
    }

    async fn broker_with(topics: &[&str]) -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker.ensure_topics(topics).await.unwrap();
        broker
    }

    #[tokio::test]
    async fn send_and_receive_roundtrip() {
        let broker = broker_with(&["main"]).await;
        broker.send("main", envelope("1")).await.unwrap();

        let mut consumer = broker.subscribe("main").await.unwrap();
        let delivery = consumer.receive().await.unwrap();
        assert_eq!(delivery.topic, "main");
        assert_eq!(delivery.offset, 0);
        assert_eq!(delivery.envelope.key, "1");
    }

    #[tokio::test]
    async fn send_to_unknown_topic_fails() {
        let broker = broker_with(&["main"]).await;
        let err = broker.send("nope", envelope("1")).await.unwrap_err();
        assert!(matches!(err, RequeueError::UnknownTopic(_)));
    }

    #[tokio::test]
    async fn subscribe_to_unknown_topic_fails() {
        let broker = broker_with(&["main"]).await;
        assert!(broker.subscribe("nope").await.is_err());
    }

    #[tokio::test]
    async fn ensure_topics_is_idempotent() {
        let broker = broker_with(&["main"]).await;
        broker.send("main", envelope("1")).await.unwrap();
        broker.ensure_topics(&["main"]).await.unwrap();
        assert_eq!(broker.messages("main").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn uncommitted_delivery_is_handed_out_again() {
        let broker = broker_with(&["main"]).await;
        broker.send("main", envelope("1")).await.unwrap();
        broker.send("main", envelope("2")).await.unwrap();

        let mut consumer = broker.subscribe("main").await.unwrap();
        let first = consumer.receive().await.unwrap();
        assert_eq!(first.offset, 0);

        // No commit: the next receive must rewind to the same offset.
        let again = consumer.receive().await.unwrap();
        assert_eq!(again.offset, 0);
        assert_eq!(again.envelope.key, "1");

        consumer.commit(&again).await.unwrap();
        let second = consumer.receive().await.unwrap();
        assert_eq!(second.offset, 1);
        assert_eq!(second.envelope.key, "2");
    }

    #[tokio::test]
    async fn receive_waits_until_publish() {
        let broker = Arc::new(broker_with(&["main"]).await);
        let mut consumer = broker.subscribe("main").await.unwrap();

        let waiter = tokio::spawn(async move { consumer.receive().await.unwrap() });

        tokio::time::sleep(Duration::from_millis(50)).await;
        broker.send("main", envelope("late")).await.unwrap();

        let delivery = waiter.await.unwrap();
        assert_eq!(delivery.envelope.key, "late");
    }

    #[tokio::test]
    async fn receive_on_empty_topic_stays_pending() {
        let broker = broker_with(&["main"]).await;
        let mut consumer = broker.subscribe("main").await.unwrap();
        let result =
            tokio::time::timeout(Duration::from_millis(50), consumer.receive()).await;
        assert!(result.is_err());
    }
}
