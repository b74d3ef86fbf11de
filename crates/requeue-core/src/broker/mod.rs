//! Broker ports.
//!
//! The retry protocol only needs three narrow capabilities from a broker:
//! publish with acknowledgment, pull-and-commit consumption, and idempotent
//! topic provisioning. Everything else (partition assignment, offset storage,
//! rebalancing) stays behind these traits. The only assumption made of an
//! implementation is at-least-once delivery: a delivery that is never
//! committed must eventually be handed out again.

mod memory;

pub use memory::{InMemoryBroker, InMemoryConsumer};

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::RequeueError;

/// One received message plus the position needed to commit it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub offset: u64,
    pub envelope: Envelope,
}

/// Publish capability. Safe to share across stages.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publish to `topic`. Returns only once the broker has acknowledged the
    /// message; callers rely on this to order "hand off, then commit".
    async fn send(&self, topic: &str, envelope: Envelope) -> Result<(), RequeueError>;
}

/// Consume capability. Exclusively owned by one stage loop.
#[async_trait]
pub trait Consumer: Send {
    /// Next delivery for this consumer's topic. Waits until one is available.
    /// An uncommitted delivery from a previous call is handed out again.
    async fn receive(&mut self) -> Result<Delivery, RequeueError>;

    /// Mark a delivery as handled. Never called before the message was either
    /// applied or confirmed handed off to the next stage.
    async fn commit(&mut self, delivery: &Delivery) -> Result<(), RequeueError>;
}

/// Provisioning capability, used once at startup.
#[async_trait]
pub trait Admin: Send + Sync {
    /// Create any of `topics` that do not exist yet. Idempotent.
    async fn ensure_topics(&self, topics: &[&str]) -> Result<(), RequeueError>;
}
