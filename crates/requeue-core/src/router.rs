//! Retry router: the single decision point for failed messages.
//!
//! Every stage loop hands its failures here. The router computes the next
//! hop, stamps a fresh header map, and publishes. It returns only after the
//! broker acknowledged the publish, so callers can safely order
//! "route, then commit the original".

use std::sync::Arc;

use crate::backoff::BackoffPolicy;
use crate::broker::Producer;
use crate::clock::Clock;
use crate::config::Topics;
use crate::envelope::Envelope;
use crate::error::RequeueError;
use crate::headers::{Headers, LAST_ERROR, NOT_BEFORE_EPOCH_MS, ORIGIN_TOPIC, RETRY_STAGE};
use crate::stage::{NextHop, Stage};

pub struct RetryRouter {
    producer: Arc<dyn Producer>,
    topics: Topics,
    backoff: BackoffPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryRouter {
    pub fn new(
        producer: Arc<dyn Producer>,
        topics: Topics,
        backoff: BackoffPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            producer,
            topics,
            backoff,
            clock,
        }
    }

    /// Route a message that failed at `failed_at` to its next hop.
    ///
    /// Retryable hop: stamp the target stage, a fresh `not_before`, the
    /// preserved-or-initialized origin topic, and the latest error.
    ///
    /// Terminal hop: publish to the dead-letter topic with the stage counter
    /// and origin preserved and no `not_before`; dead-lettered messages are
    /// not subject to delayed redelivery.
    ///
    /// A publish failure propagates; the caller must leave the original
    /// delivery uncommitted so the broker redelivers it.
    pub async fn route_failure(
        &self,
        failed_at: Stage,
        envelope: &Envelope,
        error: &str,
    ) -> Result<NextHop, RequeueError> {
        // First failure records where the message entered the chain.
        let origin = envelope
            .origin_topic()
            .unwrap_or(failed_at.topic(&self.topics))
            .to_string();

        match failed_at.next_hop() {
            NextHop::Retry(target) => {
                let delay = self.backoff.delay_for(target);
                let not_before = self.clock.now_ms() + delay.as_millis() as i64;

                let headers = Headers::new()
                    .with_i32(RETRY_STAGE, target.index())
                    .with_i64(NOT_BEFORE_EPOCH_MS, not_before)
                    .with_str(ORIGIN_TOPIC, &origin)
                    .with_str(LAST_ERROR, error);
                let outgoing =
                    Envelope::with_headers(envelope.key.clone(), envelope.payload.clone(), headers);

                let topic = target.topic(&self.topics);
                self.producer.send(topic, outgoing).await?;

                tracing::warn!(
                    topic,
                    delay_ms = delay.as_millis() as u64,
                    origin = %origin,
                    error,
                    "routed failed message to retry stage"
                );
                Ok(NextHop::Retry(target))
            }
            NextHop::DeadLetter => {
                let stage = envelope.retry_stage().unwrap_or(failed_at.index());

                let headers = Headers::new()
                    .with_i32(RETRY_STAGE, stage)
                    .with_str(ORIGIN_TOPIC, &origin)
                    .with_str(LAST_ERROR, error);
                let outgoing =
                    Envelope::with_headers(envelope.key.clone(), envelope.payload.clone(), headers);

                self.producer.send(&self.topics.dead_letter, outgoing).await?;

                tracing::error!(
                    origin = %origin,
                    retry_stage = stage,
                    error,
                    "routed message to dead letter"
                );
                Ok(NextHop::DeadLetter)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::backoff::FixedJitter;
    use crate::broker::{Admin, InMemoryBroker};
    use crate::clock::ManualClock;
    use crate::config::RetryDelays;

    const NOW_MS: i64 = 1_000_000;

    async fn fixture(jitter: u64) -> (Arc<InMemoryBroker>, RetryRouter) {
        let topics = Topics::default();
        let broker = Arc::new(InMemoryBroker::new());
        broker.ensure_topics(&topics.all()).await.unwrap();

        let router = RetryRouter::new(
            Arc::clone(&broker) as Arc<dyn Producer>,
            topics,
            BackoffPolicy::new(RetryDelays::default(), Arc::new(FixedJitter(jitter))),
            Arc::new(ManualClock::new(NOW_MS)),
        );
        (broker, router)
    }

    fn intake_envelope() -> Envelope {
        Envelope::new("3", br#"{"employeeId":3,"firstName":"Ann","syncTime":1000}"#.to_vec())
    }

    #[tokio::test]
    async fn first_failure_hops_to_retry_1() {
        let (broker, router) = fixture(0).await;

        let hop = router
            .route_failure(Stage::Main, &intake_envelope(), "db down")
            .await
            .unwrap();
        assert_eq!(hop, NextHop::Retry(Stage::Retry1));

        let routed = broker.messages("retry-1").await.unwrap();
        assert_eq!(routed.len(), 1);
        let out = &routed[0];
        assert_eq!(out.key, "3");
        assert_eq!(out.payload, intake_envelope().payload);
        assert_eq!(out.retry_stage(), Some(1));
        assert_eq!(out.not_before_epoch_ms(), Some(NOW_MS + 5_000));
        assert_eq!(out.origin_topic(), Some("main"));
        assert_eq!(out.last_error(), Some("db down"));
    }

    #[tokio::test]
    async fn origin_is_preserved_on_later_hops() {
        let (broker, router) = fixture(0).await;

        let inbound = Envelope::with_headers(
            "3",
            intake_envelope().payload,
            Headers::new()
                .with_i32(RETRY_STAGE, 1)
                .with_str(ORIGIN_TOPIC, "main")
                .with_str(LAST_ERROR, "db down"),
        );
        router
            .route_failure(Stage::Retry1, &inbound, "still down")
            .await
            .unwrap();

        let out = &broker.messages("retry-2").await.unwrap()[0];
        assert_eq!(out.retry_stage(), Some(2));
        assert_eq!(out.origin_topic(), Some("main"));
        assert_eq!(out.last_error(), Some("still down"));
        assert_eq!(out.not_before_epoch_ms(), Some(NOW_MS + 15_000));
    }

    #[tokio::test]
    async fn final_retry_stage_gets_jittered_delay() {
        let (broker, router) = fixture(2_500).await;

        router
            .route_failure(Stage::Retry2, &intake_envelope(), "down")
            .await
            .unwrap();

        let out = &broker.messages("retry-3").await.unwrap()[0];
        assert_eq!(out.retry_stage(), Some(3));
        assert_eq!(out.not_before_epoch_ms(), Some(NOW_MS + 32_500));
    }

    #[tokio::test]
    async fn exhausted_message_goes_to_dead_letter_without_not_before() {
        let (broker, router) = fixture(0).await;

        let inbound = Envelope::with_headers(
            "3",
            intake_envelope().payload,
            Headers::new()
                .with_i32(RETRY_STAGE, 3)
                .with_i64(NOT_BEFORE_EPOCH_MS, NOW_MS)
                .with_str(ORIGIN_TOPIC, "main"),
        );
        let hop = router
            .route_failure(Stage::Retry3, &inbound, "gave up")
            .await
            .unwrap();
        assert_eq!(hop, NextHop::DeadLetter);

        let dead = broker.messages("deadletter").await.unwrap();
        assert_eq!(dead.len(), 1);
        let out = &dead[0];
        assert_eq!(out.retry_stage(), Some(3));
        assert_eq!(out.not_before_epoch_ms(), None);
        assert_eq!(out.origin_topic(), Some("main"));
        assert_eq!(out.last_error(), Some("gave up"));
    }

    #[tokio::test]
    async fn missing_stage_header_defaults_to_failed_stage_on_dead_letter() {
        let (broker, router) = fixture(0).await;

        // Corrupted chain: no headers at all on a retry-3 message.
        router
            .route_failure(Stage::Retry3, &intake_envelope(), "gave up")
            .await
            .unwrap();

        let out = &broker.messages("deadletter").await.unwrap()[0];
        assert_eq!(out.retry_stage(), Some(3));
        assert_eq!(out.origin_topic(), Some("retry-3"));
    }

    struct BrokenProducer;

    #[async_trait]
    impl Producer for BrokenProducer {
        async fn send(&self, _topic: &str, _envelope: Envelope) -> Result<(), RequeueError> {
            Err(RequeueError::Broker("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn publish_failure_propagates() {
        let router = RetryRouter::new(
            Arc::new(BrokenProducer),
            Topics::default(),
            BackoffPolicy::new(RetryDelays::default(), Arc::new(FixedJitter(0))),
            Arc::new(ManualClock::new(NOW_MS)),
        );

        let err = router
            .route_failure(Stage::Main, &intake_envelope(), "db down")
            .await
            .unwrap_err();
        assert!(matches!(err, RequeueError::Broker(_)));
    }
}
