//! The staged consumer loop.
//!
//! One parameterized runner for every stage: receive, gate, parse, apply,
//! and on failure hand over to the router. Per-stage behavior differs only in
//! the stage identity passed in, which is what keeps intake and the three
//! retry consumers from being four copies of the same loop.
//!
//! Commit discipline: a delivery is committed after the update was applied,
//! after a terminal non-retryable outcome (stale update, malformed payload),
//! or after the router confirmed the hand-off. A failed hand-off leaves the
//! delivery uncommitted so the broker redelivers it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::broker::{Consumer, Delivery};
use crate::clock::Clock;
use crate::router::RetryRouter;
use crate::stage::Stage;
use crate::store::{ApplyOutcome, EmployeeStore, EmployeeUpdate};

/// Run one stage's consumer until the shutdown signal flips.
///
/// Processes exactly one message at a time. The not-before wait is local to
/// the in-flight message; under low traffic the loop simply sits on it, which
/// matches a single-partition, single-in-flight model.
pub async fn run_stage(
    stage: Stage,
    mut consumer: Box<dyn Consumer>,
    router: Arc<RetryRouter>,
    store: Arc<dyn EmployeeStore>,
    clock: Arc<dyn Clock>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!(stage = stage.label(), "stage consumer started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let delivery = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            delivery = consumer.receive() => delivery,
        };
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                // Transient infra error: nothing to commit, the broker keeps
                // the message.
                tracing::error!(stage = stage.label(), error = %e, "receive failed");
                tokio::task::yield_now().await;
                continue;
            }
        };

        tracing::info!(
            stage = stage.label(),
            key = %delivery.envelope.key,
            retry_stage = delivery.envelope.retry_stage(),
            origin = delivery.envelope.origin_topic(),
            "received message"
        );

        // Not-before gate: hold this message until it is eligible.
        if stage.is_gated()
            && let Some(not_before) = delivery.envelope.not_before_epoch_ms()
        {
            let wait_ms = not_before - clock.now_ms();
            if wait_ms > 0 {
                tracing::info!(
                    stage = stage.label(),
                    wait_ms,
                    "message arrived early, holding until eligible"
                );
                tokio::select! {
                    // Uncommitted: redelivered after restart.
                    _ = shutdown_rx.changed() => continue,
                    _ = tokio::time::sleep(Duration::from_millis(wait_ms as u64)) => {}
                }
            }
        }

        let update: EmployeeUpdate = match serde_json::from_slice(&delivery.envelope.payload) {
            Ok(update) => update,
            Err(e) => {
                // Retrying cannot fix a parse error: drop, not dead-letter.
                tracing::error!(
                    stage = stage.label(),
                    key = %delivery.envelope.key,
                    error = %e,
                    "dropping malformed payload"
                );
                commit(consumer.as_mut(), stage, &delivery).await;
                continue;
            }
        };

        match store.apply_update(&update).await {
            Ok(ApplyOutcome::Applied) => {
                tracing::info!(
                    stage = stage.label(),
                    employee_id = update.employee_id,
                    "processed message"
                );
                commit(consumer.as_mut(), stage, &delivery).await;
            }
            Ok(ApplyOutcome::NotApplied) => {
                // Stale version or missing record: terminal, not retryable.
                tracing::warn!(
                    stage = stage.label(),
                    employee_id = update.employee_id,
                    "update not applied, dropping"
                );
                commit(consumer.as_mut(), stage, &delivery).await;
            }
            Err(e) => {
                tracing::error!(
                    stage = stage.label(),
                    employee_id = update.employee_id,
                    error = %e,
                    "processing failed"
                );
                match router
                    .route_failure(stage, &delivery.envelope, &e.to_string())
                    .await
                {
                    // Commit only once the hand-off is confirmed.
                    Ok(_) => commit(consumer.as_mut(), stage, &delivery).await,
                    Err(route_err) => {
                        tracing::error!(
                            stage = stage.label(),
                            error = %route_err,
                            "routing failed, leaving delivery uncommitted"
                        );
                    }
                }
            }
        }
    }

    tracing::info!(stage = stage.label(), "stage consumer stopped");
}

async fn commit(consumer: &mut dyn Consumer, stage: Stage, delivery: &Delivery) {
    if let Err(e) = consumer.commit(delivery).await {
        tracing::error!(
            stage = stage.label(),
            offset = delivery.offset,
            error = %e,
            "commit failed"
        );
    }
}
