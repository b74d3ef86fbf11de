//! Synthetic traffic generator for the demo deployment.
//!
//! Publishes one employee update per interval to the intake topic, cycling
//! through a small set of employee ids. Not part of the protocol; it exists
//! so the retry chain has something to chew on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::broker::Producer;
use crate::clock::Clock;
use crate::envelope::Envelope;
use crate::store::EmployeeUpdate;

pub async fn run_producer(
    producer: Arc<dyn Producer>,
    topic: String,
    interval: Duration,
    clock: Arc<dyn Clock>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!(
        topic = %topic,
        interval_ms = interval.as_millis() as u64,
        "synthetic producer started"
    );

    let mut counter: u64 = 0;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let update = EmployeeUpdate {
            employee_id: (counter % 5) as i32 + 1,
            first_name: format!("Name_{counter}"),
            sync_time: clock.now_ms(),
        };

        match serde_json::to_vec(&update) {
            Ok(payload) => {
                let envelope = Envelope::new(update.employee_id.to_string(), payload);
                match producer.send(&topic, envelope).await {
                    Ok(()) => {
                        tracing::info!(
                            counter,
                            employee_id = update.employee_id,
                            first_name = %update.first_name,
                            "produced message"
                        );
                        counter += 1;
                    }
                    Err(e) => tracing::error!(error = %e, "produce failed"),
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode update"),
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("synthetic producer stopped");
}
