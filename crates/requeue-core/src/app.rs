//! Application wiring: one task per stage consumer plus the optional
//! synthetic producer, all hanging off a single shutdown signal.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broker::{Consumer, Producer};
use crate::clock::Clock;
use crate::config::Settings;
use crate::consumer::run_stage;
use crate::producer::run_producer;
use crate::router::RetryRouter;
use crate::stage::Stage;
use crate::store::EmployeeStore;

/// Running application handle.
/// - `request_shutdown()` flips the watch signal; loops finish their in-flight
///   step and exit.
/// - `shutdown_and_join()` waits for all of them.
pub struct App {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl App {
    /// Spawn all stage loops (and the synthetic producer, when given one).
    /// Topics must already be provisioned and `consumers` subscribed.
    pub fn start(
        settings: &Settings,
        consumers: Vec<(Stage, Box<dyn Consumer>)>,
        router: Arc<RetryRouter>,
        store: Arc<dyn EmployeeStore>,
        clock: Arc<dyn Clock>,
        synthetic_producer: Option<Arc<dyn Producer>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut joins = Vec::with_capacity(consumers.len() + 1);

        if let Some(producer) = synthetic_producer {
            joins.push(tokio::spawn(run_producer(
                producer,
                settings.topics.main.clone(),
                settings.producer_interval,
                Arc::clone(&clock),
                shutdown_rx.clone(),
            )));
        }

        for (stage, consumer) in consumers {
            joins.push(tokio::spawn(run_stage(
                stage,
                consumer,
                Arc::clone(&router),
                Arc::clone(&store),
                Arc::clone(&clock),
                shutdown_rx.clone(),
            )));
        }

        Self { shutdown_tx, joins }
    }

    /// Ask every loop to stop. In-flight waits are abandoned; completed side
    /// effects are not rolled back.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}
