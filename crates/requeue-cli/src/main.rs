//! Demo deployment of the retry chain against the in-memory broker.
//!
//! Wires up provisioning, the synthetic producer, and all four stage
//! consumers, with a store that fails its first few applies so messages
//! visibly walk the retry chain. Ctrl-C shuts everything down gracefully.

use std::sync::Arc;

use requeue_core::{
    App, BackoffPolicy, Clock, Consumer, FlakyStore, InMemoryBroker, InMemoryEmployeeStore,
    Producer, RetryRouter, Settings, Stage, SystemClock, ThreadRngJitter, provision,
};
use tracing_subscriber::EnvFilter;

/// Applies the demo store fails before it starts succeeding; enough to walk
/// a message through every retry stage once.
const INJECTED_FAILURES: u32 = 4;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env().expect("invalid configuration");
    tracing::info!(
        broker = %settings.broker_addr,
        group_id = %settings.group_id,
        "starting requeue demo (in-memory broker)"
    );

    let broker = Arc::new(InMemoryBroker::new());
    provision::ensure_topics(broker.as_ref(), &settings.topics)
        .await
        .expect("topic provisioning failed");

    let store = Arc::new(FlakyStore::new(
        InMemoryEmployeeStore::with_employees(1..=5),
        INJECTED_FAILURES,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let router = Arc::new(RetryRouter::new(
        Arc::clone(&broker) as Arc<dyn Producer>,
        settings.topics.clone(),
        BackoffPolicy::new(settings.delays.clone(), Arc::new(ThreadRngJitter)),
        Arc::clone(&clock),
    ));

    let mut consumers: Vec<(Stage, Box<dyn Consumer>)> = Vec::new();
    for stage in Stage::ALL {
        let consumer = broker
            .subscribe(stage.topic(&settings.topics))
            .await
            .expect("subscribe failed");
        consumers.push((stage, Box::new(consumer)));
    }

    let app = App::start(
        &settings,
        consumers,
        router,
        store,
        clock,
        Some(Arc::clone(&broker) as Arc<dyn Producer>),
    );

    tokio::signal::ctrl_c().await.expect("ctrl-c handler failed");
    tracing::info!("shutdown requested");
    app.shutdown_and_join().await;

    if let Ok(dead) = broker.messages(&settings.topics.dead_letter).await {
        tracing::info!(count = dead.len(), "messages in dead letter at shutdown");
    }
}
