//! requeue-core
//!
//! Staged retry with backoff and dead-letter routing for message-queue
//! consumers. A message that fails processing is re-published to a chain of
//! delay topics (`retry-1` → `retry-2` → `retry-3`), each consumed only after
//! a stamped earliest-eligible time, until retries are exhausted and the
//! message lands on the dead-letter topic.
//!
//! Module map:
//! - **headers / envelope**: wire metadata codec and the key/payload/headers
//!   triple moving through the chain
//! - **stage / backoff / router**: the retry state machine, delay policy, and
//!   the single routing decision point
//! - **consumer / producer / provision / app**: the per-stage loop runner,
//!   synthetic traffic, startup provisioning, and process wiring
//! - **broker / store / clock**: ports for the external collaborators, with
//!   in-memory implementations for dev and test

pub mod app;
pub mod backoff;
pub mod broker;
pub mod clock;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod headers;
pub mod producer;
pub mod provision;
pub mod router;
pub mod stage;
pub mod store;

pub use app::App;
pub use backoff::{BackoffPolicy, FixedJitter, Jitter, ThreadRngJitter};
pub use broker::{Admin, Consumer, Delivery, InMemoryBroker, InMemoryConsumer, Producer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RetryDelays, Settings, Topics};
pub use envelope::Envelope;
pub use error::RequeueError;
pub use headers::Headers;
pub use router::RetryRouter;
pub use stage::{NextHop, Stage};
pub use store::{
    ApplyOutcome, EmployeeRecord, EmployeeStore, EmployeeUpdate, FlakyStore, InMemoryEmployeeStore,
};
