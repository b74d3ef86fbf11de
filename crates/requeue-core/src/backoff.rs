//! Backoff policy: decides how long a message waits before its next attempt.
//!
//! Stages 1 and 2 use fixed delays. Stage 3 adds bounded uniform jitter so a
//! burst of failures does not produce a synchronized retry storm. The jitter
//! source is a trait so tests can pin it while production draws from the
//! thread RNG, fresh on every call.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryDelays;
use crate::stage::Stage;

/// Source of uniform jitter samples.
pub trait Jitter: Send + Sync {
    /// A sample in `[0, bound_ms)`. A zero bound yields zero.
    fn sample_ms(&self, bound_ms: u64) -> u64;
}

/// Production jitter: an independent draw from the thread RNG per call, so
/// repeated failures of the same message still get independent delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl Jitter for ThreadRngJitter {
    fn sample_ms(&self, bound_ms: u64) -> u64 {
        if bound_ms == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..bound_ms)
    }
}

/// Deterministic jitter for tests. Samples are clamped to the bound.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub u64);

impl Jitter for FixedJitter {
    fn sample_ms(&self, bound_ms: u64) -> u64 {
        self.0.min(bound_ms.saturating_sub(1))
    }
}

#[derive(Clone)]
pub struct BackoffPolicy {
    delays: RetryDelays,
    jitter: Arc<dyn Jitter>,
}

impl BackoffPolicy {
    pub fn new(delays: RetryDelays, jitter: Arc<dyn Jitter>) -> Self {
        Self { delays, jitter }
    }

    /// Delay before a message published to `target` becomes eligible.
    ///
    /// Zero means "eligible immediately". `Main` is never a routing target,
    /// so it carries no delay.
    pub fn delay_for(&self, target: Stage) -> Duration {
        let ms = match target {
            Stage::Main => 0,
            Stage::Retry1 => self.delays.retry1_ms,
            Stage::Retry2 => self.delays.retry2_ms,
            Stage::Retry3 => {
                self.delays.retry3_base_ms + self.jitter.sample_ms(self.delays.retry3_jitter_ms)
            }
        };
        Duration::from_millis(ms)
    }
}
