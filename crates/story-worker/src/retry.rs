//! Backoff for job store and queue errors.
//!
//! A job whose task already stopped must still reach a terminal state, so the
//! `FAILURE` write is retried while the store is unreachable. The consume loop
//! uses [`ConsumeBackoff`] to pause and quiet its logs while the queue is down.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use story_queue::{QueueError, QueueResult};

/// Retry policy for writes that must land in the job store.
#[derive(Debug, Clone)]
pub struct StoreRetry {
    /// Attempts including the first one
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for StoreRetry {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl StoreRetry {
    fn delay(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay)
    }

    /// Run `write` until it succeeds, fails with an error other than an
    /// unreachable store, or the attempts run out.
    pub async fn run<F, Fut, T>(&self, what: &str, mut write: F) -> QueueResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = QueueResult<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut retry = 0;
        loop {
            match write().await {
                Err(e) if e.is_unavailable() && retry + 1 < attempts => {
                    let delay = self.delay(retry);
                    retry += 1;
                    debug!("{} failed ({}), retrying in {:?}", what, e, delay);
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Pause between failed consume calls, growing while the queue stays down.
///
/// Only the first few consecutive failures are logged.
#[derive(Debug)]
pub struct ConsumeBackoff {
    failures: u32,
    logged: u32,
    base: Duration,
    max: Duration,
}

impl ConsumeBackoff {
    pub fn new(logged: u32, base: Duration, max: Duration) -> Self {
        Self {
            failures: 0,
            logged,
            base,
            max,
        }
    }

    pub fn succeeded(&mut self) {
        if self.failures > self.logged {
            debug!("Queue recovered after {} failed consume calls", self.failures);
        }
        self.failures = 0;
    }

    /// Record a failed consume. Returns how long to pause and whether the
    /// error should be logged. `unavailable` marks an unreachable queue.
    pub fn failed(&mut self, unavailable: bool) -> (Duration, bool) {
        self.failures += 1;
        if self.failures == self.logged + 1 {
            warn!(
                "Queue still failing after {} attempts, suppressing further errors",
                self.logged
            );
        }
        // Rejected data will not fix itself by waiting longer.
        let pause = if unavailable {
            self.base
                .saturating_mul(2u32.saturating_pow(self.failures - 1))
                .min(self.max)
        } else {
            self.base
        };
        (pause, self.failures <= self.logged)
    }
}
