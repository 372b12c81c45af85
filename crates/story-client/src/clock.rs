//! Timers the poller and flush scheduler sleep on.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};

#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

struct Sleeper {
    wake_at: Duration,
    wake: oneshot::Sender<()>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    sleepers: Vec<Sleeper>,
}

/// Deterministic clock: sleeps finish only when the owner advances time.
#[derive(Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
    parked: Arc<Notify>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of sleeps waiting for time to pass.
    pub fn pending_sleeps(&self) -> usize {
        self.lock()
            .sleepers
            .iter()
            .filter(|s| !s.wake.is_closed())
            .count()
    }

    /// Move time forward and wake every sleep that is now due.
    pub fn advance(&self, by: Duration) {
        let due = {
            let mut state = self.lock();
            state.now += by;
            let now = state.now;
            let (due, waiting): (Vec<_>, Vec<_>) =
                state.sleepers.drain(..).partition(|s| s.wake_at <= now);
            state.sleepers = waiting;
            due
        };
        for sleeper in due {
            let _ = sleeper.wake.send(());
        }
    }

    /// Wait until at least `count` sleeps are parked on this clock.
    pub async fn wait_for_sleepers(&self, count: usize) {
        loop {
            let parked = self.parked.notified();
            if self.pending_sleeps() >= count {
                return;
            }
            parked.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // The state holds no invariants a panicking holder could break.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        let (wake, woken) = oneshot::channel();
        {
            let mut state = self.lock();
            let wake_at = state.now + duration;
            if duration.is_zero() {
                return;
            }
            state.sleepers.push(Sleeper { wake_at, wake });
        }
        self.parked.notify_waiters();
        let _ = woken.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_wakes_only_due_sleeps() {
        let clock = ManualClock::new();
        let short = tokio::spawn({
            let clock = clock.clone();
            async move { clock.sleep(Duration::from_secs(1)).await }
        });
        let long = tokio::spawn({
            let clock = clock.clone();
            async move { clock.sleep(Duration::from_secs(5)).await }
        });
        clock.wait_for_sleepers(2).await;

        clock.advance(Duration::from_secs(2));
        short.await.unwrap();
        assert!(!long.is_finished());
        assert_eq!(clock.pending_sleeps(), 1);

        clock.advance(Duration::from_secs(3));
        long.await.unwrap();
        assert_eq!(clock.now(), Duration::from_secs(5));
    }
}
