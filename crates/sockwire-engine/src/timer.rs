//! Cancellable scheduled tasks and generation counters.
//!
//! Timers never call back into their owner. They post a message onto the
//! owner's channel, stamped by the caller with the [`Epoch`] generation that
//! was current when they were armed. The owner drops messages whose stamp is
//! stale, so a timer that fires after teardown or restart is a no-op.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Monotonic generation counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Epoch {
    current: u64,
}

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    /// Invalidate everything stamped so far and return the new generation.
    pub fn advance(&mut self) -> u64 {
        self.current = self.current.wrapping_add(1);
        self.current
    }

    pub fn is_current(&self, stamp: u64) -> bool {
        self.current == stamp
    }
}

/// A spawned timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Cancel now. Same as dropping.
    pub fn cancel(self) {}

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Post `message` to `tx` once, after `delay`.
pub fn schedule_once<M>(delay: Duration, tx: mpsc::UnboundedSender<M>, message: M) -> ScheduledTask
where
    M: Send + 'static,
{
    let handle = tokio::spawn(async move {
        time::sleep(delay).await;
        let _ = tx.send(message);
    });
    ScheduledTask { handle }
}

/// Post `make()` to `tx` every `period`, first after one period.
pub fn schedule_repeating<M, F>(
    period: Duration,
    tx: mpsc::UnboundedSender<M>,
    make: F,
) -> ScheduledTask
where
    M: Send + 'static,
    F: Fn() -> M + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if tx.send(make()).is_err() {
                break;
            }
        }
    });
    ScheduledTask { handle }
}
