use std::time::Duration;

/// What a heartbeat tick asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    SendPing,
    TimedOut,
}

/// Missed-pong accounting driven by a repeating timer.
///
/// The server may miss `ping_timeout / ping_interval` pongs in a row. One
/// more and the connection is considered dead.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Duration,
    missed: u32,
    max_missed: u32,
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let max_missed = match interval.as_millis() {
            0 => 0,
            ms => u32::try_from(timeout.as_millis() / ms).unwrap_or(u32::MAX),
        };
        Self {
            interval,
            missed: 0,
            max_missed,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_missed(&self) -> u32 {
        self.max_missed
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn tick(&mut self) -> HeartbeatTick {
        if self.missed > self.max_missed {
            return HeartbeatTick::TimedOut;
        }
        self.missed += 1;
        HeartbeatTick::SendPing
    }

    pub fn pong(&mut self) {
        self.missed = 0;
    }
}
