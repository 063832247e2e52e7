use std::time::Duration;

/// When and how often the session reconnects after the transport drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Fixed delay between attempts.
    pub wait: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: None,
            wait: Duration::from_secs(10),
        }
    }
}

/// What to do at the next reconnect tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    /// Start another attempt. `remaining` counts this one; `-1` when
    /// unlimited.
    Attempt { remaining: i64 },
    /// Give up.
    Exhausted,
}

/// Attempt bookkeeping for one reconnect cycle.
#[derive(Debug, Clone, Default)]
pub struct ReconnectState {
    reconnecting: bool,
    attempts: u32,
}

impl ReconnectState {
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    /// Enter a reconnect cycle. Returns `false` if one is already running.
    pub fn begin(&mut self) -> bool {
        if self.reconnecting {
            return false;
        }
        self.reconnecting = true;
        self.attempts = 0;
        true
    }

    pub fn next_step(&mut self, policy: &ReconnectPolicy) -> ReconnectStep {
        if !policy.enabled {
            return ReconnectStep::Exhausted;
        }
        let remaining = match policy.max_attempts {
            Some(max) if self.attempts >= max => return ReconnectStep::Exhausted,
            Some(max) => i64::from(max - self.attempts),
            None => -1,
        };
        self.attempts = self.attempts.saturating_add(1);
        ReconnectStep::Attempt { remaining }
    }

    pub fn reset(&mut self) {
        self.reconnecting = false;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(max: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: Some(max),
            ..ReconnectPolicy::default()
        }
    }

    #[test]
    fn counts_down_then_exhausts() {
        let policy = limited(3);
        let mut state = ReconnectState::default();
        assert!(state.begin());
        assert!(!state.begin());

        let steps: Vec<_> = (0..4).map(|_| state.next_step(&policy)).collect();
        assert_eq!(
            steps,
            vec![
                ReconnectStep::Attempt { remaining: 3 },
                ReconnectStep::Attempt { remaining: 2 },
                ReconnectStep::Attempt { remaining: 1 },
                ReconnectStep::Exhausted,
            ]
        );
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn unlimited_reports_minus_one() {
        let mut state = ReconnectState::default();
        state.begin();
        for _ in 0..10 {
            assert_eq!(
                state.next_step(&ReconnectPolicy::default()),
                ReconnectStep::Attempt { remaining: -1 }
            );
        }
    }

    #[test]
    fn zero_attempts_and_disabled_exhaust_immediately() {
        let mut state = ReconnectState::default();
        state.begin();
        assert_eq!(state.next_step(&limited(0)), ReconnectStep::Exhausted);

        let disabled = ReconnectPolicy {
            enabled: false,
            ..ReconnectPolicy::default()
        };
        assert_eq!(state.next_step(&disabled), ReconnectStep::Exhausted);
    }

    #[test]
    fn reset_allows_a_new_cycle() {
        let mut state = ReconnectState::default();
        state.begin();
        state.next_step(&limited(1));
        state.reset();
        assert!(!state.is_reconnecting());
        assert!(state.begin());
        assert_eq!(
            state.next_step(&limited(1)),
            ReconnectStep::Attempt { remaining: 1 }
        );
    }
}
