//!
//! Busy-wait cadence.
//!
//! A busy-wait first yields the execution context for `spin_polls`
//! attempts, which keeps the handoff latency low when the other side is
//! about to publish, and then sleeps `poll_interval_us` between attempts
//! so a long wait does not burn a core.
//!
//! ## Example config section
//!
//! ```toml
//! [wait]
//! spin_polls = 64
//! poll_interval_us = 100
//! ```
//!

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

pub const DEFAULT_SPIN_POLLS: u32 = 64;
pub const DEFAULT_POLL_INTERVAL_US: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitPolicy {
    pub spin_polls: u32,
    pub poll_interval_us: u64,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            spin_polls: DEFAULT_SPIN_POLLS,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
        }
    }
}

impl WaitPolicy {
    /// Never sleeps; every poll only yields.
    pub fn spinning() -> Self {
        Self {
            spin_polls: u32::MAX,
            poll_interval_us: 0,
        }
    }

    /// Sleeps `interval` between every poll.
    pub fn sleeping(interval: Duration) -> Self {
        Self {
            spin_polls: 0,
            poll_interval_us: interval.as_micros().min(u64::MAX as u128) as u64,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    /// Gives up the execution context before poll number `attempt` (zero based).
    pub fn pause(&self, attempt: u32) {
        if attempt < self.spin_polls || self.poll_interval_us == 0 {
            thread::yield_now();
        } else {
            thread::sleep(self.poll_interval());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.spin_polls, DEFAULT_SPIN_POLLS);
        assert_eq!(policy.poll_interval(), Duration::from_micros(100));
    }

    #[test]
    fn test_parse_partial_section() {
        let policy: WaitPolicy = toml::from_str("poll_interval_us = 2500").unwrap();
        assert_eq!(policy.spin_polls, DEFAULT_SPIN_POLLS);
        assert_eq!(policy.poll_interval(), Duration::from_micros(2500));

        let policy: WaitPolicy = toml::from_str("").unwrap();
        assert_eq!(policy, WaitPolicy::default());
    }

    #[test]
    fn test_sleeping_policy() {
        let policy = WaitPolicy::sleeping(Duration::from_millis(5));
        assert_eq!(policy.spin_polls, 0);
        assert_eq!(policy.poll_interval_us, 5_000);
    }

    #[test]
    fn test_pause_returns() {
        let policy = WaitPolicy::sleeping(Duration::from_micros(10));
        for attempt in 0..3 {
            policy.pause(attempt);
        }
        WaitPolicy::spinning().pause(0);
    }
}
