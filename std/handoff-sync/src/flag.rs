//!
//! Visibility Flag
//!
//! A single boolean cell used as the synchronization point of a handoff.
//! The writer publishes with a release store; a reader that observes
//! `true` through an acquire load also observes every write the writer
//! made before `set()`.
//!
//! Discipline: one writer sets the flag, one reader clears it.
//!
//! Busy-waits never spin unconditionally. They poll under a `WaitPolicy`
//! and give up on a cancellation condition or a deadline.
//!

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use handoff_core::{Wait, WaitPolicy};

#[derive(Debug, Default)]
pub struct VisibilityFlag {
    set: AtomicBool,
}

impl VisibilityFlag {
    pub const fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
        }
    }

    /// Publishes every earlier write of this context to whoever observes the flag.
    pub fn set(&self) {
        self.set.store(true, Ordering::Release);
    }

    /// Non-clearing acquire read.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Clears the flag if it was set. Returns whether it was.
    pub fn test_and_clear(&self) -> bool {
        self.set
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Polls until the flag is observed set or `cancelled` returns true.
    pub fn busy_wait_until_set(
        &self,
        policy: &WaitPolicy,
        cancelled: impl FnMut() -> bool,
    ) -> Wait {
        poll_until(policy, || self.is_set(), cancelled)
    }

    /// Polls until the flag is observed set or `timeout` elapses.
    pub fn busy_wait_timeout(&self, policy: &WaitPolicy, timeout: Duration) -> Wait {
        poll_until_deadline(policy, || self.is_set(), deadline_after(timeout))
    }
}

/// The bounded poll loop behind every busy-wait.
///
/// `ready` is checked before `cancelled`, so a condition that is already
/// true wins over a cancellation that fires at the same moment.
pub fn poll_until(
    policy: &WaitPolicy,
    ready: impl FnMut() -> bool,
    mut cancelled: impl FnMut() -> bool,
) -> Wait {
    poll(policy, ready, || cancelled().then_some(Wait::Cancelled))
}

/// Same loop, ending in `Wait::TimedOut` at `deadline` (`None` waits forever).
pub fn poll_until_deadline(
    policy: &WaitPolicy,
    ready: impl FnMut() -> bool,
    deadline: Option<Instant>,
) -> Wait {
    poll(policy, ready, || match deadline {
        Some(deadline) if Instant::now() >= deadline => Some(Wait::TimedOut),
        _ => None,
    })
}

pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn poll(
    policy: &WaitPolicy,
    mut ready: impl FnMut() -> bool,
    mut give_up: impl FnMut() -> Option<Wait>,
) -> Wait {
    let mut attempt: u32 = 0;
    loop {
        if ready() {
            return Wait::Ready(());
        }
        if let Some(outcome) = give_up() {
            return outcome;
        }
        policy.pause(attempt);
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU64;
    use std::thread;

    #[test]
    fn test_set_then_test_and_clear() {
        let flag = VisibilityFlag::new();
        assert!(!flag.is_set());

        flag.set();
        assert!(flag.is_set());
        assert!(flag.test_and_clear());
        assert!(!flag.is_set());
    }

    #[test]
    fn test_and_clear_on_unset_flag_has_no_effect() {
        let flag = VisibilityFlag::new();
        assert!(!flag.test_and_clear());
        assert!(!flag.is_set());
    }

    #[test]
    fn test_publishes_prior_writes() {
        struct Shared {
            a: AtomicU64,
            b: AtomicU64,
            c: AtomicU64,
            ready: VisibilityFlag,
        }

        for round in 0..200u64 {
            let shared = Arc::new(Shared {
                a: AtomicU64::new(0),
                b: AtomicU64::new(0),
                c: AtomicU64::new(0),
                ready: VisibilityFlag::new(),
            });

            let writer = {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    shared.a.store(round + 1, Ordering::Relaxed);
                    shared.b.store(round + 2, Ordering::Relaxed);
                    shared.c.store(round + 3, Ordering::Relaxed);
                    shared.ready.set();
                })
            };

            let outcome = shared
                .ready
                .busy_wait_until_set(&WaitPolicy::spinning(), || false);
            assert!(outcome.is_ready());
            assert_eq!(shared.a.load(Ordering::Relaxed), round + 1);
            assert_eq!(shared.b.load(Ordering::Relaxed), round + 2);
            assert_eq!(shared.c.load(Ordering::Relaxed), round + 3);

            writer.join().unwrap();
        }
    }

    #[test]
    fn test_busy_wait_cancelled() {
        let flag = VisibilityFlag::new();
        let mut polls = 0;
        let outcome = flag.busy_wait_until_set(&WaitPolicy::default(), || {
            polls += 1;
            polls > 10
        });
        assert_eq!(outcome, Wait::Cancelled);
        assert_eq!(polls, 11);
    }

    #[test]
    fn test_busy_wait_ready_beats_cancel() {
        let flag = VisibilityFlag::new();
        flag.set();
        let outcome = flag.busy_wait_until_set(&WaitPolicy::default(), || true);
        assert_eq!(outcome, Wait::Ready(()));
        assert!(flag.is_set(), "busy-wait must not clear the flag");
    }

    #[test]
    fn test_busy_wait_timeout() {
        let flag = VisibilityFlag::new();
        let policy = WaitPolicy::sleeping(Duration::from_millis(1));
        let started = Instant::now();
        let outcome = flag.busy_wait_timeout(&policy, Duration::from_millis(30));
        assert_eq!(outcome, Wait::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_busy_wait_sees_late_set() {
        let flag = Arc::new(VisibilityFlag::new());
        let setter = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                flag.set();
            })
        };

        let outcome = flag.busy_wait_timeout(&WaitPolicy::default(), Duration::from_secs(5));
        assert!(outcome.is_ready());
        setter.join().unwrap();
    }
}
