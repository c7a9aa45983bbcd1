//!
//! Reentrant Monitor
//!
//! A mutual-exclusion primitive that owns no data of its own. Ownership is
//! tracked per execution context (`OwnerId`) together with a hold depth, so
//! a context already inside the monitor can call another operation that
//! acquires it again. The monitor is handed to another context only after
//! the outermost `release()`.
//!
//! Usage:
//! ```rust,ignore
//! let monitor = Monitor::new();
//! monitor.acquire();
//! monitor.acquire();          // same context: depth 2
//! monitor.release()?;
//! monitor.release()?;         // fully released, one waiter woken
//! assert!(monitor.release().is_err());
//! ```
//!
//! Waiters block on a condition variable and are woken one at a time.
//! There is no fairness among them.
//!

use std::marker::PhantomData;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use handoff_core::{OwnerId, SyncError, Wait};
use tracing::warn;

#[derive(Debug)]
struct MonitorState {
    owner: Option<OwnerId>,
    depth: usize,
    waiters: usize,
}

impl MonitorState {
    const fn new() -> Self {
        Self {
            owner: None,
            depth: 0,
            waiters: 0,
        }
    }

    /// Takes or re-enters ownership for `me`; false when someone else holds it.
    fn claim(&mut self, me: OwnerId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(me);
                self.depth = 1;
                true
            }
            Some(owner) if owner == me => {
                self.depth += 1;
                true
            }
            Some(_) => false,
        }
    }
}

#[derive(Debug)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    released: Condvar,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState::new()),
            released: Condvar::new(),
        }
    }

    // The bookkeeping mutex never runs user code, so a poisoned guard is still consistent.
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the calling context owns the monitor.
    pub fn acquire(&self) {
        let me = OwnerId::current();
        let mut state = self.lock_state();
        while !state.claim(me) {
            state.waiters += 1;
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.waiters -= 1;
        }
    }

    /// Like `acquire`, but gives up once `timeout` has elapsed.
    pub fn acquire_timeout(&self, timeout: Duration) -> Wait {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.acquire();
            return Wait::Ready(());
        };

        let me = OwnerId::current();
        let mut state = self.lock_state();
        loop {
            if state.claim(me) {
                return Wait::Ready(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Wait::TimedOut;
            }
            state.waiters += 1;
            let (next, _) = self
                .released
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
            state.waiters -= 1;
        }
    }

    /// Acquires only if that needs no waiting.
    pub fn try_acquire(&self) -> bool {
        self.lock_state().claim(OwnerId::current())
    }

    /// Drops one level of ownership; at depth zero the monitor is free and one waiter wakes.
    pub fn release(&self) -> Result<(), SyncError> {
        let me = OwnerId::current();
        let mut state = self.lock_state();
        match state.owner {
            None => {
                return Err(SyncError::illegal_use(
                    "Monitor::release",
                    "monitor is not held (hold depth is already zero)",
                ));
            }
            Some(owner) if owner != me => {
                return Err(SyncError::illegal_use(
                    "Monitor::release",
                    format!("monitor is held by {owner}, not by {me}"),
                ));
            }
            Some(_) => {}
        }

        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            if state.waiters > 0 {
                self.released.notify_one();
            }
        }
        Ok(())
    }

    /// Acquires and returns a guard that releases on drop.
    pub fn enter(&self) -> MonitorGuard<'_> {
        self.acquire();
        MonitorGuard::new(self)
    }

    pub fn enter_timeout(&self, timeout: Duration) -> Wait<MonitorGuard<'_>> {
        self.acquire_timeout(timeout).map(|()| MonitorGuard::new(self))
    }

    /// Runs `f` with the monitor held.
    pub fn synchronized<R>(&self, f: impl FnOnce() -> R) -> R {
        let _held = self.enter();
        f()
    }

    /// Hold depth of the current owner, zero when free.
    pub fn hold_depth(&self) -> usize {
        self.lock_state().depth
    }

    pub fn is_held(&self) -> bool {
        self.lock_state().owner.is_some()
    }

    pub fn is_held_by_current(&self) -> bool {
        self.lock_state().owner == Some(OwnerId::current())
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.lock_state().owner
    }
}

/// One level of monitor ownership. Not `Send`: it must be released by the context that acquired it.
#[must_use = "the monitor is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct MonitorGuard<'a> {
    monitor: &'a Monitor,
    _not_send: PhantomData<*const ()>,
}

impl<'a> MonitorGuard<'a> {
    fn new(monitor: &'a Monitor) -> Self {
        Self {
            monitor,
            _not_send: PhantomData,
        }
    }
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        // Only reachable if the holder also released by hand.
        if let Err(err) = self.monitor.release() {
            warn!(%err, "monitor guard dropped after manual release");
        }
    }
}
