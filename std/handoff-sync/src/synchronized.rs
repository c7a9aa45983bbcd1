//!
//! Monitor-guarded value cell.
//!
//! Publishes a value (typically a multi-field snapshot) so that readers
//! always see one complete `set`, never a mix of two. Access is closed
//! over the monitor: no reference to the value escapes a call.
//!
//! The monitor is reentrant but the value is not. A call made from inside
//! another access to the same cell (from an `update` closure, or a
//! `Clone` impl reached through `get`) is rejected with
//! `SyncError::IllegalUse` instead of aliasing the value.
//!

use std::cell::UnsafeCell;
use std::fmt;

use handoff_core::SyncError;

use crate::monitor::{Monitor, MonitorGuard};

pub struct Synchronized<T> {
    monitor: Monitor,
    value: UnsafeCell<T>,
}

// SAFETY: the value is only reached while the monitor is held at depth one,
// so at most one context touches it at a time.
unsafe impl<T: Send> Sync for Synchronized<T> {}

impl<T> Synchronized<T> {
    pub const fn new(value: T) -> Self {
        Self {
            monitor: Monitor::new(),
            value: UnsafeCell::new(value),
        }
    }

    fn enter(&self, operation: &'static str) -> Result<MonitorGuard<'_>, SyncError> {
        let held = self.monitor.enter();
        if self.monitor.hold_depth() > 1 {
            return Err(SyncError::illegal_use(
                operation,
                "value is already being accessed by this context",
            ));
        }
        Ok(held)
    }

    /// Runs `f` on the value with the monitor held.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, SyncError> {
        let _held = self.enter("Synchronized::update")?;
        // SAFETY: depth-one ownership of the monitor is exclusive access.
        Ok(f(unsafe { &mut *self.value.get() }))
    }

    pub fn set(&self, value: T) -> Result<(), SyncError> {
        self.replace(value).map(drop)
    }

    pub fn replace(&self, value: T) -> Result<T, SyncError> {
        let _held = self.enter("Synchronized::replace")?;
        // SAFETY: as in `update`.
        Ok(std::mem::replace(unsafe { &mut *self.value.get() }, value))
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Clone> Synchronized<T> {
    pub fn get(&self) -> Result<T, SyncError> {
        let _held = self.enter("Synchronized::get")?;
        // SAFETY: as in `update`.
        Ok(unsafe { &*self.value.get() }.clone())
    }
}

impl<T: Default> Default for Synchronized<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Synchronized<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronized")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct Values {
        a: u64,
        b: u64,
        c: u64,
    }

    #[test]
    fn test_set_get_replace() {
        let cell = Synchronized::new(1);
        cell.set(2).unwrap();
        assert_eq!(cell.get().unwrap(), 2);
        assert_eq!(cell.replace(3).unwrap(), 2);
        let updated = cell
            .update(|v| {
                *v += 1;
                *v
            })
            .unwrap();
        assert_eq!(updated, 4);
        assert_eq!(cell.into_inner(), 4);
    }

    #[test]
    fn test_nested_access_is_illegal() {
        let cell = Synchronized::new(0);
        let nested = cell.update(|_| cell.get()).unwrap();
        let err = nested.unwrap_err();
        assert!(matches!(err, SyncError::IllegalUse { operation: "Synchronized::get", .. }));

        // The outer access released cleanly.
        assert_eq!(cell.get().unwrap(), 0);
    }

    #[test]
    fn test_snapshots_are_never_torn() {
        let cell = Arc::new(Synchronized::new(Values::default()));

        let writer = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                for i in 1..=5000u64 {
                    cell.set(Values {
                        a: i,
                        b: i * 2,
                        c: i * 3,
                    })
                    .unwrap();
                }
            })
        };

        let mut last = 0;
        while last < 5000 {
            let snapshot = cell.get().unwrap();
            assert_eq!(snapshot.b, snapshot.a * 2);
            assert_eq!(snapshot.c, snapshot.a * 3);
            assert!(snapshot.a >= last);
            last = snapshot.a;
        }

        writer.join().unwrap();
    }
}
