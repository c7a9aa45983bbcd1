//!
//! Identity of an execution context.
//!
//! Monitors record which context owns them so the same context can
//! re-acquire without deadlocking, and exchangers record which context
//! produced the pending value. Ids are handed out lazily per OS thread
//! from a global counter and are never reused within a process.
//!

use std::cell::Cell;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<Option<OwnerId>> = const { Cell::new(None) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(NonZeroU64);

impl OwnerId {
    /// The id of the calling execution context.
    pub fn current() -> Self {
        CURRENT.with(|current| match current.get() {
            Some(id) => id,
            None => {
                let id = OwnerId::allocate();
                current.set(Some(id));
                id
            }
        })
    }

    pub fn as_u64(self) -> u64 {
        self.0.get()
    }

    /// Inverse of `as_u64`; zero is reserved for "no owner".
    pub fn from_u64(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(OwnerId)
    }

    fn allocate() -> Self {
        Self::allocate_from(&NEXT_OWNER_ID)
    }

    /// Next id from `counter`, skipping zero if the counter ever wraps.
    fn allocate_from(counter: &AtomicU64) -> Self {
        loop {
            let raw = counter.fetch_add(1, Ordering::Relaxed);
            if let Some(raw) = NonZeroU64::new(raw) {
                return OwnerId(raw);
            }
        }
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_current_is_stable_per_thread() {
        let a = OwnerId::current();
        let b = OwnerId::current();
        assert_eq!(a, b);
    }

    #[test]
    fn test_threads_get_distinct_ids() {
        let here = OwnerId::current();
        let there = thread::spawn(OwnerId::current).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_allocation_skips_zero_on_wrap() {
        let counter = AtomicU64::new(u64::MAX);
        assert_eq!(OwnerId::allocate_from(&counter).as_u64(), u64::MAX);
        assert_eq!(OwnerId::allocate_from(&counter).as_u64(), 1);
        assert_eq!(OwnerId::allocate_from(&counter).as_u64(), 2);
    }

    #[test]
    fn test_raw_round_trip() {
        let id = OwnerId::current();
        assert_eq!(OwnerId::from_u64(id.as_u64()), Some(id));
        assert_eq!(OwnerId::from_u64(0), None);
        assert!(id.to_string().starts_with("ctx#"));
    }
}
