//!
//! Outcomes of a blocking operation that may give up.
//!
//! A bounded wait that expires and a busy-wait that is asked to stop are
//! both expected results, so they are values the caller inspects rather
//! than errors. Nothing in handoff retries on the caller's behalf.
//!

#[must_use = "a wait may have timed out or been cancelled"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wait<T = ()> {
    /// The awaited condition became true.
    Ready(T),
    /// The deadline passed first.
    TimedOut,
    /// The cancellation condition fired first.
    Cancelled,
}

impl<T> Wait<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Wait::Ready(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Wait::TimedOut)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Wait::Cancelled)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Wait::Ready(value) => Some(value),
            Wait::TimedOut | Wait::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Wait<U> {
        match self {
            Wait::Ready(value) => Wait::Ready(f(value)),
            Wait::TimedOut => Wait::TimedOut,
            Wait::Cancelled => Wait::Cancelled,
        }
    }
}
