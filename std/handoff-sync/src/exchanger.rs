//!
//! Single-Slot Exchanger
//!
//! Hands values of type `T` from one producer to one consumer, one at a
//! time. The slot never holds more than one unclaimed value:
//! `stored - taken` is always 0 or 1.
//!
//! ## Publication order
//!
//! `put` writes the slot and bumps `stored` inside the monitor, releases
//! the monitor, and only then sets the occupancy flag. `take` waits for
//! the flag before entering the monitor to claim the value. A consumer
//! that sees the flag therefore sees the value and the counter behind it.
//!
//! ```text
//!  producer                          consumer
//!  ────────                          ────────
//!  enter monitor                     busy-wait: occupied?
//!    slot = value                          │
//!    stored += 1                           │
//!  leave monitor                           │
//!  occupied.set()  ──── release ───▶ observes flag (acquire)
//!                                    enter monitor
//!                                      value = slot.take()
//!                                      taken += 1
//!                                      occupied.test_and_clear()
//!                                    leave monitor
//! ```
//!
//! ## Roles
//!
//! Exactly one producer role and one consumer role may be active. A put
//! from a different producer while a value is pending, or a take while
//! another take is in flight, fails with `SyncError::ProtocolViolation`.
//! Detection is best effort; it never corrupts the slot.
//!

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use handoff_core::{OwnerId, Role, SyncError, Wait, WaitPolicy};
use tracing::{trace, warn};

use crate::flag::{poll_until, VisibilityFlag};
use crate::monitor::Monitor;

const NO_OWNER: u64 = 0;

pub struct SingleSlotExchanger<T> {
    monitor: Monitor,
    slot: UnsafeCell<Option<T>>,
    stored: AtomicU64,
    taken: AtomicU64,
    occupied: VisibilityFlag,
    producer: AtomicU64,
    consumer: AtomicU64,
    policy: WaitPolicy,
}

// SAFETY: `slot` is only read or written with the monitor held, and no
// reference into it outlives that critical section.
unsafe impl<T: Send> Sync for SingleSlotExchanger<T> {}

impl<T> Default for SingleSlotExchanger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleSlotExchanger<T> {
    pub fn new() -> Self {
        Self::with_policy(WaitPolicy::default())
    }

    pub fn with_policy(policy: WaitPolicy) -> Self {
        Self {
            monitor: Monitor::new(),
            slot: UnsafeCell::new(None),
            stored: AtomicU64::new(0),
            taken: AtomicU64::new(0),
            occupied: VisibilityFlag::new(),
            producer: AtomicU64::new(NO_OWNER),
            consumer: AtomicU64::new(NO_OWNER),
            policy,
        }
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Stores `value`, blocking while this producer's previous value is unclaimed.
    pub fn put(&self, value: T) -> Result<(), SyncError> {
        let me = OwnerId::current();
        loop {
            let held = self.monitor.enter();
            let stored = self.stored.load(Ordering::Relaxed);
            if stored == self.taken.load(Ordering::Relaxed) {
                // SAFETY: monitor held.
                unsafe { *self.slot.get() = Some(value) };
                self.stored.store(stored + 1, Ordering::Relaxed);
                self.producer.store(me.as_u64(), Ordering::Relaxed);
                drop(held);

                self.occupied.set();
                trace!(stored = stored + 1, "value stored");
                return Ok(());
            }

            let occupant = self.producer.load(Ordering::Relaxed);
            drop(held);

            if occupant != me.as_u64() {
                warn!(%me, occupant, "second producer rejected");
                return Err(SyncError::protocol_violation(
                    Role::Producer,
                    format!(
                        "slot holds an unclaimed value from ctx#{occupant}; put from {me} rejected"
                    ),
                ));
            }

            // Our own previous value is pending; wait for the consumer to claim it.
            let claimed = poll_until(
                &self.policy,
                || self.taken.load(Ordering::Relaxed) >= stored,
                || false,
            );
            debug_assert!(claimed.is_ready());
        }
    }

    /// Waits as long as it takes for the next value.
    pub fn take(&self) -> Result<T, SyncError> {
        loop {
            if let Wait::Ready(value) = self.take_until(|| false)? {
                return Ok(value);
            }
        }
    }

    /// Waits for the next value until `timeout` elapses.
    pub fn take_timeout(&self, timeout: Duration) -> Result<Wait<T>, SyncError> {
        self.take_with(|flag, policy| flag.busy_wait_timeout(policy, timeout))
    }

    /// Waits for the next value until `cancelled` returns true.
    pub fn take_until(&self, cancelled: impl FnMut() -> bool) -> Result<Wait<T>, SyncError> {
        self.take_with(|flag, policy| flag.busy_wait_until_set(policy, cancelled))
    }

    /// Claims a pending value without waiting.
    pub fn try_take(&self) -> Result<Option<T>, SyncError> {
        let claimed = self.take_with(|flag, _| {
            if flag.is_set() {
                Wait::Ready(())
            } else {
                Wait::Cancelled
            }
        })?;
        Ok(claimed.ready())
    }

    fn take_with(
        &self,
        wait_for_value: impl FnOnce(&VisibilityFlag, &WaitPolicy) -> Wait,
    ) -> Result<Wait<T>, SyncError> {
        let me = OwnerId::current();
        if let Err(other) = self.consumer.compare_exchange(
            NO_OWNER,
            me.as_u64(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            warn!(%me, other, "second consumer rejected");
            return Err(SyncError::protocol_violation(
                Role::Consumer,
                format!("a take by ctx#{other} is already in flight; take from {me} rejected"),
            ));
        }
        let _in_flight = ConsumerSeat(&self.consumer);

        match wait_for_value(&self.occupied, &self.policy) {
            Wait::Ready(()) => {}
            Wait::TimedOut => return Ok(Wait::TimedOut),
            Wait::Cancelled => return Ok(Wait::Cancelled),
        }

        let held = self.monitor.enter();
        // SAFETY: monitor held.
        let value = unsafe { (*self.slot.get()).take() };
        let Some(value) = value else {
            drop(held);
            return Err(SyncError::protocol_violation(
                Role::Consumer,
                "occupancy flag was set but the slot was empty",
            ));
        };
        let taken = self.taken.load(Ordering::Relaxed) + 1;
        self.taken.store(taken, Ordering::Relaxed);
        let cleared = self.occupied.test_and_clear();
        drop(held);

        debug_assert!(cleared, "only the consumer clears the occupancy flag");
        trace!(taken, "value taken");
        Ok(Wait::Ready(value))
    }

    /// Number of values ever stored.
    pub fn stored_count(&self) -> u64 {
        let _held = self.monitor.enter();
        self.stored.load(Ordering::Relaxed)
    }

    /// Number of values ever taken.
    pub fn taken_count(&self) -> u64 {
        let _held = self.monitor.enter();
        self.taken.load(Ordering::Relaxed)
    }

    /// Stored but not yet taken: 0 or 1.
    pub fn pending(&self) -> u64 {
        let _held = self.monitor.enter();
        self.stored.load(Ordering::Relaxed) - self.taken.load(Ordering::Relaxed)
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied.is_set()
    }
}

impl<T> fmt::Debug for SingleSlotExchanger<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleSlotExchanger")
            .field("stored", &self.stored.load(Ordering::Relaxed))
            .field("taken", &self.taken.load(Ordering::Relaxed))
            .field("occupied", &self.occupied.is_set())
            .finish_non_exhaustive()
    }
}

/// Marks a take in flight; frees the consumer seat however the take ends.
struct ConsumerSeat<'a>(&'a AtomicU64);

impl Drop for ConsumerSeat<'_> {
    fn drop(&mut self) {
        self.0.store(NO_OWNER, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_put_then_take() {
        let exchanger = SingleSlotExchanger::new();
        exchanger.put("frame").unwrap();
        assert!(exchanger.is_occupied());
        assert_eq!(exchanger.pending(), 1);

        assert_eq!(exchanger.take().unwrap(), "frame");
        assert!(!exchanger.is_occupied());
        assert_eq!(exchanger.pending(), 0);
        assert_eq!(exchanger.stored_count(), 1);
        assert_eq!(exchanger.taken_count(), 1);
    }

    #[test]
    fn test_take_waits_for_put() {
        let exchanger = Arc::new(SingleSlotExchanger::new());
        let producer = {
            let exchanger = Arc::clone(&exchanger);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                exchanger.put(99u32).unwrap();
            })
        };

        assert_eq!(exchanger.take().unwrap(), 99);
        producer.join().unwrap();
    }

    #[test]
    fn test_producer_blocks_until_taken() {
        let exchanger = Arc::new(SingleSlotExchanger::new());
        let producer = {
            let exchanger = Arc::clone(&exchanger);
            thread::spawn(move || {
                exchanger.put(1).unwrap();
                exchanger.put(2).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(exchanger.pending(), 1, "second put must not overwrite the first");
        assert_eq!(exchanger.take().unwrap(), 1);
        assert_eq!(exchanger.take().unwrap(), 2);
        producer.join().unwrap();
        assert_eq!(exchanger.stored_count(), 2);
    }

    #[test]
    fn test_second_producer_rejected() {
        let exchanger = Arc::new(SingleSlotExchanger::new());
        exchanger.put(1).unwrap();

        let intruder = {
            let exchanger = Arc::clone(&exchanger);
            thread::spawn(move || (OwnerId::current(), exchanger.put(2)))
        };
        let (intruder_id, outcome) = intruder.join().unwrap();
        let err = outcome.unwrap_err();
        assert!(matches!(err, SyncError::ProtocolViolation { role: Role::Producer, .. }));

        // Longest id first, so "ctx#1" never rewrites part of "ctx#12".
        let mut ids = [
            (OwnerId::current().to_string(), "<holder>"),
            (intruder_id.to_string(), "<intruder>"),
        ];
        ids.sort_by_key(|(id, _)| std::cmp::Reverse(id.len()));
        let message = ids
            .iter()
            .fold(err.to_string(), |message, (id, label)| message.replace(id, label));
        insta::assert_snapshot!(
            message,
            @"Protocol violation by producer: slot holds an unclaimed value from <holder>; put from <intruder> rejected"
        );

        assert_eq!(exchanger.take().unwrap(), 1);
        assert_eq!(exchanger.pending(), 0);
    }

    #[test]
    fn test_producer_may_change_once_slot_is_empty() {
        let exchanger = Arc::new(SingleSlotExchanger::new());
        exchanger.put(1).unwrap();
        assert_eq!(exchanger.take().unwrap(), 1);

        let other = Arc::clone(&exchanger);
        thread::spawn(move || other.put(2)).join().unwrap().unwrap();
        assert_eq!(exchanger.take().unwrap(), 2);
    }

    #[test]
    fn test_second_consumer_rejected() {
        let exchanger = Arc::new(SingleSlotExchanger::<u8>::new());
        let waiting = {
            let exchanger = Arc::clone(&exchanger);
            thread::spawn(move || exchanger.take_timeout(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(50));
        let err = exchanger.try_take().unwrap_err();
        assert!(matches!(err, SyncError::ProtocolViolation { role: Role::Consumer, .. }));

        exchanger.put(7).unwrap();
        assert_eq!(waiting.join().unwrap().unwrap(), Wait::Ready(7));
    }

    #[test]
    fn test_take_timeout_on_empty_slot() {
        let exchanger = SingleSlotExchanger::<u8>::new();
        let started = Instant::now();
        let outcome = exchanger.take_timeout(Duration::from_millis(30)).unwrap();
        assert_eq!(outcome, Wait::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(30));

        // The consumer seat was given back.
        assert_eq!(exchanger.try_take().unwrap(), None);
    }

    #[test]
    fn test_take_until_cancelled() {
        let exchanger = SingleSlotExchanger::<u8>::new();
        let mut polls = 0;
        let outcome = exchanger
            .take_until(|| {
                polls += 1;
                polls >= 3
            })
            .unwrap();
        assert_eq!(outcome, Wait::Cancelled);
        assert_eq!(exchanger.taken_count(), 0);
    }

    #[test]
    fn test_try_take() {
        let exchanger = SingleSlotExchanger::new();
        assert_eq!(exchanger.try_take().unwrap(), None);
        exchanger.put(String::from("x")).unwrap();
        assert_eq!(exchanger.try_take().unwrap().as_deref(), Some("x"));
        assert_eq!(exchanger.try_take().unwrap(), None);
    }

    #[test]
    fn test_pending_value_dropped_with_exchanger() {
        let marker = Arc::new(());
        let exchanger = SingleSlotExchanger::new();
        exchanger.put(Arc::clone(&marker)).unwrap();
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(exchanger);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
