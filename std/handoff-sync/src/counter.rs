//!
//! Monitor-guarded counter.
//!
//! Every read-modify-write happens with the monitor held, so no increment
//! is ever lost. The value lives in an atomic only so it can be touched
//! through `&self`; the loads and stores themselves are relaxed and split,
//! and it is the monitor that makes them atomic as a unit and orders them
//! between contexts.
//!

use std::sync::atomic::{AtomicI64, Ordering};

use crate::monitor::Monitor;

#[derive(Debug, Default)]
pub struct SharedCounter {
    monitor: Monitor,
    value: AtomicI64,
}

impl SharedCounter {
    pub const fn new(initial: i64) -> Self {
        Self {
            monitor: Monitor::new(),
            value: AtomicI64::new(initial),
        }
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn add(&self, delta: i64) {
        let _held = self.monitor.enter();
        let current = self.value.load(Ordering::Relaxed);
        self.value.store(current.wrapping_add(delta), Ordering::Relaxed);
    }

    /// Never reads without the monitor, so the result is never stale.
    pub fn get(&self) -> i64 {
        let _held = self.monitor.enter();
        self.value.load(Ordering::Relaxed)
    }

    /// Increments through a nested acquisition of the same monitor.
    pub fn increment_and_get(&self) -> i64 {
        let _held = self.monitor.enter();
        self.increment();
        self.value.load(Ordering::Relaxed)
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }
}
