//!
//! Cooperatively Cancellable Worker
//!
//! Repeats a unit of work until a stop is requested. The stop request is
//! a monitor-guarded boolean checked between iterations, so cancellation
//! never interrupts an iteration in flight.
//!
//! ```text
//!   Created ──start──▶ Running ──request_stop──▶ StopRequested ──next poll──▶ Stopped
//!      │                  │                                                    ▲
//!      │                  └────────── work fails or panics ────────────────────┤
//!      └──── request_stop, then start ─────────────────────────────────────────┘
//! ```
//!
//! A failing iteration stops the worker immediately. The failure is
//! returned from `start` and also reported by `await_stopped`, so whoever
//! is waiting on the worker learns about it.
//!

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use handoff_core::{panic_message, SyncError, Wait, WaitPolicy};
use tracing::{debug, warn};

use crate::flag::VisibilityFlag;
use crate::monitor::Monitor;

/// Error type a unit of work may return.
pub type WorkError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Created,
    Running,
    StopRequested,
    Stopped,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            2 => WorkerState::StopRequested,
            _ => WorkerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Created => 0,
            WorkerState::Running => 1,
            WorkerState::StopRequested => 2,
            WorkerState::Stopped => 3,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Created => "created",
            WorkerState::Running => "running",
            WorkerState::StopRequested => "stop-requested",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

pub struct CancellableWorker {
    name: String,
    monitor: Monitor,
    stop_requested: AtomicBool,
    state: AtomicU8,
    iterations: AtomicU64,
    stopped: VisibilityFlag,
    failure: OnceLock<String>,
    policy: WaitPolicy,
}

impl CancellableWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_policy(name, WaitPolicy::default())
    }

    pub fn with_policy(name: impl Into<String>, policy: WaitPolicy) -> Self {
        Self {
            name: name.into(),
            monitor: Monitor::new(),
            stop_requested: AtomicBool::new(false),
            state: AtomicU8::new(WorkerState::Created.as_u8()),
            iterations: AtomicU64::new(0),
            stopped: VisibilityFlag::new(),
            failure: OnceLock::new(),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // Caller holds the monitor.
    fn load_state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    // Caller holds the monitor.
    fn store_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Runs `work` on the calling context until stop is requested.
    ///
    /// Returns the number of completed iterations, or the surfaced failure
    /// if an iteration returned an error or panicked.
    pub fn start<F>(&self, mut work: F) -> Result<u64, SyncError>
    where
        F: FnMut() -> Result<(), WorkError>,
    {
        {
            let held = self.monitor.enter();
            let state = self.load_state();
            if state != WorkerState::Created {
                return Err(SyncError::illegal_use(
                    "CancellableWorker::start",
                    format!("worker '{}' is already {}", self.name, state),
                ));
            }
            if self.stop_requested.load(Ordering::Relaxed) {
                drop(held);
                debug!(worker = %self.name, "stop requested before start");
                return self.finish(Ok(()));
            }
            self.store_state(WorkerState::Running);
        }
        debug!(worker = %self.name, "worker running");

        let outcome = loop {
            if self.is_stop_requested() {
                break Ok(());
            }
            match panic::catch_unwind(AssertUnwindSafe(|| work())) {
                Ok(Ok(())) => {
                    self.iterations.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(err)) => break Err(err.to_string()),
                Err(payload) => {
                    break Err(format!("panicked: {}", panic_message(payload.as_ref())));
                }
            }
        };

        self.finish(outcome)
    }

    fn finish(&self, outcome: Result<(), String>) -> Result<u64, SyncError> {
        if let Err(reason) = &outcome {
            warn!(worker = %self.name, %reason, "work failed, stopping worker");
            let _ = self.failure.set(reason.clone());
        }

        self.monitor.synchronized(|| self.store_state(WorkerState::Stopped));
        self.stopped.set();

        let iterations = self.iterations();
        debug!(worker = %self.name, iterations, "worker stopped");
        match outcome {
            Ok(()) => Ok(iterations),
            Err(reason) => Err(SyncError::work_failed(self.name.clone(), reason)),
        }
    }

    /// Asks the worker to stop after its current iteration. Idempotent.
    pub fn request_stop(&self) {
        let _held = self.monitor.enter();
        if !self.stop_requested.swap(true, Ordering::Relaxed) {
            debug!(worker = %self.name, "stop requested");
        }
        if self.load_state() == WorkerState::Running {
            self.store_state(WorkerState::StopRequested);
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        let _held = self.monitor.enter();
        self.stop_requested.load(Ordering::Relaxed)
    }

    /// Blocks until the worker has stopped or `timeout` elapses.
    ///
    /// `Ok(true)` once stopped cleanly, `Ok(false)` on timeout, and the
    /// worker's failure if its work failed.
    pub fn await_stopped(&self, timeout: Duration) -> Result<bool, SyncError> {
        match self.stopped.busy_wait_timeout(&self.policy, timeout) {
            Wait::Ready(()) => match self.failure.get() {
                Some(reason) => Err(SyncError::work_failed(self.name.clone(), reason.clone())),
                None => Ok(true),
            },
            Wait::TimedOut | Wait::Cancelled => Ok(false),
        }
    }

    pub fn state(&self) -> WorkerState {
        let _held = self.monitor.enter();
        self.load_state()
    }

    /// Iterations that completed successfully.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }
}

impl fmt::Debug for CancellableWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableWorker")
            .field("name", &self.name)
            .field("state", &WorkerState::from_u8(self.state.load(Ordering::Relaxed)))
            .field("iterations", &self.iterations())
            .finish_non_exhaustive()
    }
}
