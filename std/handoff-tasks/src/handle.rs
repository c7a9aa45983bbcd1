//!
//! Task handles.
//!
//! Every spawned unit of work gets a private single-slot exchanger. The
//! context running the task is its only producer and puts exactly one
//! value: the task's result, or the message of the panic that ended it.
//! The handle is the only consumer.
//!

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use handoff_core::{panic_message, SyncError, Wait, WaitPolicy};
use handoff_sync::SingleSlotExchanger;
use tracing::warn;

type Outcome<T> = Result<T, String>;

pub struct TaskHandle<T> {
    name: String,
    result: Arc<SingleSlotExchanger<Outcome<T>>>,
    joined: bool,
}

/// The producer half of a handle, moved into the running task.
pub(crate) struct Completer<T> {
    result: Arc<SingleSlotExchanger<Outcome<T>>>,
}

pub(crate) fn task_pair<T>(name: String, policy: WaitPolicy) -> (TaskHandle<T>, Completer<T>) {
    let result = Arc::new(SingleSlotExchanger::with_policy(policy));
    let completer = Completer {
        result: Arc::clone(&result),
    };
    let handle = TaskHandle {
        name,
        result,
        joined: false,
    };
    (handle, completer)
}

impl<T> Completer<T> {
    /// Runs the task, capturing a panic instead of letting it unwind the worker.
    pub(crate) fn run(self, task: impl FnOnce() -> T) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(task))
            .map_err(|payload| format!("panicked: {}", panic_message(payload.as_ref())));
        self.deliver(outcome);
    }

    /// Two producer halves for the same slot. Only one of them may deliver.
    pub(crate) fn split(self) -> (Self, Self) {
        let other = Completer {
            result: Arc::clone(&self.result),
        };
        (other, self)
    }

    pub(crate) fn fail(self, reason: String) {
        self.deliver(Err(reason));
    }

    fn deliver(self, outcome: Outcome<T>) {
        if let Err(err) = self.result.put(outcome) {
            warn!(%err, "task result could not be delivered");
        }
    }
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the result is waiting to be joined.
    pub fn is_finished(&self) -> bool {
        self.result.is_occupied()
    }

    /// Waits for the task and returns its value.
    pub fn join(self) -> Result<T, SyncError> {
        if self.joined {
            return Err(self.already_joined("TaskHandle::join"));
        }
        let outcome = self.result.take()?;
        self.unpack(outcome)
    }

    /// Waits up to `timeout`. After a ready result the handle is spent.
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<Wait<T>, SyncError> {
        if self.joined {
            return Err(self.already_joined("TaskHandle::join_timeout"));
        }
        match self.result.take_timeout(timeout)? {
            Wait::Ready(outcome) => {
                self.joined = true;
                self.unpack(outcome).map(Wait::Ready)
            }
            Wait::TimedOut => Ok(Wait::TimedOut),
            Wait::Cancelled => Ok(Wait::Cancelled),
        }
    }

    fn unpack(&self, outcome: Outcome<T>) -> Result<T, SyncError> {
        outcome.map_err(|reason| SyncError::work_failed(self.name.clone(), reason))
    }

    fn already_joined(&self, operation: &'static str) -> SyncError {
        SyncError::illegal_use(operation, format!("result of '{}' was already taken", self.name))
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .field("joined", &self.joined)
            .finish()
    }
}
