//!
//! Error types shared by every handoff primitive.
//!
//! `SyncError` covers the failures that propagate to the immediate caller:
//! misuse of a primitive, a broken single-producer/single-consumer contract,
//! and failures raised by user work that must be surfaced to whoever waits
//! on it. Timeouts and cancellations are `Wait` outcomes, not errors.
//!

use std::fmt;
use thiserror::Error;

/// The two roles of a single-slot exchanger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Illegal use of {operation}: {reason}")]
    IllegalUse {
        operation: &'static str,
        reason: String,
    },

    #[error("Protocol violation by {role}: {reason}")]
    ProtocolViolation { role: Role, reason: String },

    #[error("Work failed in '{worker}': {reason}")]
    WorkFailed { worker: String, reason: String },
}

impl SyncError {
    pub fn illegal_use(operation: &'static str, reason: impl Into<String>) -> Self {
        SyncError::IllegalUse {
            operation,
            reason: reason.into(),
        }
    }

    pub fn protocol_violation(role: Role, reason: impl Into<String>) -> Self {
        SyncError::ProtocolViolation {
            role,
            reason: reason.into(),
        }
    }

    pub fn work_failed(worker: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::WorkFailed {
            worker: worker.into(),
            reason: reason.into(),
        }
    }

    /// Misuse of a primitive. The caller has a bug; retrying cannot help.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            SyncError::IllegalUse { .. } | SyncError::ProtocolViolation { .. }
        )
    }
}

/// Renders a caught panic payload the way the standard panic hook would.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
