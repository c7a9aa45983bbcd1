//!
//! Reentrant acquisition.
//!
//! `increment_and_get` holds the counter's monitor and calls `increment`,
//! which acquires it again. The nested acquisition succeeds and only the
//! outermost release frees the monitor. A release with nothing held, or
//! one from a context that does not own the monitor, is refused.
//!

use std::sync::Arc;

use handoff_core::SyncError;
use handoff_sync::SharedCounter;
use handoff_tasks::{OsThreads, Spawner};
use tracing::info;

use crate::errors::DemoError;
use crate::report::Report;

pub fn run() -> Result<Report, DemoError> {
    info!("reentrant demo");
    let counter = Arc::new(SharedCounter::new(0));

    let values: Vec<i64> = (0..3).map(|_| counter.increment_and_get()).collect();

    let monitor = counter.monitor();
    let (inner_depth, held_after_inner) = {
        let _outer = monitor.enter();
        let inner_depth = {
            let _inner = monitor.enter();
            monitor.hold_depth()
        };
        (inner_depth, monitor.is_held_by_current())
    };
    let released = !monitor.is_held();

    let extra_release = refusal(monitor.release());

    monitor.acquire();
    let foreign_release = {
        let counter = Arc::clone(&counter);
        OsThreads::new("intruder")
            .spawn(move || counter.monitor().release())
            .join()?
    };
    let still_owned = monitor.is_held_by_current();
    monitor.release()?;
    let foreign_release = refusal(foreign_release);

    let passed = values == [1, 2, 3]
        && inner_depth == 2
        && held_after_inner
        && released
        && still_owned
        && extra_release.is_some()
        && foreign_release.is_some();

    Ok(Report::new("reentrant")
        .fact("increment_and_get", values)
        .fact("nested_depth", inner_depth)
        .fact("held_after_inner_release", held_after_inner)
        .fact("free_after_outer_release", released)
        .fact("extra_release", describe(extra_release))
        .fact("foreign_release", describe(foreign_release))
        .check(passed))
}

/// The error message if `outcome` was the expected misuse refusal.
fn refusal(outcome: Result<(), SyncError>) -> Option<String> {
    match outcome {
        Err(err @ SyncError::IllegalUse { .. }) => Some(err.to_string()),
        _ => None,
    }
}

fn describe(refused: Option<String>) -> String {
    refused.unwrap_or_else(|| "accepted".to_string())
}
