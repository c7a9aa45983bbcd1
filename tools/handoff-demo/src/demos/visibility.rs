//!
//! Publishing writes through a flag.
//!
//! The writer stores three related fields with relaxed stores and then
//! sets a `VisibilityFlag`. The reader busy-waits for the flag; having seen
//! it, it must see all three fields of that round. A second flag carries
//! the acknowledgement back, so each flag has one setter and one clearer.
//!
//! The second half publishes the same fields as one `Values` snapshot
//! through `Synchronized`, read concurrently while the writer replaces it.
//! A reader never sees fields from two different rounds.
//!

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use handoff_core::WaitPolicy;
use handoff_sync::{Synchronized, VisibilityFlag};
use handoff_tasks::{OsThreads, Spawner};
use tracing::{debug, info, warn};

use crate::config::VisibilityConfig;
use crate::errors::DemoError;
use crate::report::Report;

const HANDOFF_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Values {
    pub a: u64,
    pub b: u64,
    pub c: u64,
}

impl Values {
    pub fn for_round(round: u64) -> Self {
        Self {
            a: round,
            b: round * 2,
            c: round * 3,
        }
    }

    /// True when all three fields come from the same round.
    pub fn is_consistent(&self) -> bool {
        self.b == self.a * 2 && self.c == self.a * 3
    }
}

#[derive(Debug, Default)]
struct Mailbox {
    a: AtomicU64,
    b: AtomicU64,
    c: AtomicU64,
    ready: VisibilityFlag,
    consumed: VisibilityFlag,
}

impl Mailbox {
    fn write(&self, values: Values) {
        self.a.store(values.a, Ordering::Relaxed);
        self.b.store(values.b, Ordering::Relaxed);
        self.c.store(values.c, Ordering::Relaxed);
    }

    fn read(&self) -> Values {
        Values {
            a: self.a.load(Ordering::Relaxed),
            b: self.b.load(Ordering::Relaxed),
            c: self.c.load(Ordering::Relaxed),
        }
    }
}

pub fn run(config: &VisibilityConfig, policy: WaitPolicy) -> Result<Report, DemoError> {
    config.check()?;
    info!(rounds = config.rounds, "visibility demo");
    let threads = OsThreads::new("visibility").with_policy(policy);

    let stale_reads = flag_handoff(&threads, config.rounds, policy)?;
    debug!(stale_reads, "flag handoff done");
    let (snapshots, torn_snapshots) = snapshot_handoff(&threads, config.rounds)?;
    debug!(snapshots, torn_snapshots, "snapshot handoff done");

    Ok(Report::new("visibility")
        .fact("rounds", config.rounds)
        .fact("stale_reads", stale_reads)
        .fact("snapshots_read", snapshots)
        .fact("torn_snapshots", torn_snapshots)
        .check(stale_reads == 0 && torn_snapshots == 0))
}

/// Returns how many rounds the reader saw something other than that round's values.
fn flag_handoff(threads: &OsThreads, rounds: u64, policy: WaitPolicy) -> Result<u64, DemoError> {
    let mailbox = Arc::new(Mailbox::default());

    let writer = {
        let mailbox = Arc::clone(&mailbox);
        threads.spawn(move || {
            for round in 1..=rounds {
                mailbox.write(Values::for_round(round));
                mailbox.ready.set();
                if !mailbox.consumed.busy_wait_timeout(&policy, HANDOFF_TIMEOUT).is_ready() {
                    warn!(round, "reader never acknowledged");
                    return false;
                }
                mailbox.consumed.test_and_clear();
            }
            true
        })
    };

    let mut stale = 0;
    for round in 1..=rounds {
        if !mailbox.ready.busy_wait_timeout(&policy, HANDOFF_TIMEOUT).is_ready() {
            return Err(DemoError::failed(
                "visibility",
                format!("round {round} was never published"),
            ));
        }
        mailbox.ready.test_and_clear();
        if mailbox.read() != Values::for_round(round) {
            stale += 1;
        }
        mailbox.consumed.set();
    }

    if !writer.join()? {
        return Err(DemoError::failed("visibility", "writer gave up waiting"));
    }
    Ok(stale)
}

/// Returns the number of snapshots read and how many of them were torn.
fn snapshot_handoff(threads: &OsThreads, rounds: u64) -> Result<(u64, u64), DemoError> {
    let cell = Arc::new(Synchronized::new(Values::default()));
    let finished = Arc::new(VisibilityFlag::new());

    let writer = {
        let cell = Arc::clone(&cell);
        let finished = Arc::clone(&finished);
        threads.spawn(move || {
            let mut outcome = Ok(());
            for round in 1..=rounds {
                outcome = cell.set(Values::for_round(round));
                if outcome.is_err() {
                    break;
                }
            }
            finished.set();
            outcome
        })
    };

    let mut read = 0;
    let mut torn = 0;
    loop {
        let done = finished.is_set();
        let snapshot = cell.get()?;
        read += 1;
        if !snapshot.is_consistent() {
            torn += 1;
        }
        if done {
            break;
        }
    }

    writer.join()??;
    Ok((read, torn))
}
