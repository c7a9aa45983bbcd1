//!
//! Lost updates.
//!
//! Several workers hammer two counters with the same number of increments.
//! The unguarded counter reads and writes in two separate steps, so
//! concurrent increments overwrite each other. The `SharedCounter` does
//! the same split read/write under its monitor and never loses one.
//!

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use handoff_core::WaitPolicy;
use handoff_sync::{poll_until, SharedCounter, VisibilityFlag};
use handoff_tasks::{OsThreads, Spawner, TaskHandle};
use tracing::{debug, info, warn};

use crate::config::RaceConfig;
use crate::errors::DemoError;
use crate::report::Report;

/// A counter whose increment is a separate load and store.
#[derive(Debug, Default)]
pub struct UnguardedCounter {
    value: AtomicU64,
}

impl UnguardedCounter {
    pub fn increment(&self) {
        let current = self.value.load(Ordering::Relaxed);
        self.value.store(current + 1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

pub fn run(config: &RaceConfig, policy: WaitPolicy) -> Result<Report, DemoError> {
    config.check()?;
    let expected = config
        .total_increments()
        .ok_or_else(|| DemoError::failed("race", "increment total overflows"))?;
    info!(workers = config.workers, increments = config.increments, "race demo");
    let threads = OsThreads::new("race").with_policy(policy);

    let unguarded = Arc::new(UnguardedCounter::default());
    let started = Instant::now();
    hammer(&threads, config, policy, {
        let unguarded = Arc::clone(&unguarded);
        move || unguarded.increment()
    })?;
    let unguarded_ms = started.elapsed().as_millis() as u64;
    let unguarded_total = unguarded.get();
    debug!(total = unguarded_total, "unguarded phase done");

    let guarded = Arc::new(SharedCounter::new(0));
    let started = Instant::now();
    hammer(&threads, config, policy, {
        let guarded = Arc::clone(&guarded);
        move || guarded.increment()
    })?;
    let guarded_ms = started.elapsed().as_millis() as u64;
    let guarded_total = u64::try_from(guarded.get())
        .map_err(|_| DemoError::failed("race", "guarded counter went negative"))?;
    debug!(total = guarded_total, "guarded phase done");

    Ok(Report::new("race")
        .fact("workers", config.workers)
        .fact("increments_per_worker", config.increments)
        .fact("expected", expected)
        .fact("unguarded_total", unguarded_total)
        .fact("lost_updates", expected.saturating_sub(unguarded_total))
        .fact("unguarded_ms", unguarded_ms)
        .fact("guarded_total", guarded_total)
        .fact("guarded_ms", guarded_ms)
        .check(guarded_total == expected))
}

/// Holds the racers until every one of them is running.
#[derive(Debug, Default)]
struct StartLine {
    ready: AtomicUsize,
    go: VisibilityFlag,
    abort: VisibilityFlag,
}

/// Runs `increment` `config.increments` times on each of `config.workers` tasks.
///
/// No racer starts before all of them have checked in. A task that ends
/// before checking in could not be spawned; the others are then released
/// without incrementing and its failure is returned.
fn hammer<S, F>(
    spawner: &S,
    config: &RaceConfig,
    policy: WaitPolicy,
    increment: F,
) -> Result<(), DemoError>
where
    S: Spawner,
    F: Fn() + Clone + Send + 'static,
{
    let line = Arc::new(StartLine::default());
    let handles: Vec<_> = (0..config.workers)
        .map(|_| {
            let line = Arc::clone(&line);
            let increment = increment.clone();
            let increments = config.increments;
            spawner.spawn(move || {
                line.ready.fetch_add(1, Ordering::AcqRel);
                let released = line
                    .go
                    .busy_wait_until_set(&policy, || line.abort.is_set());
                if released.is_ready() {
                    for _ in 0..increments {
                        increment();
                    }
                }
            })
        })
        .collect();

    let all_ready = poll_until(
        &policy,
        || line.ready.load(Ordering::Acquire) == config.workers,
        || handles.iter().any(TaskHandle::is_finished),
    );
    if all_ready.is_ready() {
        line.go.set();
    } else {
        warn!("a racer never started, aborting the race");
        line.abort.set();
    }

    for handle in handles {
        handle.join()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unguarded_counter_single_thread() {
        let counter = UnguardedCounter::default();
        for _ in 0..10 {
            counter.increment();
        }
        assert_eq!(counter.get(), 10);
    }

    /// Refuses one spawn by handing out a task that dies before checking in.
    struct RefusingSpawner {
        inner: OsThreads,
        refuse_at: usize,
        spawned: AtomicUsize,
    }

    impl Spawner for RefusingSpawner {
        fn spawn<F, T>(&self, task: F) -> TaskHandle<T>
        where
            F: FnOnce() -> T + Send + 'static,
            T: Send + 'static,
        {
            if self.spawned.fetch_add(1, Ordering::SeqCst) == self.refuse_at {
                drop(task);
                return self.inner.spawn(|| -> T { panic!("no thread available") });
            }
            self.inner.spawn(task)
        }
    }

    #[test]
    fn test_refused_spawn_aborts_the_race() {
        let spawner = RefusingSpawner {
            inner: OsThreads::new("racer"),
            refuse_at: 1,
            spawned: AtomicUsize::new(0),
        };
        let config = RaceConfig {
            workers: 4,
            increments: 1_000,
        };
        let counter = Arc::new(AtomicU64::new(0));

        let outcome = hammer(&spawner, &config, WaitPolicy::default(), {
            let counter = Arc::clone(&counter);
            move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });

        let err = outcome.unwrap_err();
        assert!(err.to_string().contains("no thread available"), "{err}");
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_overflowing_total_is_rejected() {
        let config = RaceConfig {
            workers: 3,
            increments: i64::MAX as u64,
        };
        let err = run(&config, WaitPolicy::default()).unwrap_err();
        assert!(matches!(err, DemoError::InvalidConfig(_)));
    }

    #[test]
    fn test_guarded_total_is_exact() {
        let config = RaceConfig {
            workers: 4,
            increments: 20_000,
        };
        let report = run(&config, WaitPolicy::default()).unwrap();

        assert!(report.passed);
        assert_eq!(report.get("expected"), Some(&80_000u64.into()));
        assert_eq!(report.get("guarded_total"), Some(&80_000u64.into()));
        let unguarded = report.get("unguarded_total").and_then(|v| v.as_u64()).unwrap();
        assert!(unguarded <= 80_000);
    }
}
