//!
//! Lightweight tasks versus platform threads.
//!
//! The same small computation is run as many queued tasks on a `TaskPool`
//! and as far fewer tasks each on its own OS thread.
//!

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use handoff_core::WaitPolicy;
use handoff_tasks::{OsThreads, Spawner, TaskPool};
use tracing::{debug, info};

use crate::config::TasksConfig;
use crate::errors::DemoError;
use crate::report::Report;

const FACTORIAL_OF: u64 = 12;

pub fn factorial(n: u64) -> u64 {
    (1..=n).product()
}

pub fn run(config: &TasksConfig, policy: WaitPolicy) -> Result<Report, DemoError> {
    config.check()?;
    info!(tasks = config.tasks, threads = config.platform_threads, "tasks demo");
    let each = factorial(FACTORIAL_OF);

    let workers = config
        .pool_workers
        .unwrap_or_else(TaskPool::default_worker_count);
    let pool = TaskPool::with_policy(workers, policy)?;
    let total = Arc::new(AtomicU64::new(0));
    let started = Instant::now();
    for _ in 0..config.tasks {
        let total = Arc::clone(&total);
        pool.execute(move || {
            total.fetch_add(factorial(FACTORIAL_OF), Ordering::Relaxed);
        });
    }
    pool.wait_all();
    let lightweight_ms = started.elapsed().as_millis() as u64;
    let lightweight_total = total.load(Ordering::Relaxed);
    let pool_workers = pool.worker_count();
    drop(pool);
    debug!(lightweight_ms, "pool phase done");

    let threads = OsThreads::new("platform").with_policy(policy);
    let started = Instant::now();
    let handles: Vec<_> = (0..config.platform_threads)
        .map(|_| threads.spawn(|| factorial(FACTORIAL_OF)))
        .collect();
    let mut platform_total = 0u64;
    for handle in handles {
        platform_total += handle.join()?;
    }
    let platform_ms = started.elapsed().as_millis() as u64;
    debug!(platform_ms, "thread phase done");

    Ok(Report::new("tasks")
        .fact("factorial", format!("{FACTORIAL_OF}! = {each}"))
        .fact("pool_workers", pool_workers)
        .fact("lightweight_tasks", config.tasks)
        .fact("lightweight_total", lightweight_total)
        .fact("lightweight_ms", lightweight_ms)
        .fact("platform_threads", config.platform_threads)
        .fact("platform_total", platform_total)
        .fact("platform_ms", platform_ms)
        .check(lightweight_total == each * config.tasks)
        .check(platform_total == each * config.platform_threads))
}
