//!
//! Lightweight Task Pool
//!
//! Implements an M:N model where M lightweight tasks are multiplexed onto
//! N OS threads. Features:
//!
//! - Fixed worker count (defaults to CPU cores)
//! - Shared FIFO queue; idle workers sleep on a condition variable
//! - Tasks are boxed closures, so captured state travels with them
//! - A task that panics is reported through its handle; the worker survives
//!   (detached tasks from `execute` are only logged)
//! - Dropping the pool drains the queue, then joins every worker
//!

use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use handoff_core::{Wait, WaitPolicy};
use handoff_sync::{poll_until, poll_until_deadline};
use tracing::{debug, warn};

use crate::handle::{task_pair, TaskHandle};
use crate::Spawner;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// The queue shared by every worker
struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    available: Condvar,
    shutdown: AtomicBool,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn push(&self, job: Job) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.push_back(job);
        self.available.notify_one();
    }

    /// Next job; `None` once shut down and drained.
    fn pop(&self) -> Option<Job> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        while jobs.is_empty() && !self.shutdown.load(Ordering::SeqCst) {
            jobs = self
                .available
                .wait(jobs)
                .unwrap_or_else(PoisonError::into_inner);
        }
        jobs.pop_front()
    }

    fn shutdown(&self) {
        // Taking the lock orders the flag against a worker about to wait.
        let _jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        self.shutdown.store(true, Ordering::SeqCst);
        self.available.notify_all();
    }
}

pub struct TaskPool {
    queue: Arc<JobQueue>,
    workers: Vec<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
    next_id: AtomicU64,
    policy: WaitPolicy,
}

impl TaskPool {
    /// A pool with one worker per available CPU core.
    pub fn new() -> io::Result<Self> {
        Self::with_workers(Self::default_worker_count())
    }

    pub fn default_worker_count() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    pub fn with_workers(worker_count: usize) -> io::Result<Self> {
        Self::with_policy(worker_count, WaitPolicy::default())
    }

    pub fn with_policy(worker_count: usize, policy: WaitPolicy) -> io::Result<Self> {
        let worker_count = worker_count.max(1);
        let queue = Arc::new(JobQueue::new());
        let active = Arc::new(AtomicUsize::new(0));
        let mut pool = Self {
            queue,
            workers: Vec::with_capacity(worker_count),
            active,
            next_id: AtomicU64::new(1),
            policy,
        };

        for index in 0..worker_count {
            let queue = Arc::clone(&pool.queue);
            let active = Arc::clone(&pool.active);
            // On error the pool built so far is dropped, which joins the workers already started.
            let handle = thread::Builder::new()
                .name(format!("handoff-pool-{index}"))
                .spawn(move || worker_loop(queue, active))?;
            pool.workers.push(handle);
        }

        debug!(workers = worker_count, "task pool started");
        Ok(pool)
    }

    /// Queues a task whose result nobody waits for.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.queue.push(Box::new(job));
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Tasks queued or running.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until every queued task has finished.
    pub fn wait_all(&self) {
        let idle = poll_until(&self.policy, || self.active_count() == 0, || false);
        debug_assert!(idle.is_ready());
    }

    pub fn wait_all_timeout(&self, timeout: Duration) -> Wait {
        let deadline = Instant::now().checked_add(timeout);
        poll_until_deadline(&self.policy, || self.active_count() == 0, deadline)
    }
}

impl Spawner for TaskPool {
    fn spawn<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (handle, completer) = task_pair(format!("task-{id}"), self.policy);
        self.execute(move || completer.run(task));
        handle
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.queue.shutdown();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!("task pool shut down");
    }
}

fn worker_loop(queue: Arc<JobQueue>, active: Arc<AtomicUsize>) {
    while let Some(job) = queue.pop() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("detached task panicked");
        }
        active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn test_execute_basic() {
        let pool = TaskPool::with_workers(2).unwrap();
        let counter = Arc::new(AtomicI64::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.wait_all();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_spawn_with_closure() {
        let pool = TaskPool::with_workers(3).unwrap();

        let handles: Vec<_> = (1..=5i64).map(|i| pool.spawn(move || i)).collect();
        let total: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total, 15);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = TaskPool::with_workers(1).unwrap();

        let failing = pool.spawn(|| -> u8 { panic!("task failure") });
        let healthy = pool.spawn(|| 7u8);

        assert!(failing.join().unwrap_err().to_string().contains("task failure"));
        assert_eq!(healthy.join().unwrap(), 7);
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn test_detached_panic_is_contained() {
        let pool = TaskPool::with_workers(1).unwrap();
        pool.execute(|| panic!("detached failure"));
        assert!(pool.wait_all_timeout(Duration::from_secs(5)).is_ready());
        assert_eq!(pool.spawn(|| 1).join().unwrap(), 1);
    }

    #[test]
    fn test_many_lightweight_tasks() {
        let pool = TaskPool::with_workers(4).unwrap();
        let counter = Arc::new(AtomicI64::new(0));

        for _ in 0..10_000 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }

        assert!(pool.wait_all_timeout(Duration::from_secs(30)).is_ready());
        assert_eq!(counter.load(Ordering::Relaxed), 10_000);
    }

    #[test]
    fn test_drop_drains_queue() {
        let counter = Arc::new(AtomicI64::new(0));
        {
            let pool = TaskPool::with_workers(1).unwrap();
            for _ in 0..50 {
                let counter = Arc::clone(&counter);
                pool.execute(move || {
                    thread::sleep(Duration::from_millis(1));
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_default_pool_matches_cores() {
        let pool = TaskPool::new().unwrap();
        assert_eq!(pool.worker_count(), TaskPool::default_worker_count());
        assert!(pool.worker_count() >= 1);
    }

    #[test]
    fn test_zero_workers_rounds_up() {
        let pool = TaskPool::with_workers(0).unwrap();
        assert_eq!(pool.worker_count(), 1);
        assert_eq!(pool.spawn(|| "ran").join().unwrap(), "ran");
    }
}
