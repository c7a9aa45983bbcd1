//!
//! Platform threads: one OS thread per unit of work.
//!

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use handoff_core::WaitPolicy;
use tracing::{trace, warn};

use crate::handle::{task_pair, TaskHandle};
use crate::Spawner;

#[derive(Debug)]
pub struct OsThreads {
    prefix: String,
    next_id: AtomicU64,
    policy: WaitPolicy,
}

impl Default for OsThreads {
    fn default() -> Self {
        Self::new("handoff-thread")
    }
}

impl OsThreads {
    /// Threads are named `{prefix}-{n}`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next_id: AtomicU64::new(1),
            policy: WaitPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Spawner for OsThreads {
    fn spawn<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.prefix, id);
        let (handle, completer) = task_pair(name.clone(), self.policy);

        // A refused thread drops the closure unrun; the fallback reports it instead.
        let (fallback, completer) = completer.split();
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || completer.run(task));

        match spawned {
            Ok(_) => trace!(thread = %name, "thread spawned"),
            Err(err) => {
                warn!(thread = %name, %err, "failed to spawn thread");
                fallback.fail(format!("failed to spawn thread: {err}"));
            }
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn test_spawn_and_join() {
        let threads = OsThreads::new("worker");
        let handle = threads.spawn(|| thread::current().name().map(str::to_string));
        assert_eq!(handle.name(), "worker-1");
        assert_eq!(handle.join().unwrap().as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_spawn_many_and_sum() {
        let threads = OsThreads::default();
        let total = Arc::new(AtomicI64::new(0));

        let handles: Vec<_> = (1..=5)
            .map(|i| {
                let total = Arc::clone(&total);
                threads.spawn(move || {
                    total.fetch_add(i, Ordering::SeqCst);
                    i * 10
                })
            })
            .collect();

        let returned: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(returned, 150);
        assert_eq!(total.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_panicking_thread_surfaces_failure() {
        let threads = OsThreads::new("fragile");
        let handle = threads.spawn(|| -> u8 { panic!("thread blew up") });
        let err = handle.join().unwrap_err();
        assert!(err.to_string().contains("thread blew up"));
    }
}
