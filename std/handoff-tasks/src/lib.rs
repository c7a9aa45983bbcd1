//!
//! handoff-tasks - Execution Contexts
//!
//! The primitives in handoff-sync never create threads. This crate is the
//! capability they are driven by: spawn a unit of concurrent work, later
//! wait for its result.
//!
//! ## Platform threads
//!
//! `OsThreads` runs every unit of work on its own named OS thread.
//!
//! ## Lightweight tasks
//!
//! `TaskPool` multiplexes M tasks onto N OS threads (defaults to the
//! number of CPU cores) through a shared FIFO queue. Tasks are cheap to
//! create, so hundreds of thousands can be queued where as many OS
//! threads could not.
//!
//! ## Joining
//!
//! Both return a `TaskHandle<T>`. The task's result (or its panic) is
//! handed back through a `SingleSlotExchanger`, and `join` surfaces a
//! panic as `SyncError::WorkFailed`.
//!

pub mod handle;
pub mod pool;
pub mod threads;

pub use handle::*;
pub use pool::*;
pub use threads::*;

/// Something that can run a unit of work concurrently and hand back its result.
pub trait Spawner {
    fn spawn<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static;
}
