//!
//! handoff-sync - Synchronization Primitives
//!
//! Small, carefully specified primitives for sharing memory between
//! execution contexts. None of them spawns threads; every operation is
//! safe to call from any number of concurrent contexts, OS threads or
//! pooled tasks alike.
//!
//! ## Monitor
//!
//! Reentrant mutual exclusion:
//! - `acquire()` blocks until the caller owns the monitor (or bumps the hold depth if it already does)
//! - `acquire_timeout(d)` gives up with `Wait::TimedOut`
//! - `release()` rejects an unheld or foreign release with `SyncError::IllegalUse`
//! - `enter()` returns a guard releasing on drop
//!
//! ## VisibilityFlag
//!
//! A boolean published with release ordering and observed with acquire
//! ordering. Everything the writer did before `set()` is visible to a
//! reader that sees the flag. Busy-waits on it are bounded by a
//! cancellation condition or a deadline.
//!
//! ## SingleSlotExchanger
//!
//! Capacity-one handoff between one producer and one consumer:
//! - `put(value)` blocks while an unclaimed value is pending
//! - `take()` busy-waits on the visibility flag, then claims the value
//! - a second producer or consumer is reported as `SyncError::ProtocolViolation`
//!
//! ## CancellableWorker
//!
//! Runs a work closure until stop is requested. Cancellation is only
//! observed between iterations. A failing or panicking iteration stops
//! the worker and is surfaced to `start`'s caller and to `await_stopped`.
//!
//! ## SharedCounter and Synchronized
//!
//! Monitor-guarded state: an integer counter with no lost updates, and a
//! general value cell for publishing multi-field snapshots atomically.
//!

pub mod counter;
pub mod exchanger;
pub mod flag;
pub mod monitor;
pub mod synchronized;
pub mod worker;

pub use counter::*;
pub use exchanger::*;
pub use flag::*;
pub use monitor::*;
pub use synchronized::*;
pub use worker::*;

pub use handoff_core::{OwnerId, Role, SyncError, Wait, WaitPolicy};
