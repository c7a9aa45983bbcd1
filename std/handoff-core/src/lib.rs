//!
//! handoff-core - Shared Vocabulary
//!
//! This crate provides the types shared across all handoff crates:
//!
//! - `SyncError` for protocol misuse and surfaced work failures
//! - `Wait<T>` for the ordinary outcomes of bounded waiting (ready, timed out, cancelled)
//! - `OwnerId` identifying the execution context that holds a monitor or plays a role
//! - `WaitPolicy` describing how busy-waits yield and sleep between polls
//!
//! Timeouts and cancellations are never errors here. Only misuse of a
//! primitive, or a failure raised by user work, travels as `SyncError`.
//!

pub mod error;
pub mod owner;
pub mod policy;
pub mod wait;

pub use error::*;
pub use owner::*;
pub use policy::*;
pub use wait::*;
