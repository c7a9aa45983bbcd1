///
/// handoff-demo - Demonstrations of the handoff primitives
///
/// Each demo drives one primitive through the hazard it exists for and
/// reports what it observed:
/// - race: lost updates on an unguarded counter, none on `SharedCounter`
/// - reentrant: nested monitor acquisition and refused releases
/// - exchange: ordered frame handoff through `SingleSlotExchanger`
/// - visibility: flag-published writes and `Synchronized` snapshots
/// - stop: cooperative stop of a `CancellableWorker`
/// - tasks: `TaskPool` tasks against one OS thread per task
///

pub mod config;
pub mod demos;
pub mod errors;
pub mod report;

pub use config::{parse_config, parse_config_str, DemoConfig};
pub use demos::run_all;
pub use errors::DemoError;
pub use report::{render_json, render_text, Report};
