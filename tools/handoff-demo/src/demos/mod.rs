//!
//! The demonstrations, one module each.
//!

pub mod exchange;
pub mod race;
pub mod reentrant;
pub mod stop;
pub mod tasks;
pub mod visibility;

use tracing::info;

use crate::config::DemoConfig;
use crate::errors::DemoError;
use crate::report::Report;

/// Runs every demo in sequence, stopping at the first error.
pub fn run_all(config: &DemoConfig) -> Result<Vec<Report>, DemoError> {
    let reports = vec![
        race::run(&config.race, config.wait)?,
        reentrant::run()?,
        exchange::run(&config.exchange, config.wait)?,
        visibility::run(&config.visibility, config.wait)?,
        stop::run(&config.stop, config.wait)?,
        tasks::run(&config.tasks, config.wait)?,
    ];
    let failed = reports.iter().filter(|r| !r.passed).count();
    info!(demos = reports.len(), failed, "all demos finished");
    Ok(reports)
}
