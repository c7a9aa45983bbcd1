///
/// # Demo Configuration
///
/// Settings for every demo, read from an optional TOML file. Each demo has
/// its own section and every field has a default, so an empty file (or no
/// file at all) runs the demos at their stock sizes. Command-line flags are
/// applied on top of the parsed file by the binary.
///
/// ## Example handoff.toml
///
/// ```toml
/// [wait]
/// spin_polls = 64
/// poll_interval_us = 100
///
/// [race]
/// workers = 3
/// increments = 1000000
///
/// [exchange]
/// frames = 10
///
/// [visibility]
/// rounds = 1000
///
/// [stop]
/// poll_ms = 100
/// run_ms = 5000
/// await_ms = 1000
///
/// [tasks]
/// tasks = 100000
/// platform_threads = 1000
/// ```
///
/// `tasks.pool_workers` is optional and defaults to the number of CPU cores.
/// Every size is bounded (see the `MAX_*` constants); `validate` and each
/// demo's `run` reject a section outside its bounds as `InvalidConfig`.
///

use std::path::Path;
use std::time::Duration;

use handoff_core::WaitPolicy;
use serde::{Deserialize, Serialize};

use crate::errors::DemoError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DemoConfig {
    pub wait: WaitPolicy,
    pub race: RaceConfig,
    pub exchange: ExchangeConfig,
    pub visibility: VisibilityConfig,
    pub stop: StopConfig,
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RaceConfig {
    pub workers: usize,
    pub increments: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            increments: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub frames: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self { frames: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VisibilityConfig {
    pub rounds: u64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self { rounds: 1_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StopConfig {
    pub poll_ms: u64,
    pub run_ms: u64,
    pub await_ms: u64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            poll_ms: 100,
            run_ms: 5_000,
            await_ms: 1_000,
        }
    }
}

impl StopConfig {
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn run(&self) -> Duration {
        Duration::from_millis(self.run_ms)
    }

    pub fn await_timeout(&self) -> Duration {
        Duration::from_millis(self.await_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TasksConfig {
    pub tasks: u64,
    pub platform_threads: u64,
    pub pool_workers: Option<usize>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            tasks: 100_000,
            platform_threads: 1_000,
            pool_workers: None,
        }
    }
}

pub fn parse_config(path: &Path) -> Result<DemoConfig, DemoError> {
    if !path.exists() {
        return Err(DemoError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<DemoConfig, DemoError> {
    let config: DemoConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub const MAX_RACE_WORKERS: usize = 256;
pub const MAX_FRAMES: u64 = 10_000_000;
pub const MAX_ROUNDS: u64 = 10_000_000;
pub const MAX_TASKS: u64 = 10_000_000;
pub const MAX_PLATFORM_THREADS: u64 = 10_000;
pub const MAX_POOL_WORKERS: usize = 1_024;

impl DemoConfig {
    /// Rejects sizes that would make a demo meaningless, hang, or overflow.
    pub fn validate(&self) -> Result<(), DemoError> {
        self.race.check()?;
        self.exchange.check()?;
        self.visibility.check()?;
        self.stop.check()?;
        self.tasks.check()
    }
}

impl RaceConfig {
    /// Increments across all workers, `None` if that does not fit a `u64`.
    pub fn total_increments(&self) -> Option<u64> {
        u64::try_from(self.workers)
            .ok()?
            .checked_mul(self.increments)
    }

    pub fn check(&self) -> Result<(), DemoError> {
        if !(1..=MAX_RACE_WORKERS).contains(&self.workers) {
            return Err(out_of_range(
                "race.workers",
                self.workers as u64,
                1,
                MAX_RACE_WORKERS as u64,
            ));
        }
        // The guarded counter is signed.
        if !self.total_increments().is_some_and(|total| i64::try_from(total).is_ok()) {
            return Err(invalid(format!(
                "race.workers ({}) times race.increments ({}) overflows",
                self.workers, self.increments
            )));
        }
        Ok(())
    }
}

impl ExchangeConfig {
    pub fn check(&self) -> Result<(), DemoError> {
        if !(1..=MAX_FRAMES).contains(&self.frames) {
            return Err(out_of_range("exchange.frames", self.frames, 1, MAX_FRAMES));
        }
        Ok(())
    }
}

impl VisibilityConfig {
    pub fn check(&self) -> Result<(), DemoError> {
        if self.rounds > MAX_ROUNDS {
            return Err(out_of_range("visibility.rounds", self.rounds, 0, MAX_ROUNDS));
        }
        Ok(())
    }
}

impl StopConfig {
    pub fn check(&self) -> Result<(), DemoError> {
        if self.poll_ms == 0 {
            return Err(invalid("stop.poll_ms must be at least 1"));
        }
        if self.await_ms < self.poll_ms {
            return Err(invalid(format!(
                "stop.await_ms ({}) must not be shorter than stop.poll_ms ({})",
                self.await_ms, self.poll_ms
            )));
        }
        Ok(())
    }
}

impl TasksConfig {
    pub fn check(&self) -> Result<(), DemoError> {
        if self.tasks > MAX_TASKS {
            return Err(out_of_range("tasks.tasks", self.tasks, 0, MAX_TASKS));
        }
        if self.platform_threads > MAX_PLATFORM_THREADS {
            return Err(out_of_range(
                "tasks.platform_threads",
                self.platform_threads,
                0,
                MAX_PLATFORM_THREADS,
            ));
        }
        if let Some(workers) = self.pool_workers {
            if !(1..=MAX_POOL_WORKERS).contains(&workers) {
                return Err(out_of_range(
                    "tasks.pool_workers",
                    workers as u64,
                    1,
                    MAX_POOL_WORKERS as u64,
                ));
            }
        }
        Ok(())
    }
}

fn out_of_range(field: &str, value: u64, min: u64, max: u64) -> DemoError {
    invalid(format!("{field} is {value}, expected {min}..={max}"))
}

fn invalid(reason: impl Into<String>) -> DemoError {
    DemoError::InvalidConfig(reason.into())
}
