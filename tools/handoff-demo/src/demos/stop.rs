//!
//! Cooperative stop.
//!
//! A worker polls on a fixed period until asked to stop. The request only
//! takes effect between polls, so the worker finishes the poll in flight
//! and stops within one period of the request.
//!

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use handoff_core::WaitPolicy;
use handoff_sync::CancellableWorker;
use handoff_tasks::{OsThreads, Spawner};
use tracing::{info, trace};

use crate::config::StopConfig;
use crate::errors::DemoError;
use crate::report::Report;

pub fn run(config: &StopConfig, policy: WaitPolicy) -> Result<Report, DemoError> {
    config.check()?;
    info!(poll_ms = config.poll_ms, run_ms = config.run_ms, "stop demo");
    let worker = Arc::new(CancellableWorker::with_policy("poller", policy));
    let threads = OsThreads::new("stop").with_policy(policy);

    let runner = {
        let worker = Arc::clone(&worker);
        let poll = config.poll();
        threads.spawn(move || {
            worker.start(|| {
                trace!("polling");
                thread::sleep(poll);
                Ok(())
            })
        })
    };

    thread::sleep(config.run());
    let state_before_stop = worker.state();
    let requested = Instant::now();
    worker.request_stop();
    let stopped = worker.await_stopped(config.await_timeout())?;
    let stop_latency_ms = requested.elapsed().as_millis() as u64;

    if !stopped {
        return Err(DemoError::failed(
            "stop",
            format!("worker still {} after {} ms", worker.state(), config.await_ms),
        ));
    }
    let iterations = runner.join()??;

    Ok(Report::new("stop")
        .fact("poll_ms", config.poll_ms)
        .fact("run_ms", config.run_ms)
        .fact("state_before_stop", state_before_stop.to_string())
        .fact("iterations", iterations)
        .fact("stop_latency_ms", stop_latency_ms)
        .fact("final_state", worker.state().to_string())
        .check(stop_latency_ms <= config.await_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_report() {
        let config = StopConfig {
            poll_ms: 20,
            run_ms: 120,
            await_ms: 1_000,
        };
        let report = run(&config, WaitPolicy::default()).unwrap();

        assert!(report.passed, "{report:?}");
        assert_eq!(report.get("state_before_stop"), Some(&"running".into()));
        assert_eq!(report.get("final_state"), Some(&"stopped".into()));
        let iterations = report.get("iterations").and_then(|v| v.as_u64()).unwrap();
        assert!(iterations >= 1);
    }

    #[test]
    fn test_stop_before_first_poll_finishes() {
        let config = StopConfig {
            poll_ms: 10,
            run_ms: 0,
            await_ms: 500,
        };
        let report = run(&config, WaitPolicy::default()).unwrap();
        assert_eq!(report.get("final_state"), Some(&"stopped".into()));
    }
}
