//!
//! Frame handoff through a single slot.
//!
//! A producer thread puts numbered frames, the demo's own context takes
//! them. The slot never holds more than one frame and every frame arrives
//! exactly once, in order. Afterwards a second producer tries to put while
//! the slot is occupied by someone else's frame and is refused.
//!

use std::sync::Arc;
use std::time::Duration;

use handoff_core::{SyncError, Wait, WaitPolicy};
use handoff_sync::SingleSlotExchanger;
use handoff_tasks::{OsThreads, Spawner};
use tracing::{debug, info};

use crate::config::ExchangeConfig;
use crate::errors::DemoError;
use crate::report::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
}

pub fn run(config: &ExchangeConfig, policy: WaitPolicy) -> Result<Report, DemoError> {
    config.check()?;
    info!(frames = config.frames, "exchange demo");
    let exchanger = Arc::new(SingleSlotExchanger::<Frame>::with_policy(policy));
    let threads = OsThreads::new("exchange").with_policy(policy);

    let empty_take = match exchanger.take_timeout(Duration::from_millis(10))? {
        Wait::Ready(frame) => {
            return Err(DemoError::failed(
                "exchange",
                format!("took frame {} from an empty slot", frame.sequence),
            ));
        }
        Wait::TimedOut => "timed out",
        Wait::Cancelled => "cancelled",
    };

    let producer = {
        let exchanger = Arc::clone(&exchanger);
        let frames = config.frames;
        threads.spawn(move || -> Result<(), SyncError> {
            for sequence in 1..=frames {
                exchanger.put(Frame { sequence })?;
            }
            Ok(())
        })
    };

    let mut received = Vec::new();
    let mut max_pending = 0;
    for _ in 0..config.frames {
        let frame = exchanger.take()?;
        debug!(sequence = frame.sequence, "frame received");
        received.push(frame.sequence);
        max_pending = max_pending.max(exchanger.pending());
    }
    producer.join()??;

    let in_order = received.iter().copied().eq(1..=config.frames);

    // The demo context now leaves a frame in the slot; a second producer must be refused.
    exchanger.put(Frame { sequence: 0 })?;
    let intruder = {
        let exchanger = Arc::clone(&exchanger);
        threads.spawn(move || exchanger.put(Frame { sequence: u64::MAX }))
    };
    let second_producer = match intruder.join()? {
        Err(err @ SyncError::ProtocolViolation { .. }) => Some(err.to_string()),
        _ => None,
    };
    let drained = exchanger.take()?;

    let stored = exchanger.stored_count();
    let taken = exchanger.taken_count();
    let passed = in_order
        && max_pending <= 1
        && drained.sequence == 0
        && stored == config.frames + 1
        && taken == stored
        && second_producer.is_some();

    Ok(Report::new("exchange")
        .fact("frames", config.frames)
        .fact("empty_take", empty_take)
        .fact("in_order", in_order)
        .fact("max_pending", max_pending)
        .fact("stored", stored)
        .fact("taken", taken)
        .fact(
            "second_producer",
            second_producer.unwrap_or_else(|| "accepted".to_string()),
        )
        .check(passed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_report() {
        let report = run(&ExchangeConfig { frames: 25 }, WaitPolicy::default()).unwrap();
        assert!(report.passed, "{report:?}");
        assert_eq!(report.get("in_order"), Some(&true.into()));
        assert_eq!(report.get("stored"), Some(&26u64.into()));
        assert_eq!(report.get("empty_take"), Some(&"timed out".into()));

        let violation = report.get("second_producer").and_then(|v| v.as_str()).unwrap();
        assert!(violation.starts_with("Protocol violation by producer"));
    }

    #[test]
    fn test_oversized_frame_count_is_rejected() {
        let config = ExchangeConfig {
            frames: i64::MAX as u64,
        };
        let err = run(&config, WaitPolicy::default()).unwrap_err();
        assert!(matches!(err, DemoError::InvalidConfig(_)));
    }

    #[test]
    fn test_single_frame() {
        let report = run(&ExchangeConfig { frames: 1 }, WaitPolicy::spinning()).unwrap();
        assert!(report.passed);
        assert_eq!(report.get("taken"), Some(&2u64.into()));
    }
}
