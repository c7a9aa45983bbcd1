///
/// Demo driver error types.
///
/// Everything that can end a demo run early: a missing or malformed config
/// file, a primitive reporting misuse or failed work, and output encoding.
///

use std::path::PathBuf;

use handoff_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("Config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Demo '{demo}' failed: {reason}")]
    DemoFailed { demo: &'static str, reason: String },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DemoError {
    pub(crate) fn failed(demo: &'static str, reason: impl Into<String>) -> Self {
        DemoError::DemoFailed {
            demo,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::Role;

    #[test]
    fn test_error_display_messages() {
        let err = DemoError::ConfigNotFound {
            path: PathBuf::from("/tmp/handoff.toml"),
        };
        assert!(err.to_string().contains("Config not found"));
        assert!(err.to_string().contains("/tmp/handoff.toml"));

        let err = DemoError::InvalidConfig("race.workers must be at least 1".to_string());
        assert!(err.to_string().contains("Invalid config"));
        assert!(err.to_string().contains("race.workers"));

        let err = DemoError::failed("stop", "worker did not stop in time");
        insta::assert_snapshot!(err.to_string(), @"Demo 'stop' failed: worker did not stop in time");
    }

    #[test]
    fn test_sync_error_is_transparent() {
        let err: DemoError = SyncError::protocol_violation(Role::Producer, "slot taken").into();
        assert_eq!(
            err.to_string(),
            SyncError::protocol_violation(Role::Producer, "slot taken").to_string()
        );
    }
}
