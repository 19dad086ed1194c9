//! Unified error types for DeFlake

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all DeFlake operations
#[derive(Error, Debug)]
pub enum DeflakeError {
    // Configuration errors
    #[error(
        "API key missing: set {env_var} in your environment. Anonymous submissions are not accepted."
    )]
    MissingApiKey { env_var: String },

    #[error("Configuration error: {0}")]
    Config(String),

    // Resolution errors
    #[error(
        "No failure evidence found. Pass --log <path> and/or --html <path>, \
         or wrap your test command: deflake -- npx playwright test"
    )]
    NoEvidence,

    #[error("Log file not found: {0}. Pass --log <path> pointing at the failing run's output.")]
    LogNotFound(PathBuf),

    #[error("Artifact not found: {0}. Pass --html <path> pointing at an HTML snapshot or report.")]
    ArtifactNotFound(PathBuf),

    #[error(
        "Unsupported artifact: {path} is a binary trace archive. \
         Enable the HTML reporter (reporter: [['html']]) so playwright-report/index.html exists, \
         or pass --html <path> explicitly."
    )]
    UnsupportedArtifact { path: PathBuf },

    // Process errors
    #[error("Failed to start `{command}`: {reason}. Check that the command is installed and on PATH.")]
    Spawn { command: String, reason: String },

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error {status}: {detail}")]
    Api { status: u16, detail: String },

    // Patch errors
    #[error("Patch failed: {0}")]
    Patch(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl DeflakeError {
    /// Whether this error should be reported as a usage problem (exit code 1,
    /// no network attempt made).
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            DeflakeError::NoEvidence
                | DeflakeError::LogNotFound(_)
                | DeflakeError::ArtifactNotFound(_)
                | DeflakeError::UnsupportedArtifact { .. }
                | DeflakeError::MissingApiKey { .. }
        )
    }
}

/// Result type alias using DeflakeError
pub type Result<T> = std::result::Result<T, DeflakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_next_steps() {
        let err = DeflakeError::UnsupportedArtifact {
            path: PathBuf::from("test-results/trace.zip"),
        };
        let msg = err.to_string();
        assert!(msg.contains("trace.zip"));
        assert!(msg.contains("--html"));

        let err = DeflakeError::MissingApiKey {
            env_var: "DEFLAKE_API_KEY".to_string(),
        };
        assert!(err.to_string().contains("DEFLAKE_API_KEY"));
    }

    #[test]
    fn test_usage_classification() {
        assert!(DeflakeError::NoEvidence.is_usage());
        assert!(!DeflakeError::Transport("reset".to_string()).is_usage());
        assert!(!DeflakeError::Api {
            status: 500,
            detail: "boom".to_string()
        }
        .is_usage());
    }
}
