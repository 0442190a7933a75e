//! Error types shared across Panorama crates.

use std::path::PathBuf;

/// Top-level error type for Panorama operations.
#[derive(Debug, thiserror::Error)]
pub enum PanoramaError {
    #[error("No displays found")]
    NoDisplaysFound,

    #[error("Core initialization failed: {message}")]
    CoreInitFailed { message: String },

    #[error("Failed to load module '{module}': {reason}")]
    ModuleLoadFailed { module: String, reason: String },

    #[error("Failed to create scene: {message}")]
    SceneCreationFailed { message: String },

    #[error("Failed to create source '{source_name}'")]
    SourceCreationFailed { source_name: String },

    #[error("Failed to create any {kind} encoder (tried: {})", attempted.join(", "))]
    EncoderCreationFailed { kind: String, attempted: Vec<String> },

    #[error("Failed to start output: {message}")]
    OutputStartFailed { message: String },

    #[error("Output did not stop within {waited_ms} ms")]
    StopTimeout { waited_ms: u64 },

    #[error("Operation '{operation}' is not valid in phase {phase}")]
    InvalidPhase { operation: String, phase: String },

    #[error("Output is not running")]
    NotRunning,

    #[error("Already streaming")]
    AlreadyStreaming,

    #[error("Not currently streaming")]
    NotStreaming,

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PanoramaError.
pub type PanoramaResult<T> = Result<T, PanoramaError>;

impl PanoramaError {
    pub fn core_init(msg: impl Into<String>) -> Self {
        Self::CoreInitFailed {
            message: msg.into(),
        }
    }

    pub fn scene(msg: impl Into<String>) -> Self {
        Self::SceneCreationFailed {
            message: msg.into(),
        }
    }

    pub fn output_start(msg: impl Into<String>) -> Self {
        Self::OutputStartFailed {
            message: msg.into(),
        }
    }

    pub fn invalid_phase(operation: impl Into<String>, phase: impl std::fmt::Debug) -> Self {
        Self::InvalidPhase {
            operation: operation.into(),
            phase: format!("{phase:?}"),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_error_lists_every_candidate() {
        let err = PanoramaError::EncoderCreationFailed {
            kind: "video".to_string(),
            attempted: vec!["x264enc".to_string(), "nvh264enc".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Failed to create any video encoder (tried: x264enc, nvh264enc)"
        );
    }
}
