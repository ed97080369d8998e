//! Error types for the orchestrator

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Unsupported platform '{0}'. Supported: linux, macos, windows")]
    UnsupportedPlatform(String),

    #[error("{step} failed ({})", exit_description(.code))]
    BuildFailed { step: String, code: Option<i32> },

    #[error("Failed to spawn {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free capture port after {attempts} attempts in {min}-{max}")]
    PortUnavailable { attempts: usize, min: u16, max: u16 },

    #[error("Capture server failed: {0}")]
    CaptureServer(String),

    #[error("Configuration error: {0}")]
    Config(#[from] specrig_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl E2eError {
    pub fn build_failed(step: &str, status: std::process::ExitStatus) -> Self {
        E2eError::BuildFailed {
            step: step.to_string(),
            code: status.code(),
        }
    }
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
