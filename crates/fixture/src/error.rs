//! Error types for fixture compilation
//!
//! Malformed markup and unresolvable references are tolerated and never
//! surface here; only environment failures do.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to copy asset {from} -> {to}: {source}")]
    AssetCopy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] specrig_common::Error),
}

pub type FixtureResult<T> = Result<T, FixtureError>;
