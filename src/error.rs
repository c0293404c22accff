#![forbid(unsafe_code)]

//! Error types shared by the library modules.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The URL does not name a collection on the configured platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid profile URL for {domain}: {url}")]
    NotACollectionUrl { url: String, domain: String },
}

/// Failures reported while talking to the extraction engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary is missing or cannot be started. This is a
    /// process-wide precondition, never a per-item problem.
    #[error("{binary} is not installed or not in PATH: {reason}")]
    Unavailable { binary: String, reason: String },

    #[error("{operation} failed: {detail}")]
    Failed {
        operation: &'static str,
        detail: String,
    },

    #[error("could not parse engine output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

impl EngineError {
    /// Human-readable detail without the operation prefix.
    pub fn detail(&self) -> String {
        match self {
            EngineError::Failed { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors raised while reading URL lists.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} does not contain any URLs", .path.display())]
    Empty { path: PathBuf },
}
