//! Error type shared by the analysis stages.
//!
//! Most per-note failures are not errors at all: absent windows and decay
//! points are `None`, unmatched or fully-masked observations are counted.
//! What remains here is what a caller has to decide about.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to decode audio {path:?}: {reason}")]
    AudioDecode { path: PathBuf, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Note {id} has already been scored")]
    AlreadyScored { id: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
