use std::path::PathBuf;

use thiserror::Error;

use crate::models::SourceDatabase;

/// Failures that leave a pipeline stage without usable output.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source {database} is unavailable at {}: {reason}", path.display())]
    SourceUnavailable {
        database: SourceDatabase,
        path: PathBuf,
        reason: String,
    },
    #[error("consolidated dataset {} could not be persisted: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },
    #[error("consolidated dataset {} is locked by another run", path.display())]
    StoreLocked { path: PathBuf },
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        PipelineError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
