use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::CellKey;

/// Failures reported by an [`ElevationSource`](crate::source::ElevationSource).
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("no elevation data for cell {0}")]
    NotFound(CellKey),

    #[error("failed to read cell {key}: {reason}")]
    Read { key: CellKey, reason: String },

    #[error("reading cell {key} timed out after {timeout:?}")]
    Timeout { key: CellKey, timeout: Duration },
}

#[derive(Debug, Error)]
pub enum TilerError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("failed to write {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl TilerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TilerError::IoFailure {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TilerError>;
