// ⚠️ Error taxonomy
// Fatal problems are errors. Row-level problems are RowIssues (see cleaning.rs).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Input missing or unreadable - aborts the run
    #[error("cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Required sheet or column absent - aborts the run
    #[error("schema error: {0}")]
    Schema(String),

    #[error("unsupported input format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// One output target failed - the others are still attempted
    #[error("failed to write {path}: {message}")]
    OutputWrite { path: PathBuf, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReconcileError::FileAccess {
            path: path.into(),
            source,
        }
    }

    pub fn output_write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ReconcileError::OutputWrite {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Fatal errors abort the pipeline; output failures are collected instead
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReconcileError::OutputWrite { .. })
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
