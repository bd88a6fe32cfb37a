use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Archive root '{path}' is not writable by '{identity}': {reason}")]
    NotWritable {
        path: PathBuf,
        identity: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Sentinel '{0}' already exists, refusing to overwrite")]
    SentinelConflict(PathBuf),

    #[error("Run log '{0}' not found")]
    MissingRunLog(PathBuf),

    #[error("Event sink error: {0}")]
    EventSink(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackupError {
    /// Wraps an I/O error with the operation and path it happened on.
    pub fn io(context: &str, path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io(format!("{} '{}': {}", context, path.display(), err))
    }

    /// Only a non-writable archive root stops an orchestration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotWritable { .. })
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
