use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

use super::frame::StreamKind;

/// Result type for process operations
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Errors that can occur during process operations
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    SpawnError(#[from] io::Error),

    #[error("Failed to attach to {0} of the process")]
    MissingStream(StreamKind),

    #[error("Process exited with non-zero status: {0}")]
    NonZeroExit(ExitStatus),

    #[error("Process killed: {0}")]
    ProcessKilled(String),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Process output parse error: {0}")]
    ParseError(String),

    #[error("Process reported an error: {0}")]
    ErrorOutput(String),

    #[error("Other process error: {0}")]
    Other(String),
}

impl From<ProcessError> for crate::error::WatchError {
    fn from(err: ProcessError) -> Self {
        crate::error::WatchError::Process(err.to_string())
    }
}
