//! Error types for backup and restore operations

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::target::TargetPhase;

/// Input validation failures, reported immediately and never retried.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Configured backup folder does not exist
    #[error("Backup folder does not exist: {0}")]
    PathNotFound(PathBuf),

    /// Configured backup path points at a file
    #[error("Backup path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Configured backup folder is not writable
    #[error("Backup folder is not writable: {0}")]
    NotWritable(PathBuf),

    /// Archive entry would resolve outside the attachments directory
    #[error("Unsafe archive entry name: {0}")]
    UnsafeEntryName(String),

    /// Archive is missing a required entry or is not a ZIP at all
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),
}

/// Main error type for backup operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Bad or missing input, surfaced to the caller without retry
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The consistent database copy could not be produced; nothing is
    /// packaged or uploaded after this
    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    /// A backup target failed; other targets in the same run still proceed
    #[error("Backup target '{target}' failed while {phase}: {message}")]
    Target {
        /// Target name (for example "local-folder" or "drive")
        target: String,
        /// Step of the per-attempt state machine that failed
        phase: TargetPhase,
        /// Underlying failure
        message: String,
    },

    /// Restore failed; when a rollback copy was already made its location
    /// is carried so the operator can recover manually
    #[error("Restore failed: {message}")]
    Restore {
        /// Underlying failure
        message: String,
        /// Rollback copy of the pre-restore database, if one was made
        rollback: Option<PathBuf>,
    },

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] bossnouadi_common::NouadiError),

    /// I/O error during backup operation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Archive encode/decode error
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Metadata (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other backup error
    #[error("Backup error: {0}")]
    Other(String),
}

impl BackupError {
    /// Create a new snapshot error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Create a new target error
    pub fn target(target: impl Into<String>, phase: TargetPhase, msg: impl Into<String>) -> Self {
        Self::Target {
            target: target.into(),
            phase,
            message: msg.into(),
        }
    }

    /// Create a new restore error
    pub fn restore(msg: impl Into<String>, rollback: Option<PathBuf>) -> Self {
        Self::Restore {
            message: msg.into(),
            rollback,
        }
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;
