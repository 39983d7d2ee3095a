//! Local-folder target
//!
//! Writes daily snapshots into an operator-chosen directory (typically a
//! synced or network folder). Validation failures carry distinct error
//! kinds so the settings screen can tell the operator exactly what is
//! wrong with a chosen path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::{BackupResult, ValidationError};
use crate::target::{is_snapshot_name, BackupTarget, TargetPhase};
use crate::BackupError;

/// Snapshot destination backed by a plain directory.
#[derive(Debug, Clone)]
pub struct LocalFolderTarget {
    dir: PathBuf,
    file_prefix: String,
}

impl LocalFolderTarget {
    /// Create a target writing into `dir`; snapshots are named
    /// `<file_prefix>-backup-YYYY-MM-DD.zip`.
    pub fn new(dir: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_prefix: file_prefix.into(),
        }
    }

    /// Destination directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate that `dir` exists, is a directory and is writable.
    ///
    /// Also used standalone by the settings endpoint before a path is
    /// persisted on the user record.
    pub fn validate_dir(dir: &Path) -> Result<(), ValidationError> {
        if !dir.exists() {
            return Err(ValidationError::PathNotFound(dir.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(ValidationError::NotADirectory(dir.to_path_buf()));
        }

        let probe = dir.join(".permission_test");
        match std::fs::write(&probe, "test") {
            Ok(()) => {
                let _ = std::fs::remove_file(&probe);
                Ok(())
            }
            Err(_) => Err(ValidationError::NotWritable(dir.to_path_buf())),
        }
    }
}

#[async_trait]
impl BackupTarget for LocalFolderTarget {
    fn name(&self) -> &'static str {
        "local-folder"
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn store(&self, name: &str, bytes: &[u8]) -> BackupResult<()> {
        Self::validate_dir(&self.dir)?;

        // Write through a temp name so a partially written file is never
        // visible under a snapshot name.
        let final_path = self.dir.join(name);
        let temp_path = self.dir.join(format!(".{}.part", name));
        tokio::fs::write(&temp_path, bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        info!("💾 Snapshot stored at {:?}", final_path);
        Ok(())
    }

    async fn list(&self) -> BackupResult<Vec<String>> {
        Self::validate_dir(&self.dir)?;

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_snapshot_name(&name, &self.file_prefix) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn fetch(&self, name: &str) -> BackupResult<Vec<u8>> {
        let path = self.dir.join(name);
        tokio::fs::read(&path).await.map_err(|e| {
            BackupError::target(self.name(), TargetPhase::Fetching, e.to_string())
        })
    }

    async fn delete(&self, name: &str) -> BackupResult<()> {
        tokio::fs::remove_file(self.dir.join(name))
            .await
            .map_err(|e| BackupError::target(self.name(), TargetPhase::Deleting, e.to_string()))
    }
}
