//! BossNouadi backup module
//!
//! Provides the backup, restore and synchronization engine for the
//! BossNouadi server, including:
//! - Consistent point-in-time snapshots of the live database + uploads
//! - ZIP archive packaging with a fixed entry layout
//! - Pluggable backup targets (local folder, OAuth drive, asset store)
//! - Retention rotation (keep the newest N snapshots per target)
//! - Scheduled and mutation-triggered automatic runs with daily dedup
//! - Safe restore with a mandatory rollback copy

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use bossnouadi_common::time;
use bossnouadi_db::Storage;

pub mod archive;
pub mod error;
pub mod restore;
pub mod retention;
pub mod scheduler;
pub mod snapshot;
pub mod target;

pub use archive::{Attachment, BackupMetadata, RestoreMode};
pub use error::{BackupError, BackupResult, ValidationError};
pub use restore::RestoreOutcome;
pub use scheduler::{BackupScheduler, SyncStatus};
pub use target::{AssetStore, BackupTarget, DriveAuth, DriveTarget, LocalFolderTarget};

/// Backup engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Whether backups are enabled
    pub enabled: bool,
    /// Directory holding per-item attachment uploads
    pub uploads_dir: PathBuf,
    /// Maximum number of snapshots to retain per target
    pub max_backups: usize,
    /// Snapshot filename prefix (`<prefix>-backup-YYYY-MM-DD.zip`)
    pub file_prefix: String,
    /// Name of the dedicated backup folder on the OAuth drive
    pub drive_folder: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uploads_dir: PathBuf::from("data/uploads"),
            max_backups: retention::DEFAULT_MAX_BACKUPS,
            file_prefix: "bossnouadi".to_string(),
            drive_folder: "BossNouadiBackups".to_string(),
        }
    }
}

/// Kind of backup run, recorded in the archive metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Operator-initiated full backup
    Manual,
    /// Automatic daily snapshot into the local folder target
    AutoLocal,
    /// Automatic daily snapshot onto the OAuth drive
    AutoCloud,
}

impl BackupKind {
    /// Metadata `type` string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Manual => "manual-backup",
            BackupKind::AutoLocal => "auto-backup",
            BackupKind::AutoCloud => "auto-cloud-backup",
        }
    }
}

/// Outcome of one fan-out backup run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Snapshot archive name for this run
    pub archive_name: String,
    /// Targets that confirmed storage
    pub stored: Vec<String>,
    /// Targets that failed, with the failure reason
    pub failures: Vec<(String, String)>,
}

/// Summary of configured destinations and latest cloud snapshot.
#[derive(Debug, Serialize)]
pub struct EngineStatus {
    /// Local folder target persisted on the user record, if any
    pub local_folder: Option<String>,
    /// Whether a drive credential is configured
    pub cloud_configured: bool,
    /// Newest snapshot name on the drive, when reachable
    pub latest_cloud_snapshot: Option<String>,
}

/// Orchestrates snapshot production, packaging, fan-out storage and
/// retention for every configured target.
pub struct BackupEngine {
    storage: Arc<Storage>,
    config: BackupConfig,
    drive: Option<Arc<DriveTarget>>,
}

impl BackupEngine {
    /// Create an engine over the live storage and an optional drive target.
    pub fn new(storage: Arc<Storage>, config: BackupConfig, drive: Option<DriveTarget>) -> Self {
        Self {
            storage,
            config,
            drive: drive.map(Arc::new),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Whether a cloud destination is configured.
    pub fn has_cloud_target(&self) -> bool {
        self.drive.is_some()
    }

    /// Snapshot archive name for a run at `at`.
    pub fn snapshot_name(&self, at: DateTime<Utc>) -> String {
        format!("{}-backup-{}.zip", self.config.file_prefix, time::date_key(at))
    }

    /// Produce a snapshot and package it, without storing anywhere.
    ///
    /// This is the export-download path; the returned name carries the
    /// daily naming convention.
    #[instrument(skip_all, fields(kind = kind.as_str()))]
    pub async fn export_archive(&self, kind: BackupKind) -> BackupResult<(String, Vec<u8>)> {
        let snapshot = snapshot::produce_snapshot(&self.storage, &self.config.uploads_dir).await?;
        let user_id = self.storage.first_user().await?.map(|u| u.id);

        let metadata = BackupMetadata {
            version: archive::FORMAT_VERSION.to_string(),
            exported_at: time::now_rfc3339(),
            kind: kind.as_str().to_string(),
            user_id,
        };
        let bytes = archive::pack(&snapshot.db_bytes, &snapshot.attachments, &metadata)?;
        Ok((self.snapshot_name(Utc::now()), bytes))
    }

    /// Destinations participating in a run of the given kind.
    ///
    /// The local folder comes from the persisted user record so a path
    /// changed in settings takes effect on the next run without restart.
    async fn targets_for(&self, kind: BackupKind) -> BackupResult<Vec<Arc<dyn BackupTarget>>> {
        let mut targets: Vec<Arc<dyn BackupTarget>> = Vec::new();

        if kind != BackupKind::AutoCloud {
            if let Some(user) = self.storage.first_user().await? {
                if let Some(path) = user.backup_path {
                    targets.push(Arc::new(LocalFolderTarget::new(
                        path,
                        self.config.file_prefix.clone(),
                    )));
                }
            }
        }

        if kind != BackupKind::AutoLocal {
            if let Some(drive) = &self.drive {
                targets.push(drive.clone() as Arc<dyn BackupTarget>);
            }
        }

        Ok(targets)
    }

    /// Run one full backup: snapshot, pack, fan out to every configured
    /// target, then enforce retention at each target that confirmed
    /// storage.
    ///
    /// One target's failure never prevents the others from completing; the
    /// run as a whole fails only when no target stored the snapshot.
    #[instrument(skip_all, fields(kind = kind.as_str()))]
    pub async fn run(&self, kind: BackupKind) -> BackupResult<RunReport> {
        if !self.config.enabled {
            info!("🔕 Backups are disabled in configuration");
            return Ok(RunReport::default());
        }

        let targets = self.targets_for(kind).await?;
        if targets.is_empty() {
            info!("🔕 No backup destination configured for {} run", kind.as_str());
            return Ok(RunReport::default());
        }

        let (archive_name, bytes) = self.export_archive(kind).await?;
        info!("💾 Starting {} run, archive '{}'", kind.as_str(), archive_name);

        let mut report = RunReport {
            archive_name: archive_name.clone(),
            ..RunReport::default()
        };

        for target in &targets {
            match target.store(&archive_name, &bytes).await {
                Ok(()) => {
                    report.stored.push(target.name().to_string());
                    // Only prune after the replacement snapshot is durably
                    // present at this target.
                    retention::enforce_retention(target.as_ref(), self.config.max_backups).await;
                }
                Err(e) => {
                    error!("❌ Target '{}' failed: {}", target.name(), e);
                    report.failures.push((target.name().to_string(), e.to_string()));
                }
            }
        }

        if report.stored.is_empty() {
            let reasons = report
                .failures
                .iter()
                .map(|(t, e)| format!("{}: {}", t, e))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BackupError::other(format!(
                "all backup targets failed ({})",
                reasons
            )));
        }

        info!(
            "✅ Backup run completed: stored at {:?}, {} failure(s)",
            report.stored,
            report.failures.len()
        );
        Ok(report)
    }

    /// Fetch a stored snapshot back from the drive target.
    pub async fn fetch_cloud_snapshot(&self, name: &str) -> BackupResult<Vec<u8>> {
        let drive = self
            .drive
            .as_ref()
            .ok_or_else(|| BackupError::other("no cloud backup target configured"))?;
        drive.fetch(name).await
    }

    /// Report configured destinations and the newest cloud snapshot.
    pub async fn status(&self) -> BackupResult<EngineStatus> {
        let local_folder = self
            .storage
            .first_user()
            .await?
            .and_then(|u| u.backup_path);

        let latest_cloud_snapshot = match &self.drive {
            Some(drive) => drive.list().await.ok().and_then(|mut names| names.pop()),
            None => None,
        };

        Ok(EngineStatus {
            local_folder,
            cloud_configured: self.drive.is_some(),
            latest_cloud_snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_disabled() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path().join("bossnouadi.db")).await.unwrap());
        let config = BackupConfig {
            enabled: false,
            ..BackupConfig::default()
        };

        let engine = BackupEngine::new(storage, config, None);
        let report = engine.run(BackupKind::Manual).await.unwrap();
        assert!(report.stored.is_empty());
    }

    #[tokio::test]
    async fn test_run_without_configured_destination() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path().join("bossnouadi.db")).await.unwrap());

        let engine = BackupEngine::new(storage, BackupConfig::default(), None);
        let report = engine.run(BackupKind::AutoLocal).await.unwrap();
        assert!(report.stored.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_backup_kind_strings() {
        assert_eq!(BackupKind::Manual.as_str(), "manual-backup");
        assert_eq!(BackupKind::AutoLocal.as_str(), "auto-backup");
        assert_eq!(BackupKind::AutoCloud.as_str(), "auto-cloud-backup");
    }
}
