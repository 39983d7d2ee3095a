//! Restore coordination
//!
//! Swaps a snapshot into the live location. The incoming bytes are fully
//! validated before the live database is touched, the storage handle is
//! closed for the swap, and a timestamped rollback copy of the current
//! database is always made first and never deleted automatically. After a
//! failure past that point the error carries the rollback location;
//! recovery from there is an explicit operator action, never an automated
//! guess.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, instrument, warn};

use bossnouadi_db::Storage;

use crate::archive::{self, RestoreMode, UnpackedArchive};
use crate::error::{BackupError, BackupResult};

/// Result of a completed restore.
#[derive(Debug)]
pub struct RestoreOutcome {
    /// Rollback copy of the pre-restore database, if one existed to copy
    pub rollback_path: Option<PathBuf>,
    /// Number of attachment files written
    pub attachments_restored: usize,
}

/// Replace the live database (and, for full archives, the uploads
/// directory contents) with the given snapshot bytes.
#[instrument(skip_all, fields(?mode, len = bytes.len()))]
pub async fn restore(
    storage: &Storage,
    uploads_dir: &Path,
    bytes: &[u8],
    mode: RestoreMode,
) -> BackupResult<RestoreOutcome> {
    // Validate everything up front: a corrupt or unsafe archive must fail
    // before the live database is touched.
    let unpacked: UnpackedArchive = archive::unpack(bytes, mode)?;

    info!("♻️ Starting restore ({} attachments)", unpacked.attachments.len());
    storage.close().await;

    let db_path = storage.db_path().to_path_buf();
    let rollback_path = make_rollback_copy(&db_path).await?;

    if let Err(e) = replace_database(&db_path, &unpacked.db_bytes).await {
        return Err(BackupError::restore(
            format!("writing restored database: {}", e),
            rollback_path,
        ));
    }

    let mut attachments_restored = 0;
    for attachment in &unpacked.attachments {
        let dest = uploads_dir.join(&attachment.relative_path);
        let write = async {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&dest, &attachment.bytes).await
        };
        if let Err(e) = write.await {
            return Err(BackupError::restore(
                format!("writing attachment '{}': {}", attachment.relative_path, e),
                rollback_path,
            ));
        }
        attachments_restored += 1;
    }

    info!(
        "✅ Restore completed, rollback copy at {:?}",
        rollback_path
    );
    Ok(RestoreOutcome {
        rollback_path,
        attachments_restored,
    })
}

/// Copy the current live database aside with a timestamped suffix.
///
/// The copy is kept for manual recovery and is never removed by the
/// system, even on success.
async fn make_rollback_copy(db_path: &Path) -> BackupResult<Option<PathBuf>> {
    if !db_path.exists() {
        return Ok(None);
    }

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let rollback = db_path.with_file_name(format!(
        "{}.backup-{}",
        db_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "bossnouadi.db".to_string()),
        millis
    ));
    tokio::fs::copy(db_path, &rollback).await?;
    info!("🛟 Rollback copy created at {:?}", rollback);
    Ok(Some(rollback))
}

/// Write the restored database into the live path via rename, and drop any
/// stale WAL/SHM sidecars left over from the closed pool.
async fn replace_database(db_path: &Path, db_bytes: &[u8]) -> std::io::Result<()> {
    for suffix in ["-wal", "-shm"] {
        let sidecar = PathBuf::from(format!("{}{}", db_path.display(), suffix));
        match tokio::fs::remove_file(&sidecar).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("⚠️ Could not remove sidecar {:?}: {}", sidecar, e),
        }
    }

    let incoming = db_path.with_extension("db.incoming");
    tokio::fs::write(&incoming, db_bytes).await?;
    tokio::fs::rename(&incoming, db_path).await
}
