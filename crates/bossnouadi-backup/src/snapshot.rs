//! Snapshot production
//!
//! Takes a transactionally consistent copy of the live database via the
//! storage layer's `VACUUM INTO` primitive plus the full contents of the
//! uploads directory. The temporary copy file is owned exclusively by this
//! module and is removed on success and failure alike.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, instrument, warn};

use bossnouadi_db::Storage;

use crate::archive::Attachment;
use crate::error::{BackupError, BackupResult};

/// A consistent point-in-time copy of the database plus attachments.
#[derive(Debug)]
pub struct Snapshot {
    /// Complete database file bytes
    pub db_bytes: Vec<u8>,
    /// Every file under the uploads directory
    pub attachments: Vec<Attachment>,
}

/// Temporary copy file, deleted when dropped.
struct TempCopy {
    path: PathBuf,
}

impl Drop for TempCopy {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("⚠️ Failed to remove temporary snapshot file {:?}: {}", self.path, e);
            }
        }
    }
}

/// Produce a snapshot of the live database and uploads directory.
#[instrument(skip_all)]
pub async fn produce_snapshot(storage: &Storage, uploads_dir: &Path) -> BackupResult<Snapshot> {
    info!("📸 Producing database snapshot");

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let temp_dir = storage
        .db_path()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let temp = TempCopy {
        path: temp_dir.join(format!("temp-auto-backup-{}.db", millis)),
    };

    storage
        .vacuum_into(&temp.path)
        .await
        .map_err(|e| BackupError::snapshot(e.to_string()))?;

    let db_bytes = tokio::fs::read(&temp.path)
        .await
        .map_err(|e| BackupError::snapshot(format!("reading snapshot copy: {}", e)))?;

    let attachments = collect_attachments(uploads_dir).await?;
    info!(
        "✅ Snapshot produced ({} bytes, {} attachments)",
        db_bytes.len(),
        attachments.len()
    );

    Ok(Snapshot {
        db_bytes,
        attachments,
    })
}

/// Enumerate every file under `uploads_dir`. A missing directory is not an
/// error; it simply yields zero attachments.
async fn collect_attachments(uploads_dir: &Path) -> BackupResult<Vec<Attachment>> {
    let mut attachments = Vec::new();
    if !uploads_dir.is_dir() {
        debug!("📂 No uploads directory at {:?}", uploads_dir);
        return Ok(attachments);
    }

    let mut pending = vec![uploads_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }

            let relative = path
                .strip_prefix(uploads_dir)
                .map_err(|e| BackupError::other(e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            attachments.push(Attachment {
                relative_path: relative,
                bytes: tokio::fs::read(&path).await?,
            });
        }
    }

    // Stable order keeps archives byte-comparable across runs.
    attachments.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(attachments)
}
