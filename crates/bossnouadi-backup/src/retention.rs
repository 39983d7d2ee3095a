//! Retention enforcement
//!
//! Keeps the newest N snapshots at a target and deletes the rest. Snapshot
//! names embed a zero-padded `YYYY-MM-DD` token, so a plain lexicographic
//! sort is the date order. Retention runs only after the new snapshot was
//! confirmed stored, and a failed deletion is logged without failing the
//! run or the remaining deletions.

use tracing::{info, instrument, warn};

use crate::target::BackupTarget;

/// Snapshots kept per target by default.
pub const DEFAULT_MAX_BACKUPS: usize = 30;

/// Delete the oldest snapshots beyond `max_count`. Returns how many were
/// actually deleted. Never fails the overall backup run.
#[instrument(skip_all, fields(target = target.name(), max_count))]
pub async fn enforce_retention(target: &dyn BackupTarget, max_count: usize) -> usize {
    let mut names = match target.list().await {
        Ok(names) => names,
        Err(e) => {
            warn!("⚠️ Retention listing failed on '{}': {}", target.name(), e);
            return 0;
        }
    };

    if names.len() <= max_count {
        return 0;
    }

    names.sort();
    let excess = names.len() - max_count;
    let mut deleted = 0;
    for name in names.iter().take(excess) {
        match target.delete(name).await {
            Ok(()) => {
                info!("🗑 Removed old snapshot '{}' from '{}'", name, target.name());
                deleted += 1;
            }
            Err(e) => {
                warn!("⚠️ Failed to delete old snapshot '{}': {}", name, e);
            }
        }
    }

    deleted
}
