//! Backup targets
//!
//! Every destination implements the same capability contract: store a
//! snapshot under a name, list snapshot names, fetch one back, delete one.
//! The concrete destination (local folder, OAuth drive, object store for
//! per-item assets) is selected by configuration at startup, never by
//! duck-typed branching at call sites.

use std::fmt;

use async_trait::async_trait;

use crate::error::BackupResult;

pub mod assets;
pub mod drive;
pub mod local;

pub use assets::{AssetStore, StoredAsset};
pub use drive::{DriveAuth, DriveTarget};
pub use local::LocalFolderTarget;

/// Step of a single backup attempt against a target.
///
/// `Idle → Authenticating → LocatingFolder → LocatingFile → Uploading →
/// Done`; any step's failure short-circuits the rest and is carried in the
/// resulting [`BackupError::Target`](crate::error::BackupError::Target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPhase {
    /// Validating the destination before any write
    Validating,
    /// Acquiring credentials
    Authenticating,
    /// Finding or creating the backup folder
    LocatingFolder,
    /// Finding an existing snapshot object by name
    LocatingFile,
    /// Writing snapshot bytes
    Uploading,
    /// Enumerating stored snapshots
    Listing,
    /// Reading snapshot bytes back
    Fetching,
    /// Removing a stored snapshot
    Deleting,
}

impl fmt::Display for TargetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetPhase::Validating => "validating",
            TargetPhase::Authenticating => "authenticating",
            TargetPhase::LocatingFolder => "locating folder",
            TargetPhase::LocatingFile => "locating file",
            TargetPhase::Uploading => "uploading",
            TargetPhase::Listing => "listing",
            TargetPhase::Fetching => "fetching",
            TargetPhase::Deleting => "deleting",
        };
        write!(f, "{}", s)
    }
}

/// Common capability contract for snapshot destinations.
#[async_trait]
pub trait BackupTarget: Send + Sync {
    /// Stable target name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Store snapshot bytes under `name`, replacing any same-named snapshot.
    async fn store(&self, name: &str, bytes: &[u8]) -> BackupResult<()>;

    /// List stored snapshot names matching the snapshot naming convention.
    async fn list(&self) -> BackupResult<Vec<String>>;

    /// Read a stored snapshot back.
    async fn fetch(&self, name: &str) -> BackupResult<Vec<u8>>;

    /// Delete a stored snapshot.
    async fn delete(&self, name: &str) -> BackupResult<()>;
}

/// Whether `name` follows the `<prefix>-backup-YYYY-MM-DD.zip` convention.
pub(crate) fn is_snapshot_name(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let Some(date) = rest
        .strip_prefix("-backup-")
        .and_then(|r| r.strip_suffix(".zip"))
    else {
        return false;
    };
    date.len() == 10
        && date
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_name_pattern() {
        assert!(is_snapshot_name("bossnouadi-backup-2026-08-25.zip", "bossnouadi"));
        assert!(!is_snapshot_name("bossnouadi-backup-2026-8-25.zip", "bossnouadi"));
        assert!(!is_snapshot_name("other-backup-2026-08-25.zip", "bossnouadi"));
        assert!(!is_snapshot_name("bossnouadi-backup-2026-08-25.db", "bossnouadi"));
        assert!(!is_snapshot_name("bossnouadi-backup-.zip", "bossnouadi"));
    }
}
