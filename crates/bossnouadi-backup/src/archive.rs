//! Archive packaging
//!
//! One snapshot is shipped as a single ZIP with a fixed entry layout:
//! the database file at the well-known root name, attachments under the
//! `uploads/` prefix preserving their relative paths, and a JSON metadata
//! entry. Entry names are matched bit-exactly on restore.
//!
//! `unpack` is the untrusted-input boundary of the whole subsystem: entry
//! names that would resolve outside the attachments directory are rejected,
//! not skipped.

use std::io::{Cursor, Read, Write};
use std::path::Component;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{BackupResult, ValidationError};

/// Fixed name of the database entry at the archive root.
pub const DB_ENTRY_NAME: &str = "bossnouadi.db";
/// Fixed prefix of attachment entries.
pub const UPLOADS_PREFIX: &str = "uploads/";
/// Name of the metadata entry.
pub const METADATA_ENTRY_NAME: &str = "backup-info.json";
/// Archive format version written into the metadata entry.
pub const FORMAT_VERSION: &str = "1.0.0";

/// SQLite file header, used to recognize bare database files.
pub const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

/// Metadata descriptor stored inside every archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Archive format version
    pub version: String,
    /// Export instant, ISO-8601
    #[serde(rename = "exportedAt")]
    pub exported_at: String,
    /// Snapshot kind ("manual-backup", "auto-backup", "auto-cloud-backup")
    #[serde(rename = "type")]
    pub kind: String,
    /// Owning account, when known
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// One attachment file captured by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Path relative to the uploads directory, forward slashes
    pub relative_path: String,
    /// File contents
    pub bytes: Vec<u8>,
}

/// How incoming restore bytes should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// A full archive: database + attachments + metadata
    FullArchive,
    /// A bare SQLite file from the legacy export path
    DatabaseOnly,
}

/// Result of unpacking an archive (or a bare database file).
#[derive(Debug)]
pub struct UnpackedArchive {
    /// Database file bytes
    pub db_bytes: Vec<u8>,
    /// Attachments, relative to the uploads directory
    pub attachments: Vec<Attachment>,
    /// Metadata entry, absent for bare database files
    pub metadata: Option<BackupMetadata>,
}

/// Bundle a database snapshot, attachments and metadata into archive bytes.
#[instrument(skip_all, fields(attachments = attachments.len()))]
pub fn pack(
    db_bytes: &[u8],
    attachments: &[Attachment],
    metadata: &BackupMetadata,
) -> BackupResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file(DB_ENTRY_NAME, options)?;
    writer.write_all(db_bytes)?;

    for attachment in attachments {
        writer.start_file(
            format!("{}{}", UPLOADS_PREFIX, attachment.relative_path),
            options,
        )?;
        writer.write_all(&attachment.bytes)?;
    }

    writer.start_file(METADATA_ENTRY_NAME, options)?;
    writer.write_all(serde_json::to_string_pretty(metadata)?.as_bytes())?;

    let cursor = writer.finish()?;
    debug!("📦 Packed archive ({} bytes)", cursor.get_ref().len());
    Ok(cursor.into_inner())
}

/// Unpack archive bytes, or accept a bare database file in
/// [`RestoreMode::DatabaseOnly`].
#[instrument(skip_all, fields(len = bytes.len(), ?mode))]
pub fn unpack(bytes: &[u8], mode: RestoreMode) -> BackupResult<UnpackedArchive> {
    if mode == RestoreMode::DatabaseOnly {
        if !bytes.starts_with(SQLITE_MAGIC) {
            return Err(ValidationError::InvalidArchive(
                "input is not a SQLite database file".to_string(),
            )
            .into());
        }
        return Ok(UnpackedArchive {
            db_bytes: bytes.to_vec(),
            attachments: Vec::new(),
            metadata: None,
        });
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        ValidationError::InvalidArchive(format!("not a readable ZIP archive: {}", e))
    })?;

    let mut db_bytes = None;
    let mut attachments = Vec::new();
    let mut metadata = None;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();

        if name == DB_ENTRY_NAME {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            db_bytes = Some(buf);
        } else if name == METADATA_ENTRY_NAME {
            let mut buf = String::new();
            entry.read_to_string(&mut buf)?;
            metadata = Some(serde_json::from_str(&buf)?);
        } else if let Some(relative) = name.strip_prefix(UPLOADS_PREFIX) {
            let relative = safe_relative_path(relative)?;
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            attachments.push(Attachment {
                relative_path: relative,
                bytes: buf,
            });
        } else {
            // Unknown top-level entries are rejected rather than silently
            // written somewhere unexpected.
            return Err(ValidationError::UnsafeEntryName(name).into());
        }
    }

    let db_bytes = db_bytes.ok_or_else(|| {
        ValidationError::InvalidArchive(format!("{} entry missing", DB_ENTRY_NAME))
    })?;
    if !db_bytes.starts_with(SQLITE_MAGIC) {
        return Err(ValidationError::InvalidArchive(
            "database entry is not a SQLite file".to_string(),
        )
        .into());
    }

    Ok(UnpackedArchive {
        db_bytes,
        attachments,
        metadata,
    })
}

/// Validate an attachment entry path: relative, no `..`, no absolute or
/// prefixed components. Returns the normalized forward-slash path.
fn safe_relative_path(relative: &str) -> Result<String, ValidationError> {
    if relative.is_empty() || relative.contains('\\') {
        return Err(ValidationError::UnsafeEntryName(relative.to_string()));
    }
    let path = std::path::Path::new(relative);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(ValidationError::UnsafeEntryName(relative.to_string())),
        }
    }
    Ok(relative.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;

    fn sqlite_bytes() -> Vec<u8> {
        let mut bytes = SQLITE_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 84]);
        bytes
    }

    fn metadata() -> BackupMetadata {
        BackupMetadata {
            version: FORMAT_VERSION.to_string(),
            exported_at: "2026-08-25T10:00:00Z".to_string(),
            kind: "manual-backup".to_string(),
            user_id: Some("u1".to_string()),
        }
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let db = sqlite_bytes();
        let attachments = vec![
            Attachment {
                relative_path: "logo.png".to_string(),
                bytes: vec![1, 2, 3],
            },
            Attachment {
                relative_path: "companies/acme.jpg".to_string(),
                bytes: vec![4, 5, 6, 7],
            },
        ];
        let meta = metadata();

        let archive = pack(&db, &attachments, &meta).unwrap();
        let unpacked = unpack(&archive, RestoreMode::FullArchive).unwrap();

        assert_eq!(unpacked.db_bytes, db);
        assert_eq!(unpacked.attachments, attachments);
        assert_eq!(unpacked.metadata, Some(meta));
    }

    #[test]
    fn test_unpack_rejects_path_traversal() {
        let db = sqlite_bytes();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();
        writer.start_file(DB_ENTRY_NAME, options).unwrap();
        writer.write_all(&db).unwrap();
        writer
            .start_file("uploads/../../etc/passwd", options)
            .unwrap();
        writer.write_all(b"root:x:0:0").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = unpack(&bytes, RestoreMode::FullArchive).unwrap_err();
        assert!(matches!(
            err,
            BackupError::Validation(ValidationError::UnsafeEntryName(_))
        ));
    }

    #[test]
    fn test_unpack_rejects_absolute_entry() {
        let db = sqlite_bytes();
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();
        writer.start_file(DB_ENTRY_NAME, options).unwrap();
        writer.write_all(&db).unwrap();
        writer.start_file("uploads//etc/shadow", options).unwrap();
        writer.write_all(b"x").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert!(unpack(&bytes, RestoreMode::FullArchive).is_err());
    }

    #[test]
    fn test_unpack_requires_database_entry() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(METADATA_ENTRY_NAME, FileOptions::default())
            .unwrap();
        writer
            .write_all(serde_json::to_string(&metadata()).unwrap().as_bytes())
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = unpack(&bytes, RestoreMode::FullArchive).unwrap_err();
        assert!(matches!(
            err,
            BackupError::Validation(ValidationError::InvalidArchive(_))
        ));
    }

    #[test]
    fn test_database_only_accepts_bare_sqlite_file() {
        let db = sqlite_bytes();
        let unpacked = unpack(&db, RestoreMode::DatabaseOnly).unwrap();
        assert_eq!(unpacked.db_bytes, db);
        assert!(unpacked.attachments.is_empty());
        assert!(unpacked.metadata.is_none());
    }

    #[test]
    fn test_database_only_rejects_garbage() {
        let err = unpack(b"not a database", RestoreMode::DatabaseOnly).unwrap_err();
        assert!(matches!(err, BackupError::Validation(_)));
    }
}
