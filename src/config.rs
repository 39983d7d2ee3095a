//! Server configuration
//!
//! Loaded from an optional TOML file merged with `BOSSNOUADI_*` environment
//! variables (double underscore for nested keys, e.g.
//! `BOSSNOUADI_BACKUP__MAX_BACKUPS=14`).

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use bossnouadi_backup::{BackupConfig, DriveAuth};
use bossnouadi_common::{NouadiError, Result};

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address
    pub address: IpAddr,
    /// Listen port
    pub port: u16,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Directory holding per-item uploads
    pub uploads_dir: PathBuf,
    /// Default log filter, overridden by `RUST_LOG`
    pub log: String,
    /// Bearer token accepted on the auto-cloud trigger endpoint
    pub auto_cloud_token: Option<String>,
    /// Backup engine settings
    pub backup: BackupSettings,
    /// Drive credential settings
    pub drive: DriveSettings,
    /// Remote blob store settings for per-item assets
    pub blob: BlobSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            database_path: PathBuf::from("data/bossnouadi.db"),
            uploads_dir: PathBuf::from("data/uploads"),
            log: "info".to_string(),
            auto_cloud_token: None,
            backup: BackupSettings::default(),
            drive: DriveSettings::default(),
            blob: BlobSettings::default(),
        }
    }
}

/// Backup engine and scheduler settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Whether backups run at all
    pub enabled: bool,
    /// Snapshots kept per destination
    pub max_backups: usize,
    /// Snapshot filename prefix
    pub file_prefix: String,
    /// Dedicated folder name on the drive
    pub drive_folder: String,
    /// File persisting scheduler state across restarts
    pub state_path: PathBuf,
    /// Seconds between automatic backup checks
    pub interval_secs: u64,
    /// Connectivity probe URL override
    pub probe_url: Option<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        let defaults = BackupConfig::default();
        Self {
            enabled: defaults.enabled,
            max_backups: defaults.max_backups,
            file_prefix: defaults.file_prefix,
            drive_folder: defaults.drive_folder,
            state_path: PathBuf::from("data/sync-state.json"),
            interval_secs: 3600,
            probe_url: None,
        }
    }
}

/// Drive credential: either a linked-account refresh token or a
/// service-account key (inline JSON or a key file). Absent entirely when no
/// cloud backup is wanted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DriveSettings {
    /// OAuth client id
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Long-lived offline refresh token
    pub refresh_token: Option<String>,
    /// Inline service-account key JSON
    pub service_account_key: Option<String>,
    /// Path to a service-account key file
    pub service_account_key_file: Option<PathBuf>,
}

/// Remote blob store credential for per-item assets. When either field is
/// absent, assets fall back to the local uploads directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BlobSettings {
    /// Write token
    pub token: Option<String>,
    /// Store base URL
    pub base_url: Option<String>,
}

impl Config {
    /// Load configuration from the optional TOML file merged with
    /// `BOSSNOUADI_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("BOSSNOUADI_").split("__"))
            .extract()
            .map_err(|e| NouadiError::config(e.to_string()))
    }

    /// Backup engine configuration derived from these settings.
    pub fn backup_config(&self) -> BackupConfig {
        BackupConfig {
            enabled: self.backup.enabled,
            uploads_dir: self.uploads_dir.clone(),
            max_backups: self.backup.max_backups,
            file_prefix: self.backup.file_prefix.clone(),
            drive_folder: self.backup.drive_folder.clone(),
        }
    }

    /// Resolve the configured drive credential, if any.
    ///
    /// A refresh token wins over a service-account key when both are
    /// present; the inline key wins over the key file.
    pub fn drive_auth(&self) -> Result<Option<DriveAuth>> {
        let drive = &self.drive;
        if let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            drive.client_id.clone(),
            drive.client_secret.clone(),
            drive.refresh_token.clone(),
        ) {
            return Ok(Some(DriveAuth::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            }));
        }

        if let Some(json) = &drive.service_account_key {
            let auth = DriveAuth::service_account_from_json(json)
                .map_err(|e| NouadiError::config(e.to_string()))?;
            return Ok(Some(auth));
        }
        if let Some(path) = &drive.service_account_key_file {
            let auth = DriveAuth::service_account_from_file(path)
                .map_err(|e| NouadiError::config(e.to_string()))?;
            return Ok(Some(auth));
        }

        Ok(None)
    }
}
