//! Per-item asset store
//!
//! Holds user-uploaded images (company logos, supplier photos) rather than
//! full snapshots. When a blob-store write token is configured the remote
//! store is used; otherwise assets transparently fall back to the local
//! `uploads/` directory. Callers see the same interface either way and the
//! choice is made once, from configuration, at startup.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::{BackupError, BackupResult};
use crate::target::TargetPhase;

const TARGET_NAME: &str = "asset-store";
/// URL prefix under which locally stored assets are served.
pub const LOCAL_URL_PREFIX: &str = "/uploads/";

/// Reference to a stored asset.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    /// Stable URL the UI can embed
    pub url: String,
    /// Stored filename
    pub filename: String,
    /// Size in bytes
    pub size: usize,
}

#[derive(Deserialize)]
struct BlobResponse {
    url: String,
}

/// Remote blob store speaking a simple authenticated PUT/DELETE protocol.
#[derive(Debug, Clone)]
pub struct RemoteBlobStore {
    base_url: String,
    token: String,
}

/// Asset destination, chosen by configuration at startup.
pub enum AssetStore {
    /// Remote object storage (write token configured)
    Remote {
        /// Store endpoint and credential
        store: RemoteBlobStore,
        /// HTTP client
        client: reqwest::Client,
        /// Local directory still holding assets stored before the remote
        /// store was configured
        uploads_dir: PathBuf,
    },
    /// Local `uploads/` directory fallback
    Local {
        /// Directory assets are written into
        uploads_dir: PathBuf,
    },
}

impl AssetStore {
    /// Select the backing store: remote when a token and endpoint are both
    /// configured, the local uploads directory otherwise.
    pub fn from_config(
        token: Option<String>,
        base_url: Option<String>,
        uploads_dir: impl Into<PathBuf>,
    ) -> Self {
        match (token, base_url) {
            (Some(token), Some(base_url)) => {
                info!("🪣 Asset store: remote object storage");
                Self::Remote {
                    store: RemoteBlobStore {
                        base_url: base_url.trim_end_matches('/').to_string(),
                        token,
                    },
                    client: reqwest::Client::new(),
                    uploads_dir: uploads_dir.into(),
                }
            }
            _ => {
                info!("🪣 Asset store: local uploads directory");
                Self::Local {
                    uploads_dir: uploads_dir.into(),
                }
            }
        }
    }

    /// Whether the remote variant is active.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Store asset bytes and return a stable reference.
    #[instrument(skip_all, fields(filename = %filename))]
    pub async fn store(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> BackupResult<StoredAsset> {
        let size = bytes.len();
        match self {
            Self::Remote { store, client, .. } => {
                let phase = TargetPhase::Uploading;
                let response = client
                    .put(format!("{}/{}", store.base_url, filename))
                    .bearer_auth(&store.token)
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(bytes)
                    .send()
                    .await
                    .map_err(|e| BackupError::target(TARGET_NAME, phase, e.to_string()))?;
                if !response.status().is_success() {
                    let status = response.status();
                    return Err(BackupError::target(
                        TARGET_NAME,
                        phase,
                        format!("blob upload returned {}", status),
                    ));
                }
                let blob: BlobResponse = response
                    .json()
                    .await
                    .map_err(|e| BackupError::target(TARGET_NAME, phase, e.to_string()))?;
                Ok(StoredAsset {
                    url: blob.url,
                    filename: filename.to_string(),
                    size,
                })
            }
            Self::Local { uploads_dir } => {
                tokio::fs::create_dir_all(uploads_dir).await?;
                tokio::fs::write(uploads_dir.join(filename), bytes).await?;
                Ok(StoredAsset {
                    url: format!("{}{}", LOCAL_URL_PREFIX, filename),
                    filename: filename.to_string(),
                    size,
                })
            }
        }
    }

    /// Delete a previously stored asset by its URL.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn delete(&self, url: &str) -> BackupResult<()> {
        // Local URLs are always handled locally, even when the remote store
        // is active, so assets stored before a token was configured stay
        // deletable.
        if let Some(filename) = url.strip_prefix(LOCAL_URL_PREFIX) {
            if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
                return Err(crate::error::ValidationError::UnsafeEntryName(url.to_string()).into());
            }
            let path = match self {
                Self::Local { uploads_dir } | Self::Remote { uploads_dir, .. } => {
                    uploads_dir.join(filename)
                }
            };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        match self {
            Self::Remote { store, client, .. } => {
                let phase = TargetPhase::Deleting;
                let response = client
                    .delete(url)
                    .bearer_auth(&store.token)
                    .send()
                    .await
                    .map_err(|e| BackupError::target(TARGET_NAME, phase, e.to_string()))?;
                if !response.status().is_success() {
                    let status = response.status();
                    return Err(BackupError::target(
                        TARGET_NAME,
                        phase,
                        format!("blob deletion returned {}", status),
                    ));
                }
                Ok(())
            }
            Self::Local { .. } => Err(BackupError::other(format!(
                "cannot delete remote asset without a configured store: {}",
                url
            ))),
        }
    }
}
