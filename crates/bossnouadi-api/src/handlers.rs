//! Request handlers for the BossNouadi API
//!
//! All handlers operate on the shared [`AppState`] and answer JSON, except
//! the backup export which streams the archive bytes back as a download.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use bossnouadi_backup::archive::{RestoreMode, SQLITE_MAGIC};
use bossnouadi_backup::target::AssetStore;
use bossnouadi_backup::{
    restore, BackupEngine, BackupError, BackupKind, BackupScheduler, LocalFolderTarget,
    ValidationError,
};
use bossnouadi_common::{time, NouadiError};
use bossnouadi_db::Storage;

/// Largest accepted per-item image upload, in bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Live database handle
    pub storage: Arc<Storage>,
    /// Backup engine
    pub engine: Arc<BackupEngine>,
    /// Backup scheduler
    pub scheduler: Arc<BackupScheduler>,
    /// Per-item asset store
    pub assets: Arc<AssetStore>,
    /// Bearer token expected on the auto-cloud trigger endpoint
    pub auto_cloud_token: Option<String>,
}

/// Error envelope turned into a JSON response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "message": self.message })),
        )
            .into_response()
    }
}

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        let status = match &err {
            BackupError::Validation(_) => StatusCode::BAD_REQUEST,
            BackupError::Storage(NouadiError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<NouadiError> for ApiError {
    fn from(err: NouadiError) -> Self {
        let status = match &err {
            NouadiError::NotFound(_) => StatusCode::NOT_FOUND,
            NouadiError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /api/backup` — export a fresh snapshot archive as a download.
#[instrument(skip_all)]
pub async fn export_backup(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (name, bytes) = state.engine.export_archive(BackupKind::Manual).await?;
    info!("📦 Exporting backup archive '{}' ({} bytes)", name, bytes.len());

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", name),
        ),
    ];
    Ok((headers, bytes).into_response())
}

/// Result body of a completed restore.
#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    /// Always true when this body is returned
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Location of the rollback copy, when one was made
    #[serde(rename = "rollbackPath", skip_serializing_if = "Option::is_none")]
    pub rollback_path: Option<String>,
    /// Attachment files written back
    #[serde(rename = "attachmentsRestored")]
    pub attachments_restored: usize,
}

/// `POST /api/backup` — restore from an uploaded archive or bare database
/// file. The restore mode is detected from the file contents, not the
/// filename.
#[instrument(skip_all)]
pub async fn import_backup(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RestoreResponse>, ApiError> {
    let mut upload: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            upload = Some(bytes.to_vec());
            break;
        }
    }
    let bytes = upload.ok_or_else(|| ApiError::bad_request("Missing 'file' form field"))?;

    let mode = if bytes.starts_with(SQLITE_MAGIC) {
        RestoreMode::DatabaseOnly
    } else if bytes.starts_with(b"PK") {
        RestoreMode::FullArchive
    } else {
        return Err(ApiError::bad_request(
            "Unrecognized backup file: expected a ZIP archive or a SQLite database",
        ));
    };

    let outcome = restore::restore(
        &state.storage,
        &state.engine.config().uploads_dir,
        &bytes,
        mode,
    )
    .await
    .map_err(|e| {
        error!("❌ Restore failed: {}", e);
        ApiError::from(e)
    })?;

    Ok(Json(RestoreResponse {
        success: true,
        message: "Backup restored".to_string(),
        rollback_path: outcome
            .rollback_path
            .map(|p| p.display().to_string()),
        attachments_restored: outcome.attachments_restored,
    }))
}

/// `POST /api/backup/run` — run a manual backup to every configured
/// destination now.
#[instrument(skip_all)]
pub async fn run_backup(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let report = state.scheduler.run_manual().await?;
    Ok(Json(json!({
        "success": true,
        "archiveName": report.archive_name,
        "stored": report.stored,
        "failures": report
            .failures
            .iter()
            .map(|(target, reason)| json!({ "target": target, "reason": reason }))
            .collect::<Vec<_>>(),
    })))
}

/// `GET /api/backup/status` — configured destinations, latest cloud
/// snapshot and the current sync state.
#[instrument(skip_all)]
pub async fn backup_status(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let engine = state.engine.status().await?;
    let sync = state.scheduler.status().await;
    let auto_cloud = state.scheduler.auto_cloud_enabled().await;

    Ok(Json(json!({
        "localFolder": engine.local_folder,
        "cloudConfigured": engine.cloud_configured,
        "latestCloudSnapshot": engine.latest_cloud_snapshot,
        "autoCloudBackup": auto_cloud,
        "sync": sync,
    })))
}

/// `POST /api/backup/auto-cloud` — token-authenticated trigger for a
/// cloud-directed backup run, called by the client's daily sync check.
#[instrument(skip_all)]
pub async fn trigger_auto_cloud(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let expected = state.auto_cloud_token.as_deref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Automatic cloud backup is not configured",
        )
    })?;

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented != Some(expected) {
        warn!("🔒 Rejected auto-cloud trigger with missing or wrong token");
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid token"));
    }

    // The scheduler's guard keeps this from overlapping a timer, mutation
    // or manual run in the same process.
    let report = state.scheduler.run_auto_cloud().await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Backup stored at {:?}", report.stored),
        "timestamp": time::now_rfc3339(),
    })))
}

/// Settings accepted by `POST /api/settings/backup`. Both fields are
/// optional; only the ones present are applied.
#[derive(Debug, Deserialize)]
pub struct BackupSettingsRequest {
    /// Local-folder backup destination
    pub path: Option<String>,
    /// Automatic cloud backup switch
    #[serde(rename = "autoCloudBackup")]
    pub auto_cloud_backup: Option<bool>,
}

/// `POST /api/settings/backup` — validate and persist backup settings.
///
/// Path validation failures answer with distinct messages so the settings
/// screen can show the operator exactly what is wrong.
#[instrument(skip_all)]
pub async fn update_backup_settings(
    State(state): State<AppState>,
    Json(request): Json<BackupSettingsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(path) = &request.path {
        LocalFolderTarget::validate_dir(Path::new(path)).map_err(|e| {
            let message = match e {
                ValidationError::PathNotFound(_) => "Backup folder does not exist",
                ValidationError::NotADirectory(_) => "Backup path is not a directory",
                ValidationError::NotWritable(_) => "Backup folder is not writable",
                _ => "Backup path is invalid",
            };
            ApiError::bad_request(message)
        })?;

        let user = state
            .storage
            .first_user()
            .await?
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "No account configured"))?;
        state.storage.set_backup_path(&user.email, path).await?;
        info!("⚙️ Backup folder set to '{}'", path);
    }

    if let Some(enabled) = request.auto_cloud_backup {
        state.scheduler.set_auto_cloud(enabled).await?;
        info!("⚙️ Automatic cloud backup {}", if enabled { "enabled" } else { "disabled" });
    }

    Ok(Json(json!({ "success": true })))
}

/// Result body of a completed asset upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Always true when this body is returned
    pub success: bool,
    /// Stable URL the UI can embed
    pub url: String,
    /// Stored filename
    pub filename: String,
    /// Size in bytes
    pub size: usize,
}

/// `POST /api/upload` — store a per-item image (logo, photo).
#[instrument(skip_all)]
pub async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(ApiError::bad_request("Only image uploads are accepted"));
        }

        let original = field.file_name().unwrap_or("image").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Image exceeds the 5 MB limit",
            ));
        }

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let stored_name = format!("company-{}-{}", millis, sanitize_filename(&original));

        let asset = state
            .assets
            .store(&stored_name, bytes.to_vec(), &content_type)
            .await?;
        state.scheduler.notify_mutation();

        return Ok(Json(UploadResponse {
            success: true,
            url: asset.url,
            filename: asset.filename,
            size: asset.size,
        }));
    }

    Err(ApiError::bad_request("Missing 'file' form field"))
}

/// Body of `DELETE /api/upload`.
#[derive(Debug, Deserialize)]
pub struct DeleteAssetRequest {
    /// URL returned by a previous upload
    pub url: String,
}

/// `DELETE /api/upload` — remove a previously uploaded asset by URL.
#[instrument(skip_all)]
pub async fn delete_asset(
    State(state): State<AppState>,
    Json(request): Json<DeleteAssetRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.assets.delete(&request.url).await?;
    state.scheduler.notify_mutation();
    Ok(Json(json!({ "success": true })))
}

/// Strip any path components and replace unsafe characters, keeping the
/// extension readable.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let safe: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if safe.trim_matches(['.', '-']).is_empty() {
        "image".to_string()
    } else {
        safe
    }
}
