//! API routes for BossNouadi
//!
//! This module wires the backup, settings and upload handlers into the
//! application router.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, AppState};

/// Largest accepted request body. Backup archives carry the whole database
/// plus attachments, so this is far above the per-image limit.
const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// Create the application router over the shared state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Backup export / restore
        .route(
            "/api/backup",
            get(handlers::export_backup).post(handlers::import_backup),
        )
        .route("/api/backup/run", post(handlers::run_backup))
        .route("/api/backup/status", get(handlers::backup_status))
        .route("/api/backup/auto-cloud", post(handlers::trigger_auto_cloud))
        // Settings
        .route("/api/settings/backup", post(handlers::update_backup_settings))
        // Per-item assets
        .route(
            "/api/upload",
            post(handlers::upload_asset).delete(handlers::delete_asset),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use bossnouadi_backup::{AssetStore, BackupConfig, BackupEngine, BackupScheduler};
    use bossnouadi_backup::scheduler::SchedulerConfig;
    use bossnouadi_db::Storage;

    async fn test_state(dir: &TempDir) -> AppState {
        let storage = Arc::new(
            Storage::open(dir.path().join("bossnouadi.db"))
                .await
                .unwrap(),
        );
        storage
            .create_user("owner@example.com", "s3cret")
            .await
            .unwrap();

        let config = BackupConfig {
            uploads_dir: dir.path().join("uploads"),
            ..BackupConfig::default()
        };
        let engine = Arc::new(BackupEngine::new(storage.clone(), config, None));
        let scheduler = Arc::new(
            BackupScheduler::new(
                engine.clone(),
                SchedulerConfig::new(dir.path().join("sync-state.json")),
            )
            .await,
        );
        let assets = Arc::new(AssetStore::from_config(None, None, dir.path().join("uploads")));

        AppState {
            storage,
            engine,
            scheduler,
            assets,
            auto_cloud_token: Some("cron-secret".to_string()),
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir).await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_backup_status_endpoint() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir).await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backup/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_export_returns_zip_download() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir).await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backup")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/zip"
        );
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(disposition.contains("bossnouadi-backup-"));
    }

    #[tokio::test]
    async fn test_settings_rejects_missing_folder() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir).await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/settings/backup")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"path": "/definitely/not/there"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_settings_persists_valid_folder() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir).await;
        let storage = state.storage.clone();
        let app = create_router(state);

        let backups = dir.path().join("backups");
        std::fs::create_dir_all(&backups).unwrap();
        let body = format!(r#"{{"path": "{}"}}"#, backups.display());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/settings/backup")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let user = storage.first_user().await.unwrap().unwrap();
        assert_eq!(user.backup_path.as_deref(), backups.to_str());
    }

    #[tokio::test]
    async fn test_auto_cloud_requires_token() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir).await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/backup/auto-cloud")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auto_cloud_accepts_configured_token() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir).await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/backup/auto-cloud")
                    .header(header::AUTHORIZATION, "Bearer cron-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_requires_multipart_file() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir).await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upload")
                    .header(
                        header::CONTENT_TYPE,
                        "multipart/form-data; boundary=boundary",
                    )
                    .body(Body::from("--boundary--\r\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
