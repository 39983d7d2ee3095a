//! Scheduled and triggered backup runs
//!
//! Three trigger sources feed the same entry point: explicit operator
//! action (always runs), a post-mutation hook (fire-and-forget) and an
//! hourly timer. Automatic runs are de-duplicated per UTC calendar day via
//! a persisted marker, at most one run executes at a time per process, and
//! cloud-directed automatic runs are skipped while the device is offline.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use bossnouadi_common::time;

use crate::error::{BackupError, BackupResult};
use crate::{BackupEngine, BackupKind, RunReport};

const DEFAULT_PROBE_URL: &str = "https://www.gstatic.com/generate_204";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What caused a backup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Explicit operator action; bypasses the daily guard
    Manual,
    /// Post-mutation hook, best effort
    Mutation,
    /// Periodic timer tick
    Timer,
}

/// Result of an automatic backup attempt.
#[derive(Debug)]
pub enum RunOutcome {
    /// A run executed; the report lists per-target results
    Completed(RunReport),
    /// The attempt was dropped, with the reason
    Skipped(&'static str),
}

/// Transient per-process sync state, exposed to the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    /// Whether a run is currently executing
    #[serde(rename = "isSyncing")]
    pub is_syncing: bool,
    /// Completion instant of the last successful run
    #[serde(rename = "lastSync")]
    pub last_sync: Option<DateTime<Utc>>,
    /// Failure reason of the last failed run
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

/// State that survives restarts: the daily-dedup marker and the cloud
/// auto-backup switch (kept in browser storage in earlier deployments).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    last_auto_backup: Option<DateTime<Utc>>,
    auto_cloud_backup: bool,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Timer period for automatic checks
    pub interval: Duration,
    /// Path of the persisted state file
    pub state_path: PathBuf,
    /// URL probed to detect connectivity
    pub probe_url: String,
}

impl SchedulerConfig {
    /// Hourly checks, state next to the given data directory.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            interval: Duration::from_secs(3600),
            state_path: state_path.into(),
            probe_url: DEFAULT_PROBE_URL.to_string(),
        }
    }
}

/// Resets the in-flight flag when a run finishes, success or failure.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the re-entrancy guard and the daily-dedup marker for one engine.
pub struct BackupScheduler {
    engine: Arc<BackupEngine>,
    config: SchedulerConfig,
    running: AtomicBool,
    state: Mutex<PersistedState>,
    status: Mutex<SyncStatus>,
    handle: Mutex<Option<JoinHandle<()>>>,
    client: reqwest::Client,
}

impl BackupScheduler {
    /// Create a scheduler, loading any persisted state from disk.
    pub async fn new(engine: Arc<BackupEngine>, config: SchedulerConfig) -> Self {
        let state = match tokio::fs::read_to_string(&config.state_path).await {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("⚠️ Discarding unreadable scheduler state: {}", e);
                PersistedState::default()
            }),
            Err(_) => PersistedState::default(),
        };

        Self {
            engine,
            config,
            running: AtomicBool::new(false),
            state: Mutex::new(state),
            status: Mutex::new(SyncStatus::default()),
            handle: Mutex::new(None),
            client: reqwest::Client::new(),
        }
    }

    /// Current transient sync status.
    pub async fn status(&self) -> SyncStatus {
        self.status.lock().await.clone()
    }

    /// Whether the operator enabled automatic cloud backups.
    pub async fn auto_cloud_enabled(&self) -> bool {
        self.state.lock().await.auto_cloud_backup
    }

    /// Toggle automatic cloud backups and persist the choice.
    pub async fn set_auto_cloud(&self, enabled: bool) -> BackupResult<()> {
        let mut state = self.state.lock().await;
        state.auto_cloud_backup = enabled;
        self.persist(&state).await
    }

    /// Start the periodic timer loop.
    #[instrument(skip_all)]
    pub async fn start(self: &Arc<Self>) -> BackupResult<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Err(BackupError::other("Scheduler already running"));
        }

        let scheduler = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.config.interval);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                debug!("⏰ Timer backup check");
                match scheduler.maybe_run(Utc::now(), Trigger::Timer).await {
                    Ok(RunOutcome::Completed(report)) => {
                        info!("✅ Timer backup stored at {:?}", report.stored);
                    }
                    Ok(RunOutcome::Skipped(reason)) => debug!("🔕 Timer backup skipped: {}", reason),
                    Err(e) => error!("❌ Timer backup failed: {}", e),
                }
            }
        }));

        info!("⏰ Backup scheduler started");
        Ok(())
    }

    /// Stop the periodic timer loop.
    #[instrument(skip_all)]
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            let _ = handle.await;
            info!("🛑 Backup scheduler stopped");
        }
    }

    /// Fire-and-forget trigger invoked after any data-mutating operation.
    ///
    /// Runs detached; failures are logged and never observed by the caller
    /// of the mutating operation.
    pub fn notify_mutation(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            match scheduler.maybe_run(Utc::now(), Trigger::Mutation).await {
                Ok(RunOutcome::Completed(report)) => {
                    info!("✅ Post-mutation backup stored at {:?}", report.stored);
                }
                Ok(RunOutcome::Skipped(reason)) => {
                    debug!("🔕 Post-mutation backup skipped: {}", reason)
                }
                Err(e) => error!("❌ Post-mutation backup failed: {}", e),
            }
        });
    }

    /// Run a manual backup now, bypassing the daily guard.
    ///
    /// Still subject to the re-entrancy guard: a manual request while a run
    /// is in flight is rejected with a human-readable reason.
    #[instrument(skip_all)]
    pub async fn run_manual(&self) -> BackupResult<RunReport> {
        match self.maybe_run(Utc::now(), Trigger::Manual).await? {
            RunOutcome::Completed(report) => Ok(report),
            RunOutcome::Skipped(reason) => Err(BackupError::other(reason)),
        }
    }

    /// Decide whether a backup is due and run it.
    #[instrument(skip_all, fields(?trigger))]
    pub async fn maybe_run(&self, now: DateTime<Utc>, trigger: Trigger) -> BackupResult<RunOutcome> {
        if trigger != Trigger::Manual {
            let state = self.state.lock().await;
            if let Some(last) = state.last_auto_backup {
                if time::same_utc_day(last, now) {
                    return Ok(RunOutcome::Skipped("already backed up today"));
                }
            }
        }

        // At most one run per process; a trigger during a run is dropped,
        // not queued.
        let Some(_guard) = self.try_begin() else {
            return Ok(RunOutcome::Skipped("a backup is already running"));
        };
        self.status.lock().await.is_syncing = true;

        let result = self.execute(now, trigger).await;

        let mut status = self.status.lock().await;
        status.is_syncing = false;
        match &result {
            Ok(RunOutcome::Completed(_)) => {
                status.last_sync = Some(now);
                status.last_error = None;
            }
            Ok(RunOutcome::Skipped(_)) => {}
            Err(e) => status.last_error = Some(e.to_string()),
        }

        result
    }

    /// Run a cloud-directed backup now, on behalf of the external trigger
    /// endpoint. The caller performs its own daily de-duplication, so only
    /// the re-entrancy guard applies.
    #[instrument(skip_all)]
    pub async fn run_auto_cloud(&self) -> BackupResult<RunReport> {
        let Some(_guard) = self.try_begin() else {
            return Err(BackupError::other("a backup is already running"));
        };
        self.status.lock().await.is_syncing = true;

        let now = Utc::now();
        let result = self.engine.run(BackupKind::AutoCloud).await;

        let mut status = self.status.lock().await;
        status.is_syncing = false;
        match &result {
            Ok(_) => {
                status.last_sync = Some(now);
                status.last_error = None;
            }
            Err(e) => status.last_error = Some(e.to_string()),
        }

        result
    }

    /// Claim the in-flight slot, or return `None` when a run is already
    /// executing.
    fn try_begin(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunningGuard(&self.running))
    }

    async fn execute(&self, now: DateTime<Utc>, trigger: Trigger) -> BackupResult<RunOutcome> {
        if trigger == Trigger::Manual {
            let report = self.engine.run(BackupKind::Manual).await?;
            return Ok(RunOutcome::Completed(report));
        }

        let mut merged = RunReport::default();
        let mut ran_anything = false;

        match self.engine.run(BackupKind::AutoLocal).await {
            Ok(report) => {
                ran_anything |= !report.stored.is_empty();
                merged.archive_name = report.archive_name;
                merged.stored.extend(report.stored);
                merged.failures.extend(report.failures);
            }
            Err(e) => {
                error!("❌ Automatic local backup failed: {}", e);
                merged.failures.push(("local-folder".to_string(), e.to_string()));
            }
        }

        if self.engine.has_cloud_target() && self.auto_cloud_enabled().await {
            if self.is_online().await {
                match self.engine.run(BackupKind::AutoCloud).await {
                    Ok(report) => {
                        ran_anything |= !report.stored.is_empty();
                        if merged.archive_name.is_empty() {
                            merged.archive_name = report.archive_name;
                        }
                        merged.stored.extend(report.stored);
                        merged.failures.extend(report.failures);
                    }
                    Err(e) => {
                        error!("❌ Automatic cloud backup failed: {}", e);
                        merged.failures.push(("drive".to_string(), e.to_string()));
                    }
                }
            } else {
                // Resumes on the next trigger once connectivity is back,
                // still subject to the daily guard.
                info!("📴 Offline, skipping cloud-directed automatic backup");
            }
        }

        if !ran_anything {
            return Ok(RunOutcome::Skipped("no backup destination stored a snapshot"));
        }

        let mut state = self.state.lock().await;
        state.last_auto_backup = Some(now);
        self.persist(&state).await?;

        Ok(RunOutcome::Completed(merged))
    }

    /// Cheap connectivity probe; any HTTP response counts as online.
    async fn is_online(&self) -> bool {
        self.client
            .head(&self.config.probe_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .is_ok()
    }

    async fn persist(&self, state: &PersistedState) -> BackupResult<()> {
        if let Some(dir) = self.config.state_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.config.state_path, serde_json::to_string_pretty(state)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackupConfig;
    use bossnouadi_db::Storage;
    use chrono::TimeZone;
    use tempfile::tempdir;

    async fn scheduler_with_local_target(
        dir: &std::path::Path,
    ) -> (Arc<BackupScheduler>, Arc<Storage>) {
        let storage = Arc::new(Storage::open(dir.join("data/bossnouadi.db")).await.unwrap());
        // Restart-persistence tests build a second scheduler over the same
        // database, so the owner account may already exist.
        if storage
            .user_by_email("owner@example.com")
            .await
            .unwrap()
            .is_none()
        {
            storage.create_user("owner@example.com", "s3cret").await.unwrap();
        }

        let backups = dir.join("backups");
        std::fs::create_dir_all(&backups).unwrap();
        storage
            .set_backup_path("owner@example.com", backups.to_str().unwrap())
            .await
            .unwrap();

        let config = BackupConfig {
            uploads_dir: dir.join("uploads"),
            ..BackupConfig::default()
        };
        let engine = Arc::new(BackupEngine::new(storage.clone(), config, None));
        let scheduler = Arc::new(
            BackupScheduler::new(engine, SchedulerConfig::new(dir.join("data/sync-state.json")))
                .await,
        );
        (scheduler, storage)
    }

    #[tokio::test]
    async fn test_automatic_runs_deduplicated_per_day() {
        let dir = tempdir().unwrap();
        let (scheduler, _storage) = scheduler_with_local_target(dir.path()).await;

        let morning = Utc.with_ymd_and_hms(2026, 8, 25, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2026, 8, 25, 20, 0, 0).unwrap();

        let first = scheduler.maybe_run(morning, Trigger::Mutation).await.unwrap();
        assert!(matches!(first, RunOutcome::Completed(_)));

        let second = scheduler.maybe_run(evening, Trigger::Timer).await.unwrap();
        assert!(matches!(second, RunOutcome::Skipped(_)));

        // A manual run on the same date still executes.
        let manual = scheduler.maybe_run(evening, Trigger::Manual).await.unwrap();
        assert!(matches!(manual, RunOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_next_day_runs_again() {
        let dir = tempdir().unwrap();
        let (scheduler, _storage) = scheduler_with_local_target(dir.path()).await;

        let today = Utc.with_ymd_and_hms(2026, 8, 25, 8, 0, 0).unwrap();
        let tomorrow = Utc.with_ymd_and_hms(2026, 8, 26, 8, 0, 0).unwrap();

        assert!(matches!(
            scheduler.maybe_run(today, Trigger::Timer).await.unwrap(),
            RunOutcome::Completed(_)
        ));
        assert!(matches!(
            scheduler.maybe_run(tomorrow, Trigger::Timer).await.unwrap(),
            RunOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn test_trigger_dropped_while_running() {
        let dir = tempdir().unwrap();
        let (scheduler, _storage) = scheduler_with_local_target(dir.path()).await;

        scheduler.running.store(true, Ordering::SeqCst);
        let outcome = scheduler
            .maybe_run(Utc::now(), Trigger::Manual)
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Skipped("a backup is already running")));
        scheduler.running.store(false, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn test_cloud_trigger_respects_running_guard() {
        let dir = tempdir().unwrap();
        let (scheduler, _storage) = scheduler_with_local_target(dir.path()).await;

        scheduler.running.store(true, Ordering::SeqCst);
        assert!(scheduler.run_auto_cloud().await.is_err());
        scheduler.running.store(false, Ordering::SeqCst);

        // With the slot free and no cloud target configured, the run
        // completes as an empty report and releases the guard.
        let report = scheduler.run_auto_cloud().await.unwrap();
        assert!(report.stored.is_empty());
        assert!(!scheduler.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_daily_marker_persisted_across_instances() {
        let dir = tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 8, 0, 0).unwrap();

        {
            let (scheduler, _storage) = scheduler_with_local_target(dir.path()).await;
            assert!(matches!(
                scheduler.maybe_run(now, Trigger::Timer).await.unwrap(),
                RunOutcome::Completed(_)
            ));
        }

        // A fresh scheduler over the same state file still skips.
        let (scheduler, _storage) = scheduler_with_local_target(dir.path()).await;
        let later = Utc.with_ymd_and_hms(2026, 8, 25, 9, 0, 0).unwrap();
        assert!(matches!(
            scheduler.maybe_run(later, Trigger::Mutation).await.unwrap(),
            RunOutcome::Skipped(_)
        ));
    }

    #[tokio::test]
    async fn test_scheduler_lifecycle() {
        let dir = tempdir().unwrap();
        let (scheduler, _storage) = scheduler_with_local_target(dir.path()).await;

        assert!(scheduler.start().await.is_ok());
        assert!(scheduler.start().await.is_err());
        scheduler.stop().await;
        assert!(scheduler.start().await.is_ok());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_auto_cloud_flag_persisted() {
        let dir = tempdir().unwrap();
        let (scheduler, _storage) = scheduler_with_local_target(dir.path()).await;

        assert!(!scheduler.auto_cloud_enabled().await);
        scheduler.set_auto_cloud(true).await.unwrap();

        let (scheduler, _storage) = scheduler_with_local_target(dir.path()).await;
        assert!(scheduler.auto_cloud_enabled().await);
    }
}
