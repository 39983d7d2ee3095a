//! Live database handle
//!
//! The pool is held behind an `RwLock<Option<_>>` so restore can fully
//! close the file handle (`close()`) while the next caller transparently
//! reopens against whatever file is at the live path.

use std::path::{Path, PathBuf};

use bossnouadi_common::{NouadiError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::schema;

fn db_err(e: sqlx::Error) -> NouadiError {
    NouadiError::database(e.to_string())
}

/// Shared handle to the live SQLite database file.
#[derive(Debug)]
pub struct Storage {
    db_path: PathBuf,
    pool: RwLock<Option<SqlitePool>>,
}

impl Storage {
    /// Open (or create) the database at `db_path` and initialize the schema.
    #[instrument(skip_all, fields(path = %db_path.as_ref().display()))]
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(dir) = db_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let storage = Self {
            db_path,
            pool: RwLock::new(None),
        };
        // Connect eagerly once so schema problems surface at startup.
        storage.pool().await?;
        info!("💽 Storage opened at {:?}", storage.db_path);
        Ok(storage)
    }

    /// Path of the live database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Current pool, reopening lazily if the handle was closed by a restore.
    pub async fn pool(&self) -> Result<SqlitePool> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }

        let mut guard = self.pool.write().await;
        // Another task may have reopened while we waited for the write lock.
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        debug!("🔌 Opening SQLite pool at {:?}", self.db_path);
        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        schema::initialize(&pool).await?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Close the pool and release the file handle.
    ///
    /// Restore calls this before replacing the file; the next `pool()` call
    /// reopens against the replaced file and re-runs schema initialization.
    #[instrument(skip_all)]
    pub async fn close(&self) {
        let mut guard = self.pool.write().await;
        if let Some(pool) = guard.take() {
            pool.close().await;
            info!("🔌 Storage pool closed");
        }
    }

    /// Take a transactionally consistent copy of the live database into
    /// `dest` using SQLite's `VACUUM INTO`.
    ///
    /// Unlike a byte copy of the live file this can never observe a torn
    /// write, and it does not block concurrent readers or writers.
    #[instrument(skip_all, fields(dest = %dest.display()))]
    pub async fn vacuum_into(&self, dest: &Path) -> Result<()> {
        let pool = self.pool().await?;
        let dest_str = dest
            .to_str()
            .ok_or_else(|| NouadiError::validation("snapshot path is not valid UTF-8"))?
            .replace('\'', "''");

        sqlx::query(&format!("VACUUM INTO '{}'", dest_str))
            .execute(&pool)
            .await
            .map_err(db_err)?;

        debug!("📸 VACUUM INTO completed");
        Ok(())
    }

    /// Row count of a table, used by status reporting and tests.
    pub async fn table_count(&self, table: &str) -> Result<i64> {
        use sqlx::Row;

        let pool = self.pool().await?;
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
            .fetch_one(&pool)
            .await
            .map_err(db_err)?;
        Ok(row.get::<i64, _>("n"))
    }
}
