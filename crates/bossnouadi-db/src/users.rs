//! Operator account records
//!
//! Single-tenant in practice: the first user created is the owner, and the
//! backup engine falls back to that record when no account id is given.
//! Passwords are hashed with Argon2id.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use bossnouadi_common::{NouadiError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::storage::Storage;

/// Operator account record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Account identifier (UUID v4)
    pub id: String,
    /// Login email
    pub email: String,
    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Optional recovery code hash
    #[serde(skip_serializing)]
    pub recovery_code_hash: Option<String>,
    /// Persisted local-folder backup target, if configured
    pub backup_path: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| NouadiError::Auth(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2id hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

impl Storage {
    /// Create an operator account.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn create_user(&self, email: &str, password: &str) -> Result<User> {
        let pool = self.pool().await?;
        let id = Uuid::new_v4().to_string();
        let password_hash = hash_password(password)?;

        sqlx::query("INSERT INTO users (id, email, password_hash) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(email)
            .bind(&password_hash)
            .execute(&pool)
            .await
            .map_err(|e| NouadiError::database(e.to_string()))?;

        info!("👤 Created operator account");
        self.user_by_email(email)
            .await?
            .ok_or_else(|| NouadiError::NotFound(format!("user {}", email)))
    }

    /// Look up an account by email.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&pool)
            .await
            .map_err(|e| NouadiError::database(e.to_string()))
    }

    /// The owner account: the oldest user record.
    pub async fn first_user(&self) -> Result<Option<User>> {
        let pool = self.pool().await?;
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at ASC, id ASC LIMIT 1")
            .fetch_optional(&pool)
            .await
            .map_err(|e| NouadiError::database(e.to_string()))
    }

    /// Persist the local-folder backup target on the account record.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn set_backup_path(&self, email: &str, backup_path: &str) -> Result<()> {
        let pool = self.pool().await?;
        let result = sqlx::query(
            "UPDATE users SET backup_path = ?, updated_at = datetime('now') WHERE email = ?",
        )
        .bind(backup_path)
        .bind(email)
        .execute(&pool)
        .await
        .map_err(|e| NouadiError::database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(NouadiError::NotFound(format!("user {}", email)));
        }
        Ok(())
    }
}
