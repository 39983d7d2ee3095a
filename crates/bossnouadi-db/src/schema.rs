//! Schema initialization
//!
//! Creates all application tables if they do not exist. Statements are
//! idempotent so initialization runs on every open, including the lazy
//! reopen after a restore replaced the database file.

use bossnouadi_common::{NouadiError, Result};
use sqlx::SqlitePool;
use tracing::info;

const CREATE_TABLES: &[&str] = &[
    // Local operator accounts. `backup_path` is the persisted local-folder
    // backup target configured from the settings screen.
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        recovery_code_hash TEXT DEFAULT NULL,
        backup_path TEXT DEFAULT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE TABLE IF NOT EXISTS companies (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        owner TEXT NOT NULL,
        description TEXT,
        initial_capital INTEGER NOT NULL DEFAULT 0,
        working_capital INTEGER NOT NULL DEFAULT 0,
        share_percentage INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        image TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(user_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS fournisseurs (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        currency TEXT NOT NULL CHECK (currency IN ('USD', 'RMB', 'EUR', 'GBP', 'OTHER')),
        currencies TEXT,
        balance INTEGER NOT NULL DEFAULT 0,
        image TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(user_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        type TEXT NOT NULL CHECK (type IN ('company', 'fournisseur')),
        amount INTEGER NOT NULL,
        rate REAL NOT NULL DEFAULT 1,
        description TEXT,
        company_id TEXT,
        fournisseur_id TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE TABLE IF NOT EXISTS fund_capital (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE,
        amount INTEGER NOT NULL DEFAULT 0,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE TABLE IF NOT EXISTS fund_transactions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        type TEXT NOT NULL CHECK (type IN ('set', 'add', 'withdraw')),
        amount INTEGER NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE TABLE IF NOT EXISTS currency_companies (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        base_currency TEXT NOT NULL,
        target_currency TEXT NOT NULL,
        exchange_rate REAL NOT NULL DEFAULT 1,
        commission_percentage REAL NOT NULL DEFAULT 0,
        description TEXT,
        image TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(user_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS currency_transactions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        currency_company_id TEXT NOT NULL,
        from_amount REAL NOT NULL,
        to_amount REAL NOT NULL,
        exchange_rate_used REAL NOT NULL,
        commission_amount REAL NOT NULL DEFAULT 0,
        description TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
    "CREATE TABLE IF NOT EXISTS trash (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        item_type TEXT NOT NULL CHECK (item_type IN ('company', 'fournisseur', 'transaction', 'currency_company', 'currency_transaction')),
        item_data TEXT NOT NULL,
        deleted_at TEXT NOT NULL DEFAULT (datetime('now'))
    )",
];

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_companies_user_id ON companies(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_fournisseurs_user_id ON fournisseurs(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_user_id ON transactions(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_created_at ON transactions(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_currency_transactions_user_id ON currency_transactions(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_fund_transactions_user_id ON fund_transactions(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_trash_user_id ON trash(user_id)",
];

/// Create all tables and indexes if they do not exist.
pub async fn initialize(pool: &SqlitePool) -> Result<()> {
    for stmt in CREATE_TABLES.iter().chain(CREATE_INDEXES) {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| NouadiError::database(e.to_string()))?;
    }

    info!("💽 Database schema initialized");
    Ok(())
}
