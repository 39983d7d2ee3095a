//! End-to-end backup and restore over a realistically populated database.

use std::sync::Arc;

use tempfile::tempdir;

use bossnouadi_backup::archive::RestoreMode;
use bossnouadi_backup::{restore, BackupConfig, BackupEngine, BackupKind};
use bossnouadi_db::Storage;

async fn seed(storage: &Storage, user_id: &str) {
    let pool = storage.pool().await.unwrap();

    for (i, (name, owner)) in [("Acme Trading", "Amir"), ("Nordwind", "Lea"), ("Sahara Import", "Karim")]
        .iter()
        .enumerate()
    {
        sqlx::query(
            "INSERT INTO companies (id, user_id, name, owner, initial_capital, working_capital)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(format!("company-{}", i))
        .bind(user_id)
        .bind(name)
        .bind(owner)
        .bind(100_000_i64)
        .bind(25_000_i64)
        .execute(&pool)
        .await
        .unwrap();
    }

    sqlx::query(
        "INSERT INTO fournisseurs (id, user_id, name, currency, balance)
         VALUES ('fournisseur-0', ?, 'Shenzhen Parts Co', 'RMB', 48000)",
    )
    .bind(user_id)
    .execute(&pool)
    .await
    .unwrap();

    for i in 0..40 {
        let (kind, company, fournisseur) = if i % 4 == 0 {
            ("fournisseur", None, Some("fournisseur-0"))
        } else {
            ("company", Some(format!("company-{}", i % 3)), None)
        };
        sqlx::query(
            "INSERT INTO transactions (id, user_id, type, amount, rate, description, company_id, fournisseur_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(format!("txn-{:03}", i))
        .bind(user_id)
        .bind(kind)
        .bind(1000 + i as i64 * 17)
        .bind(if kind == "fournisseur" { 7.2 } else { 1.0 })
        .bind(format!("payment #{}", i))
        .bind(company)
        .bind(fournisseur)
        .execute(&pool)
        .await
        .unwrap();
    }

    sqlx::query(
        "INSERT INTO fund_capital (id, user_id, amount, password_hash)
         VALUES ('fund-0', ?, 750000, 'hash')",
    )
    .bind(user_id)
    .execute(&pool)
    .await
    .unwrap();
}

async fn wipe(storage: &Storage) {
    let pool = storage.pool().await.unwrap();
    for table in ["transactions", "fund_capital", "fournisseurs", "companies"] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&pool)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_export_wipe_restore_recovers_everything() {
    let dir = tempdir().unwrap();
    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(uploads.join("companies")).unwrap();
    std::fs::write(uploads.join("companies/acme-logo.png"), b"fake png").unwrap();

    let storage = Arc::new(Storage::open(dir.path().join("bossnouadi.db")).await.unwrap());
    let user = storage.create_user("owner@example.com", "s3cret").await.unwrap();
    seed(&storage, &user.id).await;

    assert_eq!(storage.table_count("companies").await.unwrap(), 3);
    assert_eq!(storage.table_count("transactions").await.unwrap(), 40);

    let config = BackupConfig {
        uploads_dir: uploads.clone(),
        ..BackupConfig::default()
    };
    let engine = BackupEngine::new(storage.clone(), config, None);
    let (name, bytes) = engine.export_archive(BackupKind::Manual).await.unwrap();
    assert!(name.starts_with("bossnouadi-backup-"));
    assert!(name.ends_with(".zip"));

    // Simulate data loss, including the uploaded attachment.
    wipe(&storage).await;
    std::fs::remove_file(uploads.join("companies/acme-logo.png")).unwrap();
    assert_eq!(storage.table_count("companies").await.unwrap(), 0);
    assert_eq!(storage.table_count("transactions").await.unwrap(), 0);

    let outcome = restore::restore(&storage, &uploads, &bytes, RestoreMode::FullArchive)
        .await
        .unwrap();
    assert_eq!(outcome.attachments_restored, 1);
    assert!(outcome.rollback_path.is_some());

    assert_eq!(storage.table_count("companies").await.unwrap(), 3);
    assert_eq!(storage.table_count("fournisseurs").await.unwrap(), 1);
    assert_eq!(storage.table_count("transactions").await.unwrap(), 40);
    assert_eq!(storage.table_count("fund_capital").await.unwrap(), 1);
    assert!(uploads.join("companies/acme-logo.png").exists());

    // Spot-check values survived the round trip.
    let pool = storage.pool().await.unwrap();
    let (amount, rate): (i64, f64) = sqlx::query_as(
        "SELECT amount, rate FROM transactions WHERE id = 'txn-004'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(amount, 1000 + 4 * 17);
    assert_eq!(rate, 7.2);

    let fund: (i64,) = sqlx::query_as("SELECT amount FROM fund_capital WHERE id = 'fund-0'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(fund.0, 750_000);

    // The owner account is carried inside the snapshot as well.
    let restored_user = storage.first_user().await.unwrap().unwrap();
    assert_eq!(restored_user.id, user.id);
    assert_eq!(restored_user.email, "owner@example.com");
}

#[tokio::test]
async fn test_run_stores_archive_in_configured_folder() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(Storage::open(dir.path().join("bossnouadi.db")).await.unwrap());
    storage.create_user("owner@example.com", "s3cret").await.unwrap();

    let backups = dir.path().join("backups");
    std::fs::create_dir_all(&backups).unwrap();
    storage
        .set_backup_path("owner@example.com", backups.to_str().unwrap())
        .await
        .unwrap();

    let config = BackupConfig {
        uploads_dir: dir.path().join("uploads"),
        ..BackupConfig::default()
    };
    let engine = BackupEngine::new(storage, config, None);
    let report = engine.run(BackupKind::AutoLocal).await.unwrap();

    assert_eq!(report.stored, vec!["local-folder".to_string()]);
    assert!(report.failures.is_empty());
    assert!(backups.join(&report.archive_name).exists());

    // A second run on the same date overwrites the same-named snapshot
    // instead of accumulating duplicates.
    let report2 = engine.run(BackupKind::AutoLocal).await.unwrap();
    assert_eq!(report2.archive_name, report.archive_name);
    let count = std::fs::read_dir(&backups).unwrap().count();
    assert_eq!(count, 1);
}
