//! Integration tests for database initialization
//!
//! Verifies automatic database creation on first run, idempotent schema
//! creation, and default settings initialization.

use awm_common::db::init::init_database;
use std::path::PathBuf;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let test_db = format!("/tmp/awm-test-db-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    // Ensure database doesn't exist
    let _ = std::fs::remove_file(&db_path);

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());

    // Verify database file was created
    assert!(db_path.exists(), "Database file was not created");

    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_database_opens_existing() {
    let test_db = format!("/tmp/awm-test-db-existing-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);

    let _ = std::fs::remove_file(&db_path);

    // Create database first time
    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    // Open database second time (schema creation is idempotent)
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    drop(pool1);
    drop(pool2);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_all_tables_created() {
    let test_db = format!("/tmp/awm-test-db-tables-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);
    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let expected = [
        "settings",
        "academic_years",
        "sites",
        "faculties",
        "lecturer_profiles",
        "lecturers",
        "module_profiles",
        "modules",
        "module_iterations",
        "users",
        "user_profiles",
        "migration_runs",
    ];

    for table in expected {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "Table '{}' was not created", table);
    }

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let test_db = format!("/tmp/awm-test-db-settings-{}.db", std::process::id());
    let db_path = PathBuf::from(&test_db);
    let _ = std::fs::remove_file(&db_path);

    let pool = init_database(&db_path).await.unwrap();

    let value: Option<String> = sqlx::query_scalar(
        "SELECT value FROM settings WHERE key = 'session_timeout_seconds'",
    )
    .fetch_optional(&pool)
    .await
    .unwrap();

    assert_eq!(value.as_deref(), Some("28800"));

    drop(pool);
    let _ = std::fs::remove_file(&db_path);
}
