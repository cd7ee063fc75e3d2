//! Database initialization
//!
//! Creates the database file on first run and brings the schema up to date.
//! All tables are created with CREATE TABLE IF NOT EXISTS so initialization
//! is safe to run on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use sqlite options to create database if it doesn't exist
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // Set busy timeout for concurrent request handlers
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    // Initialize default settings
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent - safe to call multiple times)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_academic_years_table(pool).await?;

    // Shared reference tables protected by the integrity guard
    create_sites_table(pool).await?;
    create_faculties_table(pool).await?;

    // Profile tables (identity attributes, not year-scoped)
    create_lecturer_profiles_table(pool).await?;
    create_module_profiles_table(pool).await?;
    create_user_profiles_table(pool).await?;

    // Instance tables (year-scoped operational records)
    create_lecturers_table(pool).await?;
    create_modules_table(pool).await?;
    create_module_iterations_table(pool).await?;

    create_users_table(pool).await?;
    create_migration_runs_table(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs, including the
/// API shared secret.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the academic_years table
///
/// Across all rows at most one may carry is_active = 1 and at most one
/// is_staging = 1. The singleton invariants are enforced by the registry
/// (clear-then-set), not by the schema. Academic years are hard-deleted,
/// gated by the referential integrity guard.
pub async fn create_academic_years_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS academic_years (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            description TEXT,
            is_active INTEGER NOT NULL DEFAULT 0 CHECK (is_active IN (0, 1)),
            is_staging INTEGER NOT NULL DEFAULT 0 CHECK (is_staging IN (0, 1)),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_academic_years_active ON academic_years(is_active)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_academic_years_staging ON academic_years(is_staging)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_sites_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sites (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_faculties_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS faculties (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the lecturer_profiles table
///
/// Permanent identity attributes of a lecturer, independent of academic
/// year. The natural key is email; uniqueness is handled by
/// lookup-before-insert in the profiles module, not by the schema.
pub async fn create_lecturer_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lecturer_profiles (
            guid TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            full_name TEXT NOT NULL,
            contract TEXT NOT NULL DEFAULT 'Full-time',
            fte REAL NOT NULL DEFAULT 1.0,
            specialism TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (fte > 0.0 AND fte <= 1.0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_lecturer_profiles_email ON lecturer_profiles(email)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the lecturers table
///
/// Year-scoped instance records. Legacy (pre-migration) rows carry NULL
/// profile_id and possibly NULL academic_year_id plus flat identity
/// fields; the migration engine backfills profile_id and resets the
/// allocation counters.
pub async fn create_lecturers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lecturers (
            guid TEXT PRIMARY KEY,
            profile_id TEXT REFERENCES lecturer_profiles(guid),
            academic_year_id TEXT REFERENCES academic_years(guid),
            email TEXT,
            full_name TEXT,
            contract TEXT,
            fte REAL,
            specialism TEXT,
            teaching_availability REAL NOT NULL DEFAULT 0,
            total_allocated REAL NOT NULL DEFAULT 0,
            allocated_teaching_hours REAL NOT NULL DEFAULT 0,
            allocated_admin_hours REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            deleted_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_lecturers_profile ON lecturers(profile_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_lecturers_year ON lecturers(academic_year_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the module_profiles table
///
/// Permanent module identity: code (natural key), title, credits and
/// default hour figures carried into each year's instance.
pub async fn create_module_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS module_profiles (
            guid TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            title TEXT NOT NULL,
            credits INTEGER,
            default_teaching_hours REAL,
            default_admin_hours REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (credits IS NULL OR credits > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_module_profiles_code ON module_profiles(code)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the modules table (year-scoped instance records)
pub async fn create_modules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS modules (
            guid TEXT PRIMARY KEY,
            profile_id TEXT REFERENCES module_profiles(guid),
            academic_year_id TEXT REFERENCES academic_years(guid),
            code TEXT,
            title TEXT,
            credits INTEGER,
            site_id TEXT REFERENCES sites(guid),
            faculty_id TEXT REFERENCES faculties(guid),
            status TEXT NOT NULL DEFAULT 'active',
            deleted_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_modules_profile ON modules(profile_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_modules_year ON modules(academic_year_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_modules_site ON modules(site_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_module_iterations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS module_iterations (
            guid TEXT PRIMARY KEY,
            module_id TEXT NOT NULL REFERENCES modules(guid),
            academic_year_id TEXT REFERENCES academic_years(guid),
            occurrence TEXT NOT NULL DEFAULT 'A',
            deleted_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_module_iterations_year ON module_iterations(academic_year_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            auth_subject TEXT NOT NULL UNIQUE,
            email TEXT,
            display_name TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the user_profiles table
///
/// Derived from users during profile migration, keyed by the external
/// auth subject identifier.
pub async fn create_user_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_profiles (
            guid TEXT PRIMARY KEY,
            auth_subject TEXT NOT NULL,
            email TEXT,
            display_name TEXT,
            role TEXT NOT NULL DEFAULT 'lecturer',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_profiles_subject ON user_profiles(auth_subject)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the migration_runs table
///
/// Append-only audit trail: exactly one row per migration engine
/// invocation that reached completion. Never mutated after insert.
pub async fn create_migration_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migration_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            version TEXT NOT NULL,
            applied_at INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('completed', 'completed_with_errors', 'failed')),
            records_processed INTEGER NOT NULL,
            error_count INTEGER NOT NULL,
            error_details TEXT NOT NULL,
            steps TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "session_timeout_seconds", "28800").await?; // 8 hours
    ensure_setting(pool, "http_request_timeout_ms", "30000").await?;
    ensure_setting(pool, "http_max_body_size_bytes", "1048576").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // Use INSERT OR IGNORE to handle concurrent initialization race conditions
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        tracing::warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
