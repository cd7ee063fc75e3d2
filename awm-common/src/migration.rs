//! Profile structure migration engine
//!
//! One-way migration from the legacy flat schema to the profile/instance
//! split: legacy lecturer and module rows lacking a profile_id get one
//! derived from their natural key, and user_profiles rows are derived
//! from users.
//!
//! # Guarantees
//!
//! 1. **Idempotent per record** - already-migrated rows are excluded by the
//!    `profile_id IS NULL` filter, so re-running the engine is always safe
//! 2. **Per-record error isolation** - one record's failure is recorded
//!    with its step name and natural key, and processing continues
//! 3. **One audit row per completed invocation** - a `migration_runs` row
//!    is appended whether or not individual records failed; it is never
//!    mutated afterwards
//!
//! Records are processed strictly sequentially within a run. This keeps
//! the error list deterministic and lets a second legacy row resolving to
//! the same natural key see the profile the first one just created.
//!
//! There is no rollback. An interrupted run leaves already-migrated rows
//! migrated and no audit row; re-invocation resumes from the remainder.

use crate::profiles::{
    resolve_or_create_lecturer_profile, resolve_or_create_module_profile, LegacyLecturerRow,
    LegacyModuleRow,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

/// Audit name recorded for each run of this engine
pub const MIGRATION_NAME: &str = "profile_structure";

/// Engine version recorded in the audit row
///
/// **IMPORTANT:** Increment this when the migration semantics change
pub const MIGRATION_VERSION: &str = "1";

/// One record's failure, recorded without aborting the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepError {
    /// Step label ("lecturer_profiles", "module_profiles", "user_profiles")
    pub step: String,
    /// Human-readable failure reason
    pub error: String,
    /// Natural key of the failing record, for operator diagnosis
    pub details: String,
}

/// Overall status of one engine invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
        }
    }
}

/// Summary of one engine invocation
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub status: RunStatus,
    pub records_processed: u64,
    pub lecturer_profiles: u64,
    pub module_profiles: u64,
    pub user_profiles: u64,
    pub duration_ms: i64,
    pub errors: Vec<StepError>,
}

/// Counts used by callers to decide whether to trigger the migration
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub lecturers_without_profiles: i64,
    pub modules_without_profiles: i64,
    pub needs_profile_migration: bool,
}

/// Run the profile structure migration
///
/// Per-record failures are accumulated into the report; anything escaping
/// that isolation (including failure to write the audit row) propagates
/// to the caller, in which case no audit row exists for the invocation.
pub async fn run_profile_migration(pool: &SqlitePool) -> Result<MigrationReport> {
    let started_at = chrono::Utc::now().timestamp_millis();
    let mut errors: Vec<StepError> = Vec::new();

    info!("Running profile structure migration v{}", MIGRATION_VERSION);

    let lecturer_count = migrate_lecturers(pool, &mut errors).await?;
    info!("  ✓ Lecturer step complete: {} record(s) migrated", lecturer_count);

    let module_count = migrate_modules(pool, &mut errors).await?;
    info!("  ✓ Module step complete: {} record(s) migrated", module_count);

    let user_count = migrate_users(pool, &mut errors).await?;
    info!("  ✓ User step complete: {} profile(s) derived", user_count);

    let records_processed = lecturer_count + module_count + user_count;
    let status = if errors.is_empty() {
        RunStatus::Completed
    } else {
        RunStatus::CompletedWithErrors
    };
    let duration_ms = chrono::Utc::now().timestamp_millis() - started_at;

    if !errors.is_empty() {
        warn!(
            "Profile migration finished with {} error(s) across {} record(s)",
            errors.len(),
            records_processed
        );
    }

    // Append the audit row. If this write fails the error propagates and
    // the invocation has no audit record at all.
    record_migration_run(pool, started_at, duration_ms, status, records_processed, &errors).await?;

    info!(
        "Profile migration {}: {} record(s) in {} ms",
        status.as_str(),
        records_processed,
        duration_ms
    );

    Ok(MigrationReport {
        status,
        records_processed,
        lecturer_profiles: lecturer_count,
        module_profiles: module_count,
        user_profiles: user_count,
        duration_ms,
        errors,
    })
}

/// Count unmigrated records without mutating anything
pub async fn migration_status(pool: &SqlitePool) -> Result<MigrationStatus> {
    let lecturers_without_profiles: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM lecturers WHERE profile_id IS NULL AND deleted_at IS NULL",
    )
    .fetch_one(pool)
    .await?;

    let modules_without_profiles: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM modules WHERE profile_id IS NULL AND deleted_at IS NULL",
    )
    .fetch_one(pool)
    .await?;

    Ok(MigrationStatus {
        lecturers_without_profiles,
        modules_without_profiles,
        needs_profile_migration: lecturers_without_profiles > 0 || modules_without_profiles > 0,
    })
}

/// List all recorded migration runs, newest first
pub async fn list_migration_runs(pool: &SqlitePool) -> Result<Vec<crate::db::models::MigrationRun>> {
    let runs = sqlx::query_as::<_, crate::db::models::MigrationRun>(
        "SELECT id, name, version, applied_at, duration_ms, status, records_processed, \
                error_count, error_details, steps \
         FROM migration_runs ORDER BY applied_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(runs)
}

/// Step 1: backfill lecturer profiles
///
/// For each legacy lecturer row the profile is resolved by email, the row
/// is patched with the profile id, and the year-scoped counters are reset
/// to zero - allocations must be recomputed per year, not carried over
/// from the pre-split record.
async fn migrate_lecturers(pool: &SqlitePool, errors: &mut Vec<StepError>) -> Result<u64> {
    let legacy = sqlx::query_as::<_, LegacyLecturerRow>(
        "SELECT guid, email, full_name, contract, fte, specialism \
         FROM lecturers WHERE profile_id IS NULL AND deleted_at IS NULL",
    )
    .fetch_all(pool)
    .await?;

    info!("  Lecturer step: {} unmigrated record(s)", legacy.len());

    let mut migrated = 0u64;
    for row in &legacy {
        match migrate_one_lecturer(pool, row).await {
            Ok(()) => migrated += 1,
            Err(e) => {
                warn!("  Lecturer {} failed to migrate: {}", row.guid, e);
                errors.push(StepError {
                    step: "lecturer_profiles".to_string(),
                    error: e.to_string(),
                    details: row.email.clone().unwrap_or_else(|| row.guid.clone()),
                });
            }
        }
    }

    Ok(migrated)
}

async fn migrate_one_lecturer(pool: &SqlitePool, row: &LegacyLecturerRow) -> Result<()> {
    let profile_id = resolve_or_create_lecturer_profile(pool, row).await?;

    sqlx::query(
        r#"
        UPDATE lecturers
        SET profile_id = ?,
            teaching_availability = 0,
            total_allocated = 0,
            allocated_teaching_hours = 0,
            allocated_admin_hours = 0,
            updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(&profile_id)
    .bind(&row.guid)
    .execute(pool)
    .await?;

    Ok(())
}

/// Step 2: backfill module profiles
///
/// Keyed by module code. No counter reset - modules carry default-hours
/// fields on the profile, not per-year allocation counters.
async fn migrate_modules(pool: &SqlitePool, errors: &mut Vec<StepError>) -> Result<u64> {
    let legacy = sqlx::query_as::<_, LegacyModuleRow>(
        "SELECT guid, code, title, credits \
         FROM modules WHERE profile_id IS NULL AND deleted_at IS NULL",
    )
    .fetch_all(pool)
    .await?;

    info!("  Module step: {} unmigrated record(s)", legacy.len());

    let mut migrated = 0u64;
    for row in &legacy {
        match migrate_one_module(pool, row).await {
            Ok(()) => migrated += 1,
            Err(e) => {
                warn!("  Module {} failed to migrate: {}", row.guid, e);
                errors.push(StepError {
                    step: "module_profiles".to_string(),
                    error: e.to_string(),
                    details: row.code.clone().unwrap_or_else(|| row.guid.clone()),
                });
            }
        }
    }

    Ok(migrated)
}

async fn migrate_one_module(pool: &SqlitePool, row: &LegacyModuleRow) -> Result<()> {
    let profile_id = resolve_or_create_module_profile(pool, row).await?;

    sqlx::query("UPDATE modules SET profile_id = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?")
        .bind(&profile_id)
        .bind(&row.guid)
        .execute(pool)
        .await?;

    Ok(())
}

/// Step 3: derive user profiles
///
/// One user_profiles row per external auth subject; subjects that already
/// have one are skipped, so re-runs derive nothing.
async fn migrate_users(pool: &SqlitePool, errors: &mut Vec<StepError>) -> Result<u64> {
    let users = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
        "SELECT guid, auth_subject, email, display_name FROM users",
    )
    .fetch_all(pool)
    .await?;

    let mut derived = 0u64;
    for (guid, auth_subject, email, display_name) in &users {
        match derive_user_profile(pool, auth_subject, email.as_deref(), display_name.as_deref())
            .await
        {
            Ok(true) => derived += 1,
            Ok(false) => {} // profile already exists for this subject
            Err(e) => {
                warn!("  User {} failed to migrate: {}", guid, e);
                errors.push(StepError {
                    step: "user_profiles".to_string(),
                    error: e.to_string(),
                    details: auth_subject.clone(),
                });
            }
        }
    }

    Ok(derived)
}

async fn derive_user_profile(
    pool: &SqlitePool,
    auth_subject: &str,
    email: Option<&str>,
    display_name: Option<&str>,
) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM user_profiles WHERE auth_subject = ?)")
            .bind(auth_subject)
            .fetch_one(pool)
            .await?;

    if exists {
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO user_profiles (guid, auth_subject, email, display_name) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(auth_subject)
    .bind(email)
    .bind(display_name)
    .execute(pool)
    .await?;

    Ok(true)
}

async fn record_migration_run(
    pool: &SqlitePool,
    applied_at: i64,
    duration_ms: i64,
    status: RunStatus,
    records_processed: u64,
    errors: &[StepError],
) -> Result<()> {
    let error_details = serde_json::to_string(errors)
        .map_err(|e| crate::Error::Internal(format!("Failed to serialize error details: {}", e)))?;
    let steps = serde_json::to_string(&["lecturer_profiles", "module_profiles", "user_profiles"])
        .map_err(|e| crate::Error::Internal(format!("Failed to serialize step list: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO migration_runs (name, version, applied_at, duration_ms, status,
                                    records_processed, error_count, error_details, steps)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(MIGRATION_NAME)
    .bind(MIGRATION_VERSION)
    .bind(applied_at)
    .bind(duration_ms)
    .bind(status.as_str())
    .bind(records_processed as i64)
    .bind(errors.len() as i64)
    .bind(error_details)
    .bind(steps)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    async fn insert_legacy_lecturer(pool: &SqlitePool, guid: &str, email: Option<&str>) {
        sqlx::query(
            r#"
            INSERT INTO lecturers (guid, email, full_name, allocated_teaching_hours,
                                   allocated_admin_hours, total_allocated, teaching_availability)
            VALUES (?, ?, 'A B', 120, 40, 160, 1400)
            "#,
        )
        .bind(guid)
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_legacy_module(pool: &SqlitePool, guid: &str, code: Option<&str>) {
        sqlx::query("INSERT INTO modules (guid, code, title, credits) VALUES (?, ?, 'T', 20)")
            .bind(guid)
            .bind(code)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_run_still_writes_audit_record() {
        let pool = setup_test_db().await;

        let report = run_profile_migration(&pool).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.records_processed, 0);

        let runs = list_migration_runs(&pool).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].name, MIGRATION_NAME);
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].records_processed, 0);
    }

    #[tokio::test]
    async fn test_lecturer_defaults_and_counter_reset() {
        let pool = setup_test_db().await;
        insert_legacy_lecturer(&pool, "l1", Some("a@x.com")).await;

        let report = run_profile_migration(&pool).await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.lecturer_profiles, 1);

        // Profile derived with defaults applied
        let (fte, contract): (f64, String) = sqlx::query_as(
            "SELECT fte, contract FROM lecturer_profiles WHERE email = 'a@x.com'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(fte, 1.0);
        assert_eq!(contract, "Full-time");

        // Counters reset regardless of prior values
        let (profile_id, teaching, admin, total, avail): (Option<String>, f64, f64, f64, f64) =
            sqlx::query_as(
                "SELECT profile_id, allocated_teaching_hours, allocated_admin_hours, \
                        total_allocated, teaching_availability \
                 FROM lecturers WHERE guid = 'l1'",
            )
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(profile_id.is_some());
        assert_eq!(teaching, 0.0);
        assert_eq!(admin, 0.0);
        assert_eq!(total, 0.0);
        assert_eq!(avail, 0.0);
    }

    #[tokio::test]
    async fn test_shared_email_resolves_to_one_profile() {
        let pool = setup_test_db().await;
        insert_legacy_lecturer(&pool, "l1", Some("a@x.com")).await;
        insert_legacy_lecturer(&pool, "l2", Some("a@x.com")).await;

        let report = run_profile_migration(&pool).await.unwrap();
        assert_eq!(report.lecturer_profiles, 2);

        let profile_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lecturer_profiles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(profile_count, 1);

        let distinct: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT profile_id) FROM lecturers")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(distinct, 1);
    }

    #[tokio::test]
    async fn test_one_bad_record_does_not_abort_the_batch() {
        let pool = setup_test_db().await;

        for i in 0..9 {
            let email = format!("l{}@x.com", i);
            insert_legacy_lecturer(&pool, &format!("l{}", i), Some(email.as_str())).await;
        }
        // This one cannot resolve a profile
        insert_legacy_lecturer(&pool, "broken", None).await;

        let report = run_profile_migration(&pool).await.unwrap();

        assert_eq!(report.status, RunStatus::CompletedWithErrors);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].step, "lecturer_profiles");
        assert_eq!(report.errors[0].details, "broken");
        assert_eq!(report.lecturer_profiles, 9);

        let migrated: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM lecturers WHERE profile_id IS NOT NULL")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(migrated, 9);

        let runs = list_migration_runs(&pool).await.unwrap();
        assert_eq!(runs[0].status, "completed_with_errors");
        assert_eq!(runs[0].error_count, 1);

        let details: Vec<StepError> = serde_json::from_str(&runs[0].error_details).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].step, "lecturer_profiles");
    }

    #[tokio::test]
    async fn test_modules_keyed_by_code_without_reset() {
        let pool = setup_test_db().await;
        insert_legacy_module(&pool, "m1", Some("CS101")).await;
        insert_legacy_module(&pool, "m2", Some("CS101")).await;
        insert_legacy_module(&pool, "m3", Some("CS202")).await;

        let report = run_profile_migration(&pool).await.unwrap();
        assert_eq!(report.module_profiles, 3);

        let profile_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM module_profiles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(profile_count, 2);
    }

    #[tokio::test]
    async fn test_user_profiles_derived_and_skipped() {
        let pool = setup_test_db().await;

        sqlx::query(
            "INSERT INTO users (guid, auth_subject, email) VALUES ('u1', 'sub|123', 'u@x.com')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = run_profile_migration(&pool).await.unwrap();
        assert_eq!(report.user_profiles, 1);

        // Second run skips the existing subject
        let report2 = run_profile_migration(&pool).await.unwrap();
        assert_eq!(report2.user_profiles, 0);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_profiles WHERE auth_subject = 'sub|123'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_rerun_processes_zero_records() {
        let pool = setup_test_db().await;
        insert_legacy_lecturer(&pool, "l1", Some("a@x.com")).await;
        insert_legacy_module(&pool, "m1", Some("CS101")).await;

        let first = run_profile_migration(&pool).await.unwrap();
        assert_eq!(first.records_processed, 2);

        let second = run_profile_migration(&pool).await.unwrap();
        assert_eq!(second.records_processed, 0);
        assert_eq!(second.status, RunStatus::Completed);

        // One audit row per invocation
        let runs = list_migration_runs(&pool).await.unwrap();
        assert_eq!(runs.len(), 2);
    }

    #[tokio::test]
    async fn test_status_query_counts_unmigrated() {
        let pool = setup_test_db().await;
        insert_legacy_lecturer(&pool, "l1", Some("a@x.com")).await;
        insert_legacy_module(&pool, "m1", Some("CS101")).await;
        insert_legacy_module(&pool, "m2", Some("CS202")).await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.lecturers_without_profiles, 1);
        assert_eq!(status.modules_without_profiles, 2);
        assert!(status.needs_profile_migration);

        run_profile_migration(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.lecturers_without_profiles, 0);
        assert_eq!(status.modules_without_profiles, 0);
        assert!(!status.needs_profile_migration);
    }

    #[tokio::test]
    async fn test_soft_deleted_legacy_rows_are_ignored() {
        let pool = setup_test_db().await;
        insert_legacy_lecturer(&pool, "l1", Some("a@x.com")).await;
        sqlx::query("UPDATE lecturers SET deleted_at = CURRENT_TIMESTAMP WHERE guid = 'l1'")
            .execute(&pool)
            .await
            .unwrap();

        let report = run_profile_migration(&pool).await.unwrap();
        assert_eq!(report.records_processed, 0);
    }
}
