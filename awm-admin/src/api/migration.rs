//! Profile migration trigger and status endpoints

use awm_common::db::models::MigrationRun;
use awm_common::migration::{self, MigrationStatus, RunStatus, StepError};
use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;

use super::ApiError;
use crate::AppState;

/// Response for the migration trigger
#[derive(Debug, Serialize)]
pub struct MigrationResponse {
    pub success: bool,
    pub records_processed: u64,
    pub duration_ms: i64,
    /// Flat human-readable error strings
    pub errors: Vec<String>,
    /// Structured per-record failures (step, error, natural key)
    pub error_details: Vec<StepError>,
}

/// POST /api/migration/profiles
///
/// Runs the profile structure migration. Safe to re-invoke: already
/// migrated records are skipped. Per-record failures are reported in the
/// response; an engine-level failure surfaces as a 500 with no audit row
/// written.
pub async fn run_profile_migration(
    State(state): State<AppState>,
) -> Result<Json<MigrationResponse>, ApiError> {
    info!("Profile migration triggered via API");

    let report = migration::run_profile_migration(&state.db).await?;

    let errors = report
        .errors
        .iter()
        .map(|e| format!("{}: {} ({})", e.step, e.error, e.details))
        .collect();

    Ok(Json(MigrationResponse {
        success: report.status == RunStatus::Completed,
        records_processed: report.records_processed,
        duration_ms: report.duration_ms,
        errors,
        error_details: report.errors,
    }))
}

/// GET /api/migration/status
///
/// Read-only counts used to decide whether to trigger the migration.
pub async fn get_migration_status(
    State(state): State<AppState>,
) -> Result<Json<MigrationStatus>, ApiError> {
    let status = migration::migration_status(&state.db).await?;
    Ok(Json(status))
}

/// GET /api/migration/runs
///
/// The append-only audit trail, newest first.
pub async fn list_migration_runs(
    State(state): State<AppState>,
) -> Result<Json<Vec<MigrationRun>>, ApiError> {
    let runs = migration::list_migration_runs(&state.db).await?;
    Ok(Json(runs))
}
