//! Academic year administration endpoints
//!
//! Thin handlers over the awm-common registry. Mutations of the
//! active/staging flags are expected to come from a single admin actor;
//! the registry documents the race window for concurrent callers.

use awm_common::db::models::{AcademicYear, AcademicYearPatch, NewAcademicYear};
use awm_common::years;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::ApiError;
use crate::AppState;

/// Response wrapper for the single active/staging year queries
///
/// `year` is null when no year currently holds the flag - a valid state,
/// not an error.
#[derive(Debug, Serialize)]
pub struct SingletonYearResponse {
    pub year: Option<AcademicYear>,
}

/// GET /api/years
pub async fn list_years(
    State(state): State<AppState>,
) -> Result<Json<Vec<AcademicYear>>, ApiError> {
    let years = years::list_academic_years(&state.db).await?;
    Ok(Json(years))
}

/// POST /api/years
pub async fn create_year(
    State(state): State<AppState>,
    Json(new): Json<NewAcademicYear>,
) -> Result<Json<AcademicYear>, ApiError> {
    let year = years::create_academic_year(&state.db, new).await?;
    Ok(Json(year))
}

/// GET /api/years/:id
pub async fn get_year(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AcademicYear>, ApiError> {
    let year = years::get_academic_year(&state.db, &id)
        .await?
        .ok_or_else(|| awm_common::Error::NotFound(format!("Academic year {}", id)))?;
    Ok(Json(year))
}

/// PATCH /api/years/:id
pub async fn update_year(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<AcademicYearPatch>,
) -> Result<Json<AcademicYear>, ApiError> {
    let year = years::update_academic_year(&state.db, &id, patch).await?;
    Ok(Json(year))
}

/// DELETE /api/years/:id
///
/// Hard delete, rejected with 409 while dependent records reference the
/// year.
pub async fn delete_year(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    years::remove_academic_year(&state.db, &id).await?;
    Ok(Json(json!({ "deleted": id })))
}

/// POST /api/years/:id/activate
pub async fn activate_year(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AcademicYear>, ApiError> {
    let year = years::set_active(&state.db, &id).await?;
    Ok(Json(year))
}

/// POST /api/years/:id/stage
pub async fn stage_year(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AcademicYear>, ApiError> {
    let year = years::set_staging(&state.db, &id).await?;
    Ok(Json(year))
}

/// GET /api/years/active
pub async fn get_active_year(
    State(state): State<AppState>,
) -> Result<Json<SingletonYearResponse>, ApiError> {
    let year = years::get_active(&state.db).await?;
    Ok(Json(SingletonYearResponse { year }))
}

/// GET /api/years/staging
pub async fn get_staging_year(
    State(state): State<AppState>,
) -> Result<Json<SingletonYearResponse>, ApiError> {
    let year = years::get_staging(&state.db).await?;
    Ok(Json(SingletonYearResponse { year }))
}
