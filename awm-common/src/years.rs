//! Academic year registry
//!
//! Maintains the set of academic year records and the singleton flag
//! invariants: at most one active year and at most one staging year at any
//! time. Flag changes use a clear-then-set sequence of independent writes;
//! two concurrent callers can race and leave two flagged rows until the
//! next set call reconciles. Admin operations are expected to be
//! serialized by the single admin actor at the UI layer.

use crate::db::models::{AcademicYear, AcademicYearPatch, NewAcademicYear};
use crate::integrity::{self, ReferencedEntity};
use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

const SELECT_YEAR: &str = "SELECT guid, name, start_date, end_date, description, is_active, is_staging \
     FROM academic_years";

/// Create a new academic year
///
/// If the new year claims the active (or staging) flag, the flag is first
/// cleared on every other year so the singleton invariant holds after the
/// insert.
pub async fn create_academic_year(pool: &SqlitePool, new: NewAcademicYear) -> Result<AcademicYear> {
    validate_year_fields(&new)?;

    let guid = Uuid::new_v4().to_string();

    if new.is_active {
        clear_flag(pool, "is_active", &guid).await?;
    }
    if new.is_staging {
        clear_flag(pool, "is_staging", &guid).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO academic_years (guid, name, start_date, end_date, description, is_active, is_staging)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(&new.name)
    .bind(&new.start_date)
    .bind(&new.end_date)
    .bind(&new.description)
    .bind(new.is_active)
    .bind(new.is_staging)
    .execute(pool)
    .await?;

    info!("Created academic year '{}' ({})", new.name, guid);

    get_academic_year(pool, &guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Academic year {} vanished after insert", guid)))
}

/// Partially update an academic year
///
/// A patch that claims is_active or is_staging clears the flag on all
/// other years first, same as an explicit set_active/set_staging call.
pub async fn update_academic_year(
    pool: &SqlitePool,
    guid: &str,
    patch: AcademicYearPatch,
) -> Result<AcademicYear> {
    let existing = get_academic_year(pool, guid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Academic year {}", guid)))?;

    if patch.is_active == Some(true) {
        clear_flag(pool, "is_active", guid).await?;
    }
    if patch.is_staging == Some(true) {
        clear_flag(pool, "is_staging", guid).await?;
    }

    sqlx::query(
        r#"
        UPDATE academic_years
        SET name = ?, start_date = ?, end_date = ?, description = ?,
            is_active = ?, is_staging = ?, updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(patch.name.unwrap_or(existing.name))
    .bind(patch.start_date.unwrap_or(existing.start_date))
    .bind(patch.end_date.unwrap_or(existing.end_date))
    .bind(patch.description.or(existing.description))
    .bind(patch.is_active.unwrap_or(existing.is_active))
    .bind(patch.is_staging.unwrap_or(existing.is_staging))
    .bind(guid)
    .execute(pool)
    .await?;

    get_academic_year(pool, guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Academic year {} vanished after update", guid)))
}

/// List all academic years, newest start date first
pub async fn list_academic_years(pool: &SqlitePool) -> Result<Vec<AcademicYear>> {
    let years = sqlx::query_as::<_, AcademicYear>(
        &format!("{} ORDER BY start_date DESC", SELECT_YEAR),
    )
    .fetch_all(pool)
    .await?;

    Ok(years)
}

/// Get a single academic year by id
pub async fn get_academic_year(pool: &SqlitePool, guid: &str) -> Result<Option<AcademicYear>> {
    let year = sqlx::query_as::<_, AcademicYear>(&format!("{} WHERE guid = ?", SELECT_YEAR))
        .bind(guid)
        .fetch_optional(pool)
        .await?;

    Ok(year)
}

/// Get the single active year, if any
///
/// None is a valid, expected state (e.g. first run before any year has
/// been marked active).
pub async fn get_active(pool: &SqlitePool) -> Result<Option<AcademicYear>> {
    let year = sqlx::query_as::<_, AcademicYear>(&format!("{} WHERE is_active = 1", SELECT_YEAR))
        .fetch_optional(pool)
        .await?;

    Ok(year)
}

/// Get the single staging year, if any
pub async fn get_staging(pool: &SqlitePool) -> Result<Option<AcademicYear>> {
    let year = sqlx::query_as::<_, AcademicYear>(&format!("{} WHERE is_staging = 1", SELECT_YEAR))
        .fetch_optional(pool)
        .await?;

    Ok(year)
}

/// Mark a year as the active year, clearing the flag everywhere else
///
/// Idempotent: calling twice with the same target yields the same state.
pub async fn set_active(pool: &SqlitePool, guid: &str) -> Result<AcademicYear> {
    set_flag(pool, "is_active", guid).await
}

/// Mark a year as the staging year, clearing the flag everywhere else
pub async fn set_staging(pool: &SqlitePool, guid: &str) -> Result<AcademicYear> {
    set_flag(pool, "is_staging", guid).await
}

/// Remove an academic year
///
/// Hard delete, gated by the referential integrity guard: fails with a
/// constraint violation while any lecturer, module or module iteration
/// still references the year.
pub async fn remove_academic_year(pool: &SqlitePool, guid: &str) -> Result<()> {
    let year = get_academic_year(pool, guid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Academic year {}", guid)))?;

    if !integrity::can_delete(pool, ReferencedEntity::AcademicYear, guid).await? {
        return Err(Error::Constraint(format!(
            "Academic year '{}' is still referenced by lecturers, modules or module iterations",
            year.name
        )));
    }

    sqlx::query("DELETE FROM academic_years WHERE guid = ?")
        .bind(guid)
        .execute(pool)
        .await?;

    info!("Removed academic year '{}' ({})", year.name, guid);
    Ok(())
}

fn validate_year_fields(new: &NewAcademicYear) -> Result<()> {
    if new.name.trim().is_empty() {
        return Err(Error::Validation("Academic year name is required".to_string()));
    }
    if new.start_date.trim().is_empty() {
        return Err(Error::Validation("Academic year start date is required".to_string()));
    }
    if new.end_date.trim().is_empty() {
        return Err(Error::Validation("Academic year end date is required".to_string()));
    }
    Ok(())
}

/// Clear a singleton flag on every year except the given one
///
/// First half of the clear-then-set sequence. Not atomic with the
/// subsequent set; see the module docs for the documented race window.
async fn clear_flag(pool: &SqlitePool, flag: &str, except_guid: &str) -> Result<()> {
    // flag is one of two compile-time constants, never caller input
    let sql = format!(
        "UPDATE academic_years SET {flag} = 0, updated_at = CURRENT_TIMESTAMP \
         WHERE {flag} = 1 AND guid != ?"
    );
    sqlx::query(&sql).bind(except_guid).execute(pool).await?;
    Ok(())
}

async fn set_flag(pool: &SqlitePool, flag: &str, guid: &str) -> Result<AcademicYear> {
    let year = get_academic_year(pool, guid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Academic year {}", guid)))?;

    clear_flag(pool, flag, guid).await?;

    let sql = format!(
        "UPDATE academic_years SET {flag} = 1, updated_at = CURRENT_TIMESTAMP WHERE guid = ?"
    );
    sqlx::query(&sql).bind(guid).execute(pool).await?;

    info!("Set {} on academic year '{}' ({})", flag, year.name, guid);

    get_academic_year(pool, guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Academic year {} vanished after flag update", guid)))
}
