//! Profile/instance split model
//!
//! Profiles carry permanent identity attributes (a lecturer's name and
//! contract, a module's code and credits); instances carry the year-scoped
//! operational state (allocated hours, availability, status) and reference
//! exactly one profile and one academic year.
//!
//! Profile deduplication is lookup-before-insert on a natural key (email
//! for lecturers, code for modules, auth subject for users). There is no
//! database unique constraint behind it: within one migration run records
//! are processed sequentially so the lookup is deterministic, but two
//! concurrent migration runs are not guarded against creating duplicate
//! profiles for the same key.

use crate::db::models::{Lecturer, LecturerProfile, LecturerYearState, Module, ModuleProfile};
use crate::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// FTE applied when a legacy record carries none
pub const DEFAULT_FTE: f64 = 1.0;

/// Contract applied when a legacy record carries none
pub const DEFAULT_CONTRACT: &str = "Full-time";

/// Identity fields read from a legacy (pre-split) lecturer row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LegacyLecturerRow {
    pub guid: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub contract: Option<String>,
    pub fte: Option<f64>,
    pub specialism: Option<String>,
}

/// Identity fields read from a legacy (pre-split) module row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LegacyModuleRow {
    pub guid: String,
    pub code: Option<String>,
    pub title: Option<String>,
    pub credits: Option<i64>,
}

/// Fields for creating a lecturer profile directly (admin edit path)
#[derive(Debug, Clone)]
pub struct NewLecturerProfile {
    pub email: String,
    pub full_name: String,
    pub contract: Option<String>,
    pub fte: Option<f64>,
    pub specialism: Option<String>,
}

/// Fields for creating a module profile directly (admin edit path)
#[derive(Debug, Clone)]
pub struct NewModuleProfile {
    pub code: String,
    pub title: String,
    pub credits: Option<i64>,
    pub default_teaching_hours: Option<f64>,
    pub default_admin_hours: Option<f64>,
}

/// Insert a lecturer profile
///
/// No uniqueness check beyond what callers perform; the migration path
/// goes through [`resolve_or_create_lecturer_profile`] instead.
pub async fn create_lecturer_profile(
    pool: &SqlitePool,
    new: NewLecturerProfile,
) -> Result<LecturerProfile> {
    if new.email.trim().is_empty() {
        return Err(Error::Validation("Lecturer profile email is required".to_string()));
    }
    if new.full_name.trim().is_empty() {
        return Err(Error::Validation("Lecturer profile full name is required".to_string()));
    }

    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO lecturer_profiles (guid, email, full_name, contract, fte, specialism)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(&new.email)
    .bind(&new.full_name)
    .bind(new.contract.as_deref().unwrap_or(DEFAULT_CONTRACT))
    .bind(new.fte.unwrap_or(DEFAULT_FTE))
    .bind(&new.specialism)
    .execute(pool)
    .await?;

    get_lecturer_profile(pool, &guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Lecturer profile {} vanished after insert", guid)))
}

/// Insert a module profile
pub async fn create_module_profile(
    pool: &SqlitePool,
    new: NewModuleProfile,
) -> Result<ModuleProfile> {
    if new.code.trim().is_empty() {
        return Err(Error::Validation("Module profile code is required".to_string()));
    }
    if new.title.trim().is_empty() {
        return Err(Error::Validation("Module profile title is required".to_string()));
    }

    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO module_profiles (guid, code, title, credits, default_teaching_hours, default_admin_hours)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(&new.code)
    .bind(&new.title)
    .bind(new.credits)
    .bind(new.default_teaching_hours)
    .bind(new.default_admin_hours)
    .execute(pool)
    .await?;

    get_module_profile(pool, &guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Module profile {} vanished after insert", guid)))
}

/// Get a lecturer profile by id
pub async fn get_lecturer_profile(
    pool: &SqlitePool,
    guid: &str,
) -> Result<Option<LecturerProfile>> {
    let profile = sqlx::query_as::<_, LecturerProfile>(
        "SELECT guid, email, full_name, contract, fte, specialism FROM lecturer_profiles WHERE guid = ?",
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Get a module profile by id
pub async fn get_module_profile(pool: &SqlitePool, guid: &str) -> Result<Option<ModuleProfile>> {
    let profile = sqlx::query_as::<_, ModuleProfile>(
        "SELECT guid, code, title, credits, default_teaching_hours, default_admin_hours \
         FROM module_profiles WHERE guid = ?",
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Create a year-scoped lecturer instance against an existing profile
///
/// The profile id must resolve; the store itself does not foreign-key-check
/// across the split, so the check happens here.
pub async fn create_lecturer(
    pool: &SqlitePool,
    profile_id: &str,
    academic_year_id: &str,
    state: LecturerYearState,
) -> Result<Lecturer> {
    let profile = get_lecturer_profile(pool, profile_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Lecturer profile {}", profile_id)))?;

    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO lecturers (guid, profile_id, academic_year_id, email, full_name,
                               teaching_availability, allocated_teaching_hours, allocated_admin_hours,
                               total_allocated)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(profile_id)
    .bind(academic_year_id)
    .bind(&profile.email)
    .bind(&profile.full_name)
    .bind(state.teaching_availability)
    .bind(state.allocated_teaching_hours)
    .bind(state.allocated_admin_hours)
    .bind(state.allocated_teaching_hours + state.allocated_admin_hours)
    .execute(pool)
    .await?;

    get_lecturer(pool, &guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Lecturer {} vanished after insert", guid)))
}

/// Create a year-scoped module instance against an existing profile
pub async fn create_module(
    pool: &SqlitePool,
    profile_id: &str,
    academic_year_id: &str,
) -> Result<Module> {
    let profile = get_module_profile(pool, profile_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Module profile {}", profile_id)))?;

    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO modules (guid, profile_id, academic_year_id, code, title, credits)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(profile_id)
    .bind(academic_year_id)
    .bind(&profile.code)
    .bind(&profile.title)
    .bind(profile.credits)
    .execute(pool)
    .await?;

    get_module(pool, &guid)
        .await?
        .ok_or_else(|| Error::Internal(format!("Module {} vanished after insert", guid)))
}

/// Get a lecturer instance by id
pub async fn get_lecturer(pool: &SqlitePool, guid: &str) -> Result<Option<Lecturer>> {
    let lecturer = sqlx::query_as::<_, Lecturer>(
        "SELECT guid, profile_id, academic_year_id, email, full_name, contract, fte, specialism, \
                teaching_availability, total_allocated, allocated_teaching_hours, \
                allocated_admin_hours, status \
         FROM lecturers WHERE guid = ?",
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;

    Ok(lecturer)
}

/// Get a module instance by id
pub async fn get_module(pool: &SqlitePool, guid: &str) -> Result<Option<Module>> {
    let module = sqlx::query_as::<_, Module>(
        "SELECT guid, profile_id, academic_year_id, code, title, credits, site_id, faculty_id, status \
         FROM modules WHERE guid = ?",
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;

    Ok(module)
}

/// Resolve the lecturer profile for a legacy row, creating it if absent
///
/// Exact-match lookup on email; on miss, a profile is derived from the
/// legacy flat fields with defaults applied (fte 1.0, contract
/// 'Full-time'). A legacy row without an email cannot be resolved.
///
/// Returns the profile guid.
pub async fn resolve_or_create_lecturer_profile(
    pool: &SqlitePool,
    legacy: &LegacyLecturerRow,
) -> Result<String> {
    let email = legacy
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            Error::Validation(format!("Legacy lecturer {} has no email", legacy.guid))
        })?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT guid FROM lecturer_profiles WHERE email = ? LIMIT 1")
            .bind(email)
            .fetch_optional(pool)
            .await?;

    if let Some(guid) = existing {
        return Ok(guid);
    }

    let full_name = legacy
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(email);

    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO lecturer_profiles (guid, email, full_name, contract, fte, specialism)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(email)
    .bind(full_name)
    .bind(legacy.contract.as_deref().unwrap_or(DEFAULT_CONTRACT))
    .bind(legacy.fte.unwrap_or(DEFAULT_FTE))
    .bind(&legacy.specialism)
    .execute(pool)
    .await?;

    Ok(guid)
}

/// Resolve the module profile for a legacy row, creating it if absent
///
/// Keyed by module code. Default hour figures are not synthesized: a
/// module profile created from a legacy row carries only what the row had.
pub async fn resolve_or_create_module_profile(
    pool: &SqlitePool,
    legacy: &LegacyModuleRow,
) -> Result<String> {
    let code = legacy
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Validation(format!("Legacy module {} has no code", legacy.guid)))?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT guid FROM module_profiles WHERE code = ? LIMIT 1")
            .bind(code)
            .fetch_optional(pool)
            .await?;

    if let Some(guid) = existing {
        return Ok(guid);
    }

    let title = legacy
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(code);

    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO module_profiles (guid, code, title, credits)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(code)
    .bind(title)
    .bind(legacy.credits)
    .execute(pool)
    .await?;

    Ok(guid)
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

    async fn insert_year(pool: &SqlitePool, guid: &str) {
        sqlx::query(
            "INSERT INTO academic_years (guid, name, start_date, end_date) VALUES (?, 'Y', 'a', 'b')",
        )
        .bind(guid)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_instance_requires_existing_profile() {
        let pool = setup_test_db().await;
        insert_year(&pool, "y1").await;

        let err = create_lecturer(&pool, "missing-profile", "y1", Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_instance_carries_profile_and_year() {
        let pool = setup_test_db().await;
        insert_year(&pool, "y1").await;

        let profile = create_lecturer_profile(
            &pool,
            NewLecturerProfile {
                email: "a@x.com".to_string(),
                full_name: "A B".to_string(),
                contract: None,
                fte: None,
                specialism: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(profile.contract, DEFAULT_CONTRACT);
        assert_eq!(profile.fte, DEFAULT_FTE);

        let lect = create_lecturer(&pool, &profile.guid, "y1", Default::default())
            .await
            .unwrap();

        assert_eq!(lect.profile_id.as_deref(), Some(profile.guid.as_str()));
        assert_eq!(lect.academic_year_id.as_deref(), Some("y1"));
    }

    #[tokio::test]
    async fn test_resolve_reuses_profile_by_email() {
        let pool = setup_test_db().await;

        let legacy_a = LegacyLecturerRow {
            guid: "l1".to_string(),
            email: Some("a@x.com".to_string()),
            full_name: Some("A B".to_string()),
            contract: None,
            fte: None,
            specialism: None,
        };
        let legacy_b = LegacyLecturerRow {
            guid: "l2".to_string(),
            ..legacy_a.clone()
        };

        let p1 = resolve_or_create_lecturer_profile(&pool, &legacy_a).await.unwrap();
        let p2 = resolve_or_create_lecturer_profile(&pool, &legacy_b).await.unwrap();
        assert_eq!(p1, p2);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lecturer_profiles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_resolve_applies_legacy_defaults() {
        let pool = setup_test_db().await;

        let legacy = LegacyLecturerRow {
            guid: "l1".to_string(),
            email: Some("a@x.com".to_string()),
            full_name: Some("A B".to_string()),
            contract: None,
            fte: None,
            specialism: None,
        };

        let guid = resolve_or_create_lecturer_profile(&pool, &legacy).await.unwrap();
        let profile = get_lecturer_profile(&pool, &guid).await.unwrap().unwrap();

        assert_eq!(profile.fte, 1.0);
        assert_eq!(profile.contract, "Full-time");
    }

    #[tokio::test]
    async fn test_resolve_rejects_missing_email() {
        let pool = setup_test_db().await;

        let legacy = LegacyLecturerRow {
            guid: "l1".to_string(),
            email: None,
            full_name: Some("No Email".to_string()),
            contract: None,
            fte: None,
            specialism: None,
        };

        let err = resolve_or_create_lecturer_profile(&pool, &legacy).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_resolve_module_profile_by_code() {
        let pool = setup_test_db().await;

        let legacy = LegacyModuleRow {
            guid: "m1".to_string(),
            code: Some("CS101".to_string()),
            title: Some("Intro to Computing".to_string()),
            credits: Some(20),
        };

        let p1 = resolve_or_create_module_profile(&pool, &legacy).await.unwrap();
        let p2 = resolve_or_create_module_profile(&pool, &legacy).await.unwrap();
        assert_eq!(p1, p2);

        let profile = get_module_profile(&pool, &p1).await.unwrap().unwrap();
        assert_eq!(profile.code, "CS101");
        assert_eq!(profile.credits, Some(20));
    }
}
