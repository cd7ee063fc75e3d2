//! Referential integrity guard
//!
//! Pre-delete check for shared reference tables. Two deletion policies
//! coexist deliberately: academic years, sites and faculties are
//! hard-deleted once the guard clears; instance tables (lecturers,
//! modules, module iterations) use deleted_at soft delete and never pass
//! through the guard. Soft-deleted dependents do not block removal.

use crate::{Error, Result};
use sqlx::SqlitePool;

/// Shared reference entities protected by the pre-delete guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencedEntity {
    AcademicYear,
    Site,
    Faculty,
}

/// Deletion strategy for an entity table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Hard DELETE, gated by [`can_delete`]
    HardGuarded,
    /// Set deleted_at, row retained
    Soft,
}

/// Deletion policy for a table name
pub fn delete_policy(table: &str) -> DeletePolicy {
    match table {
        "academic_years" | "sites" | "faculties" => DeletePolicy::HardGuarded,
        _ => DeletePolicy::Soft,
    }
}

/// Check whether a shared reference entity may be hard-deleted
///
/// Returns false while any non-soft-deleted dependent row references the
/// entity. Dependents are scanned with an equality filter on the foreign
/// key, one table at a time.
pub async fn can_delete(pool: &SqlitePool, entity: ReferencedEntity, guid: &str) -> Result<bool> {
    let dependents: &[(&str, &str)] = match entity {
        ReferencedEntity::AcademicYear => &[
            ("lecturers", "academic_year_id"),
            ("modules", "academic_year_id"),
            ("module_iterations", "academic_year_id"),
        ],
        ReferencedEntity::Site => &[("modules", "site_id")],
        ReferencedEntity::Faculty => &[("modules", "faculty_id")],
    };

    for (table, fk_column) in dependents {
        if has_live_dependent(pool, table, fk_column, guid).await? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Soft-delete a row by setting deleted_at
///
/// Only valid for tables whose policy is [`DeletePolicy::Soft`].
pub async fn soft_delete(pool: &SqlitePool, table: &str, guid: &str) -> Result<()> {
    if delete_policy(table) != DeletePolicy::Soft {
        return Err(Error::Internal(format!(
            "Table '{}' uses guarded hard delete, not soft delete",
            table
        )));
    }

    // table is validated against the policy map above, never raw caller input
    let sql = format!(
        "UPDATE {table} SET deleted_at = CURRENT_TIMESTAMP WHERE guid = ? AND deleted_at IS NULL"
    );
    let result = sqlx::query(&sql).bind(guid).execute(pool).await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("{} {}", table, guid)));
    }

    Ok(())
}

async fn has_live_dependent(
    pool: &SqlitePool,
    table: &str,
    fk_column: &str,
    guid: &str,
) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {table} WHERE {fk_column} = ? AND deleted_at IS NULL)"
    );
    let exists: bool = sqlx::query_scalar(&sql).bind(guid).fetch_one(pool).await?;
    Ok(exists)
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
    async fn test_unreferenced_year_can_be_deleted() {
        let pool = setup_test_db().await;
        insert_year(&pool, "y1").await;

        assert!(can_delete(&pool, ReferencedEntity::AcademicYear, "y1").await.unwrap());
    }

    #[tokio::test]
    async fn test_module_iteration_blocks_year_deletion() {
        let pool = setup_test_db().await;
        insert_year(&pool, "y1").await;

        sqlx::query("INSERT INTO modules (guid, academic_year_id) VALUES ('m1', 'y1')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO module_iterations (guid, module_id, academic_year_id) VALUES ('mi1', 'm1', 'y1')",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(!can_delete(&pool, ReferencedEntity::AcademicYear, "y1").await.unwrap());
    }

    #[tokio::test]
    async fn test_soft_deleted_dependent_does_not_block() {
        let pool = setup_test_db().await;
        insert_year(&pool, "y1").await;

        sqlx::query(
            "INSERT INTO modules (guid, academic_year_id, deleted_at) VALUES ('m1', 'y1', CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(can_delete(&pool, ReferencedEntity::AcademicYear, "y1").await.unwrap());
    }

    #[tokio::test]
    async fn test_site_blocked_by_referencing_module() {
        let pool = setup_test_db().await;

        sqlx::query("INSERT INTO sites (guid, name) VALUES ('s1', 'North Campus')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO modules (guid, site_id) VALUES ('m1', 's1')")
            .execute(&pool)
            .await
            .unwrap();

        assert!(!can_delete(&pool, ReferencedEntity::Site, "s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_soft_delete_policy_split() {
        assert_eq!(delete_policy("academic_years"), DeletePolicy::HardGuarded);
        assert_eq!(delete_policy("sites"), DeletePolicy::HardGuarded);
        assert_eq!(delete_policy("lecturers"), DeletePolicy::Soft);
        assert_eq!(delete_policy("modules"), DeletePolicy::Soft);
    }

    #[tokio::test]
    async fn test_soft_delete_rejects_guarded_table() {
        let pool = setup_test_db().await;
        let err = soft_delete(&pool, "academic_years", "y1").await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_sets_deleted_at() {
        let pool = setup_test_db().await;

        sqlx::query("INSERT INTO lecturers (guid, email) VALUES ('l1', 'a@x.com')")
            .execute(&pool)
            .await
            .unwrap();

        soft_delete(&pool, "lecturers", "l1").await.unwrap();

        let deleted: Option<String> =
            sqlx::query_scalar("SELECT deleted_at FROM lecturers WHERE guid = 'l1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(deleted.is_some());

        // Already-deleted row is reported as not found
        let err = soft_delete(&pool, "lecturers", "l1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
