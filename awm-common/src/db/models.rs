//! Database models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An academic year record
///
/// At most one row is active and at most one is staging at any time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AcademicYear {
    pub guid: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_staging: bool,
}

/// Fields for creating a new academic year
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAcademicYear {
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_staging: bool,
}

/// Partial update for an academic year
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcademicYearPatch {
    pub name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub is_staging: Option<bool>,
}

/// Permanent identity attributes of a lecturer
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LecturerProfile {
    pub guid: String,
    pub email: String,
    pub full_name: String,
    pub contract: String,
    pub fte: f64,
    pub specialism: Option<String>,
}

/// Year-scoped lecturer instance
///
/// Legacy rows predate the profile split: profile_id and academic_year_id
/// may be NULL and the flat identity fields (email, full_name, ...) are
/// populated instead.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lecturer {
    pub guid: String,
    pub profile_id: Option<String>,
    pub academic_year_id: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub contract: Option<String>,
    pub fte: Option<f64>,
    pub specialism: Option<String>,
    pub teaching_availability: f64,
    pub total_allocated: f64,
    pub allocated_teaching_hours: f64,
    pub allocated_admin_hours: f64,
    pub status: String,
}

/// Year-specific mutable state for a new lecturer instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LecturerYearState {
    #[serde(default)]
    pub teaching_availability: f64,
    #[serde(default)]
    pub allocated_teaching_hours: f64,
    #[serde(default)]
    pub allocated_admin_hours: f64,
}

/// Permanent identity attributes of a module
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModuleProfile {
    pub guid: String,
    pub code: String,
    pub title: String,
    pub credits: Option<i64>,
    pub default_teaching_hours: Option<f64>,
    pub default_admin_hours: Option<f64>,
}

/// Year-scoped module instance
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Module {
    pub guid: String,
    pub profile_id: Option<String>,
    pub academic_year_id: Option<String>,
    pub code: Option<String>,
    pub title: Option<String>,
    pub credits: Option<i64>,
    pub site_id: Option<String>,
    pub faculty_id: Option<String>,
    pub status: String,
}

/// An application user linked to an external auth subject
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub guid: String,
    pub auth_subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Audit record for one migration engine invocation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MigrationRun {
    pub id: i64,
    pub name: String,
    pub version: String,
    /// Epoch milliseconds at which the run started
    pub applied_at: i64,
    pub duration_ms: i64,
    pub status: String,
    pub records_processed: i64,
    pub error_count: i64,
    /// JSON array of { step, error, details }
    pub error_details: String,
    /// JSON array of step labels executed by the run
    pub steps: String,
}
