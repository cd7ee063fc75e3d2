//! HTTP API handlers for awm-admin

mod auth;
mod health;
mod migration;
mod years;

pub use auth::auth_middleware;
pub use health::health_routes;
pub use migration::{get_migration_status, list_migration_runs, run_profile_migration};
pub use years::{
    activate_year, create_year, delete_year, get_active_year, get_staging_year, get_year,
    list_years, stage_year, update_year,
};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Maps core errors to HTTP responses
///
/// Handlers return `Result<_, ApiError>` and propagate awm-common errors
/// with `?`.
#[derive(Debug)]
pub struct ApiError(pub awm_common::Error);

impl From<awm_common::Error> for ApiError {
    fn from(err: awm_common::Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use awm_common::Error;

        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Constraint(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.0.to_string(),
        }));

        (status, body).into_response()
    }
}
