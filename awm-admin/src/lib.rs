//! awm-admin library - administrative HTTP service
//!
//! Thin axum surface over the awm-common core: academic year
//! administration, the profile migration trigger and its status query.

use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Shared secret for API authentication (0 disables auth)
    pub shared_secret: i64,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, shared_secret: i64) -> Self {
        Self { db, shared_secret }
    }
}

/// Build application router
///
/// Health endpoint is public; everything under /api requires
/// authentication via the shared-secret middleware.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/years", get(api::list_years).post(api::create_year))
        .route("/api/years/active", get(api::get_active_year))
        .route("/api/years/staging", get(api::get_staging_year))
        .route(
            "/api/years/:id",
            get(api::get_year).patch(api::update_year).delete(api::delete_year),
        )
        .route("/api/years/:id/activate", post(api::activate_year))
        .route("/api/years/:id/stage", post(api::stage_year))
        .route("/api/migration/profiles", post(api::run_profile_migration))
        .route("/api/migration/status", get(api::get_migration_status))
        .route("/api/migration/runs", get(api::list_migration_runs))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new().merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
