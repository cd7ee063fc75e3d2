//! awm-admin - Academic Workload Manager administrative service
//!
//! Hosts the academic year registry endpoints and the profile structure
//! migration trigger. Intended for a single admin actor; mutating
//! operations are not guarded against concurrent callers.

use anyhow::Result;
use awm_admin::{build_router, AppState};
use awm_common::api::auth::load_shared_secret;
use awm_common::config::{prepare_root_folder, resolve_root_folder};
use awm_common::db::init_database;
use clap::Parser;
use tracing::{error, info};

/// Environment variable consulted for the root folder
const ROOT_FOLDER_ENV: &str = "AWM_ROOT_FOLDER";

#[derive(Parser, Debug)]
#[command(name = "awm-admin", about = "Academic Workload Manager admin service")]
struct Args {
    /// Root folder holding awm.db (overrides env var and config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// Port to listen on
    #[arg(long, default_value_t = 5780)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init, before
    // any database delays
    info!(
        "Starting AWM Admin (awm-admin) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV);
    let db_path = prepare_root_folder(&root_folder)?;
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    // Load (or generate) the shared secret for API authentication
    let shared_secret = load_shared_secret(&pool).await?;
    if shared_secret == 0 {
        info!("API authentication disabled (shared_secret = 0)");
    } else {
        info!("✓ Loaded shared secret for API authentication");
    }

    let state = AppState::new(pool, shared_secret);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("awm-admin listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
