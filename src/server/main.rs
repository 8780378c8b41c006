use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use domain_auth::config::load_config;
use domain_auth::server::{build_router, AppState, Database};
use domain_auth::{LicenseError, LicenseResult, Licensing};

#[tokio::main]
async fn main() -> LicenseResult<()> {
    let config = load_config()?;

    // RUST_LOG wins over logging.level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = Database::connect(&config.database).await?;
    db.migrate().await?;
    info!(db_type = db.db_type(), "Store ready");

    let licensing = Licensing::new(Arc::new(db.clone()), &config);
    let app = build_router(AppState::new(licensing, db.db_type()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LicenseError::ServerError(format!("failed to bind {addr}: {e}")))?;
    info!("Listening on http://{addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| LicenseError::ServerError(e.to_string()));

    db.close().await;
    served
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
