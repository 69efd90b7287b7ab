use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use marketplace::config::AppConfig;
use marketplace::db;
use marketplace::db::store::SqliteAppointmentStore;
use marketplace::handlers;
use marketplace::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = Arc::new(Mutex::new(db::init_db(&config.database_url)?));

    let state = Arc::new(AppState {
        db: Arc::clone(&conn),
        config: config.clone(),
        appointments: Box::new(SqliteAppointmentStore::new(conn)),
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
