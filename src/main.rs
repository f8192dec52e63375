//! sensor_db server
//!
//! Usage:
//!   SENSOR_DB_JWT_SECRET=... cargo run --bin seed_data   # optional sample data
//!   SENSOR_DB_JWT_SECRET=... cargo run --bin sensor_db   # start server
//!
//! Configuration comes from the environment (or `.env`), see `config.rs`.

use std::sync::Arc;

use tokio::net::TcpListener;

use sensor_db::auth::{PasswordHasher, TokenIssuer};
use sensor_db::config::Config;
use sensor_db::rest::{create_router, AppState};
use sensor_db::storage::Storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let _log_guard = sensor_db::logging::init(&config);

    let data_dir = config.data_dir.to_string_lossy().into_owned();
    let storage = Storage::open(&data_dir)?;
    tracing::info!(data_dir = %data_dir, "storage opened");

    // Secret is fixed for the life of the process
    let tokens = Arc::new(TokenIssuer::new(&config.jwt_secret));
    let state = AppState::new(storage.clone(), PasswordHasher::new(config.bcrypt_cost), tokens);
    let app = create_router(state);

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, bcrypt_cost = config.bcrypt_cost, "sensor_db listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.flush()?;
    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutdown requested");
}
