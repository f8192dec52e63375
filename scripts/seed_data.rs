//! Seed script for sensor_db
//!
//! Creates an `admin` account (password from SENSOR_DB_SEED_ADMIN_PASSWORD,
//! default "admin") and a handful of sample readings, written straight into
//! the data directory. Run with the server stopped: Sled allows one process.
//!
//! Run: cargo run --bin seed_data

use std::env;

use sensor_db::auth::PasswordHasher;
use sensor_db::config::Config;
use sensor_db::models::{NewReading, ADMIN_ROLE};
use sensor_db::storage::{Inserted, Storage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let _log_guard = sensor_db::logging::init(&config);

    let storage = Storage::open(&config.data_dir.to_string_lossy())?;
    let hasher = PasswordHasher::new(config.bcrypt_cost);

    let admin_password = env::var("SENSOR_DB_SEED_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let password_hash = hasher.hash_blocking(admin_password).await?;
    match storage.insert_account("admin", password_hash, ADMIN_ROLE.to_string())? {
        Inserted::Created(account) => tracing::info!(user_id = account.id, "admin account created"),
        Inserted::UsernameTaken => tracing::info!("admin account already present, left untouched"),
    }

    // Three sensors, a few samples each
    for i in 0..9 {
        let reading = NewReading {
            sensor_id: (i % 3) + 1,
            temperature: 20.0 + (i as f64) * 0.5,
            humidity: 45.0 + ((i * 7) % 10) as f64,
        };
        storage.append_reading(reading)?;
    }
    storage.flush()?;

    let total = storage.all_readings()?.len();
    tracing::info!(total, "sample readings loaded");
    Ok(())
}
