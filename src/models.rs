use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ROLE: &str = "user";
pub const ADMIN_ROLE: &str = "admin";

/// Stored account row (JSON value in the `accounts` tree, keyed by username)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

/// Account as shown to admins; the hash never leaves the server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccountView {
    pub id: u64,
    pub username: String,
    pub role: String,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            role: account.role,
        }
    }
}

/// Signed session token claims
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub user_id: u64,
    pub role: String,
    pub iat: i64, // issued at, unix seconds
    pub exp: i64, // expiry, unix seconds
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub id: u64,
    pub sensor_id: i64,
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Reading as submitted by a sensor; id and timestamp are assigned on insert
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewReading {
    pub sensor_id: i64,
    pub temperature: f64,
    pub humidity: f64,
}
