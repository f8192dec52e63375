//! sensor_db: sensor telemetry storage behind credential-based access control
//!
//! - Credentials: bcrypt-hashed accounts in Sled, unique per username
//! - Sessions: stateless HS256 tokens, one-hour lifetime
//! - Access gate: bearer token check, then per-route role allow-list
//! - REST: Axum handlers for accounts and sensor readings

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod models;
// REST API module: Axum router, gated route groups
pub mod rest;
pub mod service;
pub mod storage;
