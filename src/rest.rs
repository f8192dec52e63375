//! REST API layer using Axum.
//!
//! Public endpoints issue and manage credentials; the telemetry and account
//! endpoints sit behind the access gate with a per-group role allow-list:
//! - readers/writers of readings: `admin`, `user`
//! - clearing readings, listing accounts: `admin`

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{PasswordHasher, TokenIssuer};
use crate::error::Result;
use crate::gate::{require_roles, AllowList, Gate};
use crate::models::{AccountView, Claims, NewReading, SensorReading, ADMIN_ROLE, DEFAULT_ROLE};
use crate::service::AuthService;
use crate::storage::Storage;

/// Shared app state for REST handlers (clones share the same Sled handles)
#[derive(Clone)]
pub struct AppState {
    auth: AuthService,
    storage: Storage,
    tokens: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(storage: Storage, hasher: PasswordHasher, tokens: Arc<TokenIssuer>) -> Self {
        Self {
            auth: AuthService::new(storage.clone(), hasher, tokens.clone()),
            storage,
            tokens,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Serialize, Deserialize)]
pub struct RecoverPasswordRequest {
    pub username: String,
    #[serde(alias = "newPassword")]
    pub new_password: String,
}

/// Generic REST response (JSON)
#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub count: Option<usize>,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            count: None,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let member_gate = Gate::new(state.tokens.clone(), AllowList::of([ADMIN_ROLE, DEFAULT_ROLE]));
    let admin_gate = Gate::new(state.tokens.clone(), AllowList::of([ADMIN_ROLE]));

    let member_routes = Router::new()
        .route("/readings", get(list_readings_handler).post(append_reading_handler))
        .route_layer(middleware::from_fn_with_state(member_gate, require_roles));

    let admin_routes = Router::new()
        .route("/clear-readings", delete(clear_readings_handler))
        .route("/accounts", get(list_accounts_handler))
        .route_layer(middleware::from_fn_with_state(admin_gate, require_roles));

    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/recover-password", post(recover_password_handler))
        .route("/health", get(health_handler))
        .merge(member_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn register_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    state
        .auth
        .register(&payload.username, &payload.password, payload.role.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(MessageResponse::new("account created"))))
}

async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let token = state.auth.login(&payload.username, &payload.password).await?;
    Ok(Json(LoginResponse { token }))
}

async fn recover_password_handler(
    State(state): State<AppState>,
    Json(payload): Json<RecoverPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    state
        .auth
        .recover_password(&payload.username, &payload.new_password)
        .await?;
    Ok(Json(MessageResponse::new("password updated")))
}

async fn list_readings_handler(State(state): State<AppState>) -> Result<Json<Vec<SensorReading>>> {
    Ok(Json(state.storage.all_readings()?))
}

async fn append_reading_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewReading>,
) -> Result<(StatusCode, Json<SensorReading>)> {
    let reading = state.storage.append_reading(payload)?;
    tracing::debug!(reading_id = reading.id, sensor_id = reading.sensor_id, by = claims.user_id, "reading stored");
    Ok((StatusCode::CREATED, Json(reading)))
}

async fn clear_readings_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>> {
    let removed = state.storage.clear_readings()?;
    tracing::info!(removed, by = claims.user_id, "readings cleared");
    Ok(Json(MessageResponse {
        message: "readings cleared".to_string(),
        count: Some(removed),
    }))
}

async fn list_accounts_handler(State(state): State<AppState>) -> Result<Json<Vec<AccountView>>> {
    Ok(Json(state.auth.accounts()?))
}

async fn health_handler() -> Json<MessageResponse> {
    Json(MessageResponse::new("ok"))
}
