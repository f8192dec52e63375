use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Every failure the service can hand back to a caller.
///
/// `Storage` and `Internal` are infrastructure faults and get logged at
/// error level when turned into a response; everything else is an expected,
/// user-facing outcome of a policy decision.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("account already exists: {0}")]
    AlreadyExists(String),

    #[error("account not found: {0}")]
    NotFound(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("bearer token not provided")]
    MissingToken,

    #[error("access denied")]
    Forbidden,

    #[error("role '{0}' is not allowed to access this resource")]
    RoleDenied(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn storage<T: Into<String>>(msg: T) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AlreadyExists(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::MissingToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::RoleDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for faults of the underlying machinery rather than of the request.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AppError::Storage(_) | AppError::Internal(_))
    }
}

impl From<sled::Error> for AppError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("corrupt record: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.is_infrastructure() {
            tracing::error!(error = %self, "request failed");
            // Details stay in the log
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (self.status(), Json(json!({ "message": message }))).into_response()
    }
}
