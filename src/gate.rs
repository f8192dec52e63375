//! Access gate: authenticate the bearer token, then authorize its role.
//!
//! The two stages are plain functions so each can be tested on its own;
//! `require_roles` strings them together as axum middleware.
//!
//! ```text
//! Unauthenticated --token?--> Authenticated | Rejected
//! Authenticated --role allowed?--> Permitted | RoleDenied
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::{TokenError, TokenIssuer};
use crate::error::{AppError, Result};
use crate::models::Claims;

/// Roles permitted to invoke one protected operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    roles: BTreeSet<String>,
}

impl AllowList {
    pub fn of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn permits(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Pull the token out of an `Authorization: <scheme> <token>` header value.
/// The scheme word is not checked: a `Basic ...` credential is handed on as a
/// token and fails verification. No header, a single word or an empty token
/// counts as no credential at all.
pub fn bearer_token(header_value: Option<&str>) -> Result<&str> {
    header_value
        .and_then(|value| value.split(' ').nth(1))
        .filter(|token| !token.is_empty())
        .ok_or(AppError::MissingToken)
}

/// Stage one. Every verification failure collapses to `Forbidden`.
pub fn authenticate(tokens: &TokenIssuer, header_value: Option<&str>) -> Result<Claims> {
    let token = bearer_token(header_value)?;
    tokens.verify(token).map_err(|e| {
        match e {
            TokenError::Expired => tracing::debug!("rejected expired token"),
            TokenError::Invalid => tracing::debug!("rejected invalid token"),
        }
        AppError::Forbidden
    })
}

/// Stage two.
pub fn authorize(claims: &Claims, allowed: &AllowList) -> Result<()> {
    if allowed.permits(&claims.role) {
        Ok(())
    } else {
        Err(AppError::RoleDenied(claims.role.clone()))
    }
}

/// Both stages, short-circuiting. `Ok` means Permitted.
pub fn check(tokens: &TokenIssuer, header_value: Option<&str>, allowed: &AllowList) -> Result<Claims> {
    let claims = authenticate(tokens, header_value)?;
    authorize(&claims, allowed)?;
    Ok(claims)
}

/// Per-route-group gate state for `middleware::from_fn_with_state`.
#[derive(Clone)]
pub struct Gate {
    tokens: Arc<TokenIssuer>,
    allowed: AllowList,
}

impl Gate {
    pub fn new(tokens: Arc<TokenIssuer>, allowed: AllowList) -> Self {
        Self { tokens, allowed }
    }
}

/// Middleware: on Permitted the verified claims go into request extensions
/// and the request is passed on; otherwise the handler never runs.
pub async fn require_roles(State(gate): State<Gate>, mut req: Request, next: Next) -> Result<Response> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let claims = check(&gate.tokens, header_value, &gate.allowed).map_err(|e| {
        tracing::info!(path = %req.uri().path(), reason = %e, "access gate denied request");
        e
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
