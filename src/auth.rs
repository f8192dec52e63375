//! Password hashing (bcrypt) and session tokens (HS256 JWT).

use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::error::AppError;
use crate::models::Claims;

/// Session lifetime, fixed at one hour from issuance.
pub const TOKEN_TTL_SECS: i64 = 3600;

/// bcrypt ignores everything past this many bytes of input.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Salted, cost-parameterized one-way password hashing.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        hash(password, self.cost)
    }

    /// Constant-time check of `password` against a stored bcrypt hash.
    /// A hash that does not parse never verifies.
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        match verify(password, hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is unreadable");
                false
            }
        }
    }

    /// Hashes on the blocking pool; bcrypt is deliberately slow.
    pub async fn hash_blocking(&self, password: String) -> Result<String, AppError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash_password(&password))
            .await
            .map_err(|e| AppError::internal(format!("hash task failed: {}", e)))?
            .map_err(|e| AppError::internal(format!("bcrypt: {}", e)))
    }

    pub async fn verify_blocking(&self, password: String, hash: String) -> Result<bool, AppError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::internal(format!("verify task failed: {}", e)))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed or its signature does not verify")]
    Invalid,
    #[error("token has expired")]
    Expired,
}

/// Issues and verifies session tokens with the process-wide secret.
///
/// Built once at startup from configuration and shared behind an `Arc`;
/// nothing mutates it afterwards.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked in verify_at against an explicit clock, strictly
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issue(&self, user_id: u64, role: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(user_id, role, Utc::now().timestamp())
    }

    pub fn issue_at(
        &self,
        user_id: u64,
        role: &str,
        now: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            user_id,
            role: role.to_owned(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Valid iff the signature checks out and `now < exp`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| TokenError::Invalid)?
            .claims;
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
