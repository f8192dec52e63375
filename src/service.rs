use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::auth::{PasswordHasher, TokenIssuer, MAX_PASSWORD_BYTES};
use crate::error::{AppError, Result};
use crate::models::{Account, AccountView, DEFAULT_ROLE};
use crate::storage::{Inserted, Storage};

/// Credential operations: registration, login and password recovery.
#[derive(Clone)]
pub struct AuthService {
    storage: Storage,
    hasher: PasswordHasher,
    tokens: Arc<TokenIssuer>,
    // Verified against on unknown-user logins so both paths pay for bcrypt
    dummy_hash: Arc<OnceCell<String>>,
}

fn check_password(field: &str, password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(AppError::InvalidInput(format!("{} must not be empty", field)));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::InvalidInput(format!(
            "{} must be at most {} bytes",
            field, MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

impl AuthService {
    pub fn new(storage: Storage, hasher: PasswordHasher, tokens: Arc<TokenIssuer>) -> Self {
        Self {
            storage,
            hasher,
            tokens,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Create an account. A missing or empty role becomes `"user"`.
    pub async fn register(&self, username: &str, password: &str, role: Option<&str>) -> Result<Account> {
        if username.is_empty() {
            return Err(AppError::InvalidInput("username must not be empty".into()));
        }
        check_password("password", password)?;

        // Cheap early answer; insert_account's CAS is the real guard
        if self.storage.find_account(username)?.is_some() {
            return Err(AppError::AlreadyExists(username.to_owned()));
        }

        let role = role.filter(|r| !r.is_empty()).unwrap_or(DEFAULT_ROLE);
        let password_hash = self.hasher.hash_blocking(password.to_owned()).await?;

        match self.storage.insert_account(username, password_hash, role.to_owned())? {
            Inserted::Created(account) => {
                tracing::info!(user_id = account.id, role = %account.role, "account registered");
                Ok(account)
            }
            Inserted::UsernameTaken => {
                tracing::debug!(username, "lost registration race");
                Err(AppError::AlreadyExists(username.to_owned()))
            }
        }
    }

    /// Check credentials and issue a session token. Unknown usernames and
    /// wrong passwords are indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        // No stored hash came from a longer password; bcrypt would truncate it
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AppError::InvalidCredentials);
        }
        let account = match self.storage.find_account(username)? {
            Some(account) => account,
            None => {
                let dummy = self
                    .dummy_hash
                    .get_or_try_init(|| self.hasher.hash_blocking("unused-dummy-password".to_string()))
                    .await?;
                self.hasher
                    .verify_blocking(password.to_owned(), dummy.clone())
                    .await?;
                return Err(AppError::InvalidCredentials);
            }
        };

        let matches = self
            .hasher
            .verify_blocking(password.to_owned(), account.password_hash.clone())
            .await?;
        if !matches {
            return Err(AppError::InvalidCredentials);
        }

        let token = self
            .tokens
            .issue(account.id, &account.role)
            .map_err(|e| AppError::internal(format!("token signing: {}", e)))?;
        tracing::debug!(user_id = account.id, "session token issued");
        Ok(token)
    }

    /// Replace the password of `username` without any proof of the old one.
    pub async fn recover_password(&self, username: &str, new_password: &str) -> Result<()> {
        check_password("new password", new_password)?;
        if self.storage.find_account(username)?.is_none() {
            return Err(AppError::NotFound(username.to_owned()));
        }

        let password_hash = self.hasher.hash_blocking(new_password.to_owned()).await?;
        let account = self.storage.update_password_hash(username, &password_hash)?;
        tracing::warn!(user_id = account.id, "password replaced via unauthenticated recovery");
        Ok(())
    }

    pub fn accounts(&self) -> Result<Vec<AccountView>> {
        Ok(self
            .storage
            .list_accounts()?
            .into_iter()
            .map(AccountView::from)
            .collect())
    }
}
