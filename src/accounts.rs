//! User accounts: registration, credential checks and profile reads.
//!
//! `AccountService` is the only writer of user records. Every durable write is
//! followed by a synchronous profile cache invalidation so the next read in any
//! request goes back to the database.

use tracing::{debug, error, info, warn};

use crate::cache::{CacheError, ProfileCache, UserProfile};
use crate::db::{Database, User, UserRole, is_unique_violation};
use crate::password;

#[derive(Debug)]
pub enum AccountError {
    InvalidInput(&'static str),
    DuplicateUser,
    UserNotFound,
    InvalidCredentials,
    Internal(&'static str),
}

impl std::fmt::Display for AccountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountError::InvalidInput(msg) => write!(f, "{}", msg),
            AccountError::DuplicateUser => write!(f, "User already exists"),
            AccountError::UserNotFound => write!(f, "User not found"),
            AccountError::InvalidCredentials => write!(f, "Invalid credentials"),
            AccountError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AccountError {}

fn db_failure(context: &'static str, e: sqlx::Error) -> AccountError {
    error!(error = %e, "{}", context);
    AccountError::Internal("Database error")
}

fn cache_failure(context: &'static str, e: CacheError) -> AccountError {
    error!(error = %e, "{}", context);
    AccountError::Internal("Cache error")
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            token: user.token.clone().unwrap_or_default(),
            ip: user.ip_address.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    db: Database,
    profiles: ProfileCache,
}

impl AccountService {
    pub fn new(db: Database, profiles: ProfileCache) -> Self {
        Self { db, profiles }
    }

    /// Create a user with the default role. Returns the new user id.
    pub async fn register(&self, email: &str, password: &str) -> Result<String, AccountError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AccountError::InvalidInput("Invalid email address"));
        }
        if password.is_empty() {
            return Err(AccountError::InvalidInput("Password cannot be empty"));
        }

        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|e| {
                error!(error = %e, "Password hashing task failed");
                AccountError::Internal("Password hashing failed")
            })?
            .map_err(|e| {
                error!(error = %e, "Failed to hash password");
                AccountError::Internal("Password hashing failed")
            })?;

        let id = uuid::Uuid::new_v4().to_string();
        match self.db.users().create(&id, email, &hash).await {
            Ok(()) => {
                info!(user_id = %id, "User registered");
                Ok(id)
            }
            Err(e) if is_unique_violation(&e) => {
                debug!("Registration rejected, email already in use");
                Err(AccountError::DuplicateUser)
            }
            Err(e) => Err(db_failure("Failed to create user", e)),
        }
    }

    /// Check credentials, returning the stored user on success.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let user = self
            .db
            .users()
            .get_by_email(email.trim())
            .await
            .map_err(|e| db_failure("Failed to look up user", e))?
            .ok_or(AccountError::UserNotFound)?;

        let candidate = password.to_string();
        let hash = user.password_hash.clone();
        let valid =
            tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
                .await
                .map_err(|e| {
                    error!(error = %e, "Password verification task failed");
                    AccountError::Internal("Password verification failed")
                })?;

        if !valid {
            warn!(user_id = %user.id, "Login failed, wrong password");
            return Err(AccountError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Persist the refresh token and IP of a new login.
    pub async fn record_session(
        &self,
        user_id: &str,
        refresh_token: &str,
        client_ip: &str,
    ) -> Result<(), AccountError> {
        self.db
            .users()
            .update_session(user_id, refresh_token, client_ip)
            .await
            .map_err(|e| db_failure("Failed to record session", e))?
            .ok_or(AccountError::UserNotFound)?;
        self.invalidate(user_id).await
    }

    pub async fn set_role(&self, user_id: &str, role: UserRole) -> Result<(), AccountError> {
        let updated = self
            .db
            .users()
            .set_role(user_id, role)
            .await
            .map_err(|e| db_failure("Failed to set role", e))?;
        if !updated {
            return Err(AccountError::UserNotFound);
        }
        self.invalidate(user_id).await
    }

    /// Cache-aside profile read.
    pub async fn profile(&self, user_id: &str) -> Result<UserProfile, AccountError> {
        match self.profiles.get(user_id).await {
            Ok(Some(profile)) => return Ok(profile),
            Ok(None) => {}
            // A corrupt entry is replaced below.
            Err(CacheError::Serialization(e)) => {
                warn!(user_id, error = %e, "Discarding unreadable cached profile");
            }
            Err(e) => return Err(cache_failure("Failed to read profile cache", e)),
        }

        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await
            .map_err(|e| db_failure("Failed to load user", e))?
            .ok_or(AccountError::UserNotFound)?;

        let profile = UserProfile::from(&user);
        if let Err(e) = self.profiles.put(&profile).await {
            warn!(user_id, error = %e, "Failed to populate profile cache");
        }
        Ok(profile)
    }

    async fn invalidate(&self, user_id: &str) -> Result<(), AccountError> {
        self.profiles
            .invalidate(user_id)
            .await
            .map_err(|e| cache_failure("Failed to invalidate profile cache", e))
    }
}
