//! Signed session claims for access and refresh tokens.
//!
//! Both token kinds share one claims shape and one HS256 key; they only differ
//! in lifetime and in where they are stored (bearer header vs. cookie).
//! `verify` checks signature and structure but not freshness: callers compare
//! `expires_at` themselves so "expired" can be told apart from "invalid".

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default access token lifetime: 30 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 30 * 60;

/// Default refresh token lifetime: 3 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 3 * 24 * 60 * 60;

const ISSUER: &str = "turnstile";

/// Session claims embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    /// Issued at (Unix timestamp)
    #[serde(rename = "iat")]
    pub issued_at: u64,
    /// Expiration time (Unix timestamp)
    #[serde(rename = "exp")]
    pub expires_at: u64,
    #[serde(rename = "iss", default)]
    pub issuer: String,
    /// Unique per token, so two tokens minted in the same second differ
    #[serde(rename = "jti", default)]
    pub token_id: String,
}

impl Claims {
    /// True once `expires_at` lies strictly in the past.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at < now
    }

    /// Seconds left before expiry, zero if already expired.
    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

/// Access and refresh token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::from_secs(ACCESS_TOKEN_DURATION_SECS),
            refresh: Duration::from_secs(REFRESH_TOKEN_DURATION_SECS),
        }
    }
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetimes: TokenLifetimes,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret and default lifetimes.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_lifetimes(secret, TokenLifetimes::default())
    }

    pub fn with_lifetimes(secret: &[u8], lifetimes: TokenLifetimes) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Sign claims for `user_id` valid for `lifetime` from now.
    pub fn mint(
        &self,
        user_id: &str,
        email: &str,
        lifetime: Duration,
    ) -> Result<IssuedToken, JwtError> {
        let now = now_secs()?;
        let duration = lifetime.as_secs();
        let exp = now.checked_add(duration).ok_or(JwtError::TimeError)?;

        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            issued_at: now,
            expires_at: exp,
            issuer: ISSUER.to_string(),
            token_id: uuid::Uuid::new_v4().to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Generate a short-lived access token.
    pub fn mint_access(&self, user_id: &str, email: &str) -> Result<IssuedToken, JwtError> {
        self.mint(user_id, email, self.lifetimes.access)
    }

    /// Generate a long-lived refresh token.
    pub fn mint_refresh(&self, user_id: &str, email: &str) -> Result<IssuedToken, JwtError> {
        self.mint(user_id, email, self.lifetimes.refresh)
    }

    /// Decode a token and check its signature.
    ///
    /// Only HS256 is accepted, so a token declaring any other algorithm fails
    /// even if it was signed with the same secret. Expiry is not checked here.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(JwtError::Decoding)?;

        if token_data.claims.user_id.is_empty() {
            return Err(JwtError::MissingSubject);
        }

        Ok(token_data.claims)
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    Decoding(jsonwebtoken::errors::Error),
    /// Claims carry no user id
    MissingSubject,
    /// System time error
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::MissingSubject => write!(f, "Token has no user id"),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
