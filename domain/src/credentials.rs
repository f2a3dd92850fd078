//! Register / login / verify flows over the user repository.
//!
//! Hashing and token signing are ports so the service stays free of crypto
//! crates; the production implementations live in `token-auth`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::record::Record;
use crate::users::{User, UserRepository, UserTier};
use crate::CoreError;

/// One-way salted password hashing.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, CoreError>;
    /// True when `password` hashes to `encoded`. Malformed input is a mismatch.
    fn verify(&self, password: &str, encoded: &str) -> bool;
}

/// Claims carried by an access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    pub iat: u64,
    pub exp: u64,
}

/// Signed, time-bounded access tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, subject: &str, email: &str) -> Result<String, CoreError>;
    /// Claims of a valid token; `None` for any validation failure.
    fn verify(&self, token: &str) -> Option<TokenClaims>;
}

/// Result of a successful login.
#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

pub struct CredentialService {
    users: Arc<UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
}

impl CredentialService {
    pub fn new(
        users: Arc<UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
        }
    }

    /// Create an active, unverified casual account. The returned user carries
    /// no password hash.
    pub fn register(&self, email: &str, password: &str) -> Result<User, CoreError> {
        if self.users.find_by_email(email)?.is_some() {
            return Err(CoreError::AlreadyExists(format!("user {}", email)));
        }

        let password_hash = self.hasher.hash(password)?;
        let data = into_record(json!({
            "email": email,
            "passwordHash": password_hash,
            "isActive": true,
            "isEmailVerified": false,
            "tier": UserTier::Casual.as_str(),
        }));
        let user = self.users.create(data)?;
        info!(user_id = %user.id, "user registered");
        Ok(user.without_secret())
    }

    /// Check credentials and issue a token for the user. Unknown email and
    /// wrong password fail identically.
    pub fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, CoreError> {
        let Some(user) = self.users.find_by_email(email)? else {
            warn!("login rejected");
            return Err(CoreError::InvalidCredentials);
        };
        let stored = user.password_hash.as_deref().unwrap_or_default();
        if !self.hasher.verify(password, stored) {
            warn!("login rejected");
            return Err(CoreError::InvalidCredentials);
        }

        let token = self.tokens.issue(&user.id, &user.email)?;
        info!(user_id = %user.id, "login succeeded");
        Ok(LoginOutcome { token, user })
    }

    pub fn verify_token(&self, token: &str) -> Option<TokenClaims> {
        self.tokens.verify(token)
    }

    pub fn refresh_token(&self, _refresh_token: &str) -> Result<LoginOutcome, CoreError> {
        Err(CoreError::NotImplemented("token refresh".into()))
    }

    pub fn verify_email(&self, _token: &str) -> Result<(), CoreError> {
        Err(CoreError::NotImplemented("email verification".into()))
    }

    pub fn forgot_password(&self, _email: &str) -> Result<(), CoreError> {
        Err(CoreError::NotImplemented("password reset request".into()))
    }

    pub fn reset_password(&self, _token: &str, _new_password: &str) -> Result<(), CoreError> {
        Err(CoreError::NotImplemented("password reset".into()))
    }
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}
