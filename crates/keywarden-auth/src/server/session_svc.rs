//! Session operations: login, register, refresh, logout, verify, me and
//! public key.
//!
//! Tokens are not tracked server side. Logout is advisory and refresh
//! never invalidates the presented token.

use std::sync::Arc;

use keywarden_core::config::DEFAULT_TOKEN_TTL_MINUTES;
use keywarden_core::db::{DatabaseError, unix_timestamp};
use tracing::{info, instrument, warn};

use super::types::{
    AuthResponse, LogoutResponse, NewUser, PublicKeyResponse, TOKEN_TYPE, VerifyResponse,
};
use crate::auth::gate::extract_bearer;
use crate::auth::{AuthError, AuthGate, TokenCodec, UserIdentity, password};
use crate::storage::{NewUserRecord, UserDatabase, UserDirectory};

/// Acknowledgement returned by logout.
pub const LOGOUT_MESSAGE: &str = "logout successful";

pub struct SessionService {
    db: UserDatabase,
    gate: AuthGate<UserDatabase>,
    ttl_minutes: u32,
}

impl SessionService {
    pub fn new(db: UserDatabase, codec: Arc<TokenCodec>) -> Self {
        Self {
            gate: AuthGate::new(codec, db.clone()),
            db,
            ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
        }
    }

    /// Override the lifetime of tokens issued by this service.
    #[must_use]
    pub const fn with_ttl_minutes(mut self, ttl_minutes: u32) -> Self {
        self.ttl_minutes = ttl_minutes;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        self.gate.codec()
    }

    pub const fn gate(&self) -> &AuthGate<UserDatabase> {
        &self.gate
    }

    pub const fn database(&self) -> &UserDatabase {
        &self.db
    }

    #[instrument(skip(self, password), fields(op = "login"))]
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let Some(user) = self.db.find_by_username(username).await? else {
            password::verify_decoy(password);
            warn!(username = %username, "Failed login attempt");
            return Err(AuthError::BadCredentials);
        };

        if !password::verify_password(password, &user.password_hash)? {
            warn!(username = %username, "Failed login attempt");
            return Err(AuthError::BadCredentials);
        }

        if !user.is_active {
            warn!(user_id = %user.id, "Login refused for inactive account");
            return Err(AuthError::AccountInactive);
        }

        let response = self.issue_for(UserIdentity::from(user), unix_timestamp())?;
        info!(user_id = %response.user.id, username = %response.user.username, "User logged in");
        Ok(response)
    }

    #[instrument(skip(self, new_user), fields(op = "register", username = %new_user.username))]
    pub async fn register(&self, new_user: NewUser) -> Result<AuthResponse, AuthError> {
        if self.db.username_exists(&new_user.username).await? {
            return Err(AuthError::UsernameTaken);
        }
        if self.db.email_exists(&new_user.email).await? {
            return Err(AuthError::EmailTaken);
        }

        let hash = password::hash_password(&new_user.password)?;
        let user_id = uuid::Uuid::new_v4().to_string();

        let user = self
            .db
            .create_user(&NewUserRecord {
                id: &user_id,
                username: &new_user.username,
                email: &new_user.email,
                password_hash: &hash,
                first_name: &new_user.first_name,
                last_name: &new_user.last_name,
            })
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration.
                DatabaseError::Conflict(msg) if msg.contains("users.email") => {
                    AuthError::EmailTaken
                }
                DatabaseError::Conflict(_) => AuthError::UsernameTaken,
                other => AuthError::Storage(other),
            })?;

        let response = self.issue_for(UserIdentity::from(user), unix_timestamp())?;
        info!(user_id = %response.user.id, "User registered");
        Ok(response)
    }

    /// Issue a fresh token for the bearer of a valid one.
    pub async fn refresh(&self, header: Option<&str>) -> Result<AuthResponse, AuthError> {
        self.refresh_at(header, unix_timestamp()).await
    }

    #[instrument(skip(self, header), fields(op = "refresh"))]
    pub async fn refresh_at(
        &self,
        header: Option<&str>,
        now: i64,
    ) -> Result<AuthResponse, AuthError> {
        let identity = self.gate.authenticate_at(header, now).await?;
        let response = self.issue_for(identity, now)?;
        info!(user_id = %response.user.id, "Token refreshed");
        Ok(response)
    }

    /// Nothing to clear server side; the caller discards its token.
    pub fn logout(&self) -> LogoutResponse {
        LogoutResponse {
            message: LOGOUT_MESSAGE.to_string(),
        }
    }

    /// Report whether the presented token is currently valid. Never fails.
    pub fn verify(&self, header: Option<&str>) -> VerifyResponse {
        self.verify_at(header, unix_timestamp())
    }

    pub fn verify_at(&self, header: Option<&str>, now: i64) -> VerifyResponse {
        let claims = header
            .and_then(extract_bearer)
            .and_then(|token| self.codec().verify_at(token, now).ok());
        VerifyResponse {
            valid: claims.is_some(),
            token_info: claims,
        }
    }

    /// The user behind the presented token.
    pub async fn current_user(&self, header: Option<&str>) -> Result<UserIdentity, AuthError> {
        self.gate.authenticate(header).await
    }

    /// Open endpoint: no authentication.
    pub fn public_key(&self) -> PublicKeyResponse {
        PublicKeyResponse {
            public_key: self.codec().public_key_base64(),
        }
    }

    fn issue_for(&self, user: UserIdentity, now: i64) -> Result<AuthResponse, AuthError> {
        let token = self
            .codec()
            .issue_at(&user.id, &user.username, &user.email, self.ttl_minutes, now)?;
        Ok(AuthResponse {
            token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: i64::from(self.ttl_minutes) * 60,
            user,
        })
    }
}
