//! Bearer-token gate in front of every protected operation.

use std::sync::Arc;

use keywarden_core::db::unix_timestamp;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::codec::TokenCodec;
use super::error::AuthError;
use crate::storage::{User, UserDirectory};

const BEARER_PREFIX: &str = "Bearer ";

/// Pull the token out of an `Authorization` header value.
///
/// Only the exact, case-sensitive `"Bearer "` prefix is recognised. Any
/// other scheme, or an empty token, yields `None`.
pub fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
}

/// Caller-facing projection of a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
}

impl From<User> for UserIdentity {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_active: user.is_active,
        }
    }
}

/// Resolves an `Authorization` header to a known user.
pub struct AuthGate<D> {
    codec: Arc<TokenCodec>,
    users: D,
}

impl<D: UserDirectory> AuthGate<D> {
    pub const fn new(codec: Arc<TokenCodec>, users: D) -> Self {
        Self { codec, users }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub const fn users(&self) -> &D {
        &self.users
    }

    /// Extract, verify, and resolve the bearer token in `header`.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<UserIdentity, AuthError> {
        self.authenticate_at(header, unix_timestamp()).await
    }

    /// [`authenticate`](Self::authenticate) with an explicit clock.
    pub async fn authenticate_at(
        &self,
        header: Option<&str>,
        now: i64,
    ) -> Result<UserIdentity, AuthError> {
        let token = header
            .and_then(extract_bearer)
            .ok_or(AuthError::MissingToken)?;

        let claims = self.codec.verify_at(token, now).map_err(|e| {
            debug!(reason = %e, "Bearer token rejected");
            AuthError::InvalidToken(e)
        })?;

        let user = self
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| {
                debug!(user_id = %claims.sub, "Token subject no longer exists");
                AuthError::UnknownSubject
            })?;

        debug!(
            user_id = %user.id,
            remaining_secs = claims.remaining_secs(now),
            "Bearer token accepted"
        );
        Ok(UserIdentity::from(user))
    }
}
