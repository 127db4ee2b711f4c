//! Errors surfaced by the auth gate and session operations.

use keywarden_core::db::DatabaseError;

use super::codec::{TokenCreationError, TokenError};

/// HTTP-equivalent status for every authentication rejection.
pub const STATUS_UNAUTHORIZED: u16 = 401;
/// HTTP-equivalent status for registration conflicts.
pub const STATUS_CONFLICT: u16 = 409;
/// HTTP-equivalent status for internal faults.
pub const STATUS_INTERNAL: u16 = 500;

/// Authentication and session failures.
///
/// The `Display` text of the 401 class is what callers see. It never says
/// which of username or password was wrong, and never distinguishes a bad
/// token from a token whose user is gone.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken(#[source] TokenError),

    #[error("invalid token")]
    UnknownSubject,

    #[error("Invalid login or password")]
    BadCredentials,

    #[error("user account is inactive")]
    AccountInactive,

    #[error("A user with this username already exists")]
    UsernameTaken,

    #[error("A user with this e-mail already exists")]
    EmailTaken,

    #[error("token creation failed: {0}")]
    TokenCreation(#[from] TokenCreationError),

    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("credential check failed: {0}")]
    Credential(String),
}

impl AuthError {
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::MissingToken
            | Self::InvalidToken(_)
            | Self::UnknownSubject
            | Self::BadCredentials
            | Self::AccountInactive => STATUS_UNAUTHORIZED,
            Self::UsernameTaken | Self::EmailTaken => STATUS_CONFLICT,
            Self::TokenCreation(_) | Self::Storage(_) | Self::Credential(_) => STATUS_INTERNAL,
        }
    }

    /// True for every outcome that means "request rejected, not our fault".
    pub const fn is_unauthorized(&self) -> bool {
        self.status_code() == STATUS_UNAUTHORIZED
    }

    /// Message safe to hand to a client. Internal faults are not described.
    pub fn public_message(&self) -> String {
        if self.status_code() == STATUS_INTERNAL {
            "internal error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(e: argon2::password_hash::Error) -> Self {
        Self::Credential(e.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn authentication_outcomes_are_401() {
        for err in [
            AuthError::MissingToken,
            AuthError::InvalidToken(TokenError::Expired),
            AuthError::UnknownSubject,
            AuthError::BadCredentials,
            AuthError::AccountInactive,
        ] {
            assert_eq!(err.status_code(), 401, "{err:?}");
            assert!(err.is_unauthorized());
        }
    }

    #[test]
    fn bad_token_and_deleted_user_read_the_same() {
        assert_eq!(
            AuthError::InvalidToken(TokenError::CryptoInvalid).public_message(),
            AuthError::UnknownSubject.public_message()
        );
    }

    #[test]
    fn conflicts_are_409() {
        assert_eq!(AuthError::UsernameTaken.status_code(), 409);
        assert_eq!(AuthError::EmailTaken.status_code(), 409);
    }

    #[test]
    fn internal_faults_hide_details() {
        let err = AuthError::Storage(DatabaseError::Query("disk I/O error".into()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "internal error");
        assert!(err.to_string().contains("disk I/O error"));
    }
}
