//! Request and response shapes for the session operations.

use serde::{Deserialize, Serialize};

use keywarden_core::db::unix_timestamp;

use crate::auth::{AuthError, Claims, UserIdentity};

/// Scheme name returned alongside every issued token.
pub const TOKEN_TYPE: &str = "Bearer";

/// Registration input. `password` is plaintext and is hashed before storage.
#[derive(Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Returned by login, refresh and registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserIdentity,
}

/// Diagnostic view of a presented token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_info: Option<Claims>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    /// Standard base64 of the DER `SubjectPublicKeyInfo`.
    pub public_key: String,
}

/// Structured failure body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    /// Unix seconds when the error was produced.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: unix_timestamp(),
            details: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl IntoIterator<Item = String>) -> Self {
        self.details.extend(details);
        self
    }
}

impl From<&AuthError> for ErrorResponse {
    fn from(err: &AuthError) -> Self {
        Self::new(err.public_message())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_user_debug_hides_password() {
        let user = NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "hunter22".into(),
            first_name: String::new(),
            last_name: String::new(),
        };
        let debug = format!("{user:?}");
        assert!(!debug.contains("hunter22"));
        assert!(debug.contains("alice"));
    }

    #[test]
    fn new_user_names_are_optional() {
        let user: NewUser = serde_json::from_str(
            r#"{"username":"alice","email":"alice@example.com","password":"pw"}"#,
        )
        .unwrap();
        assert!(user.first_name.is_empty());
        assert!(user.last_name.is_empty());
    }

    #[test]
    fn error_response_omits_empty_details() {
        let json = serde_json::to_value(ErrorResponse::new("invalid token")).unwrap();
        assert_eq!(json["message"], "invalid token");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
        assert!(json.get("details").is_none());

        let json = serde_json::to_value(
            ErrorResponse::new("validation failed").with_details(["username: too short".to_string()]),
        )
        .unwrap();
        assert_eq!(json["details"][0], "username: too short");
    }

    #[test]
    fn error_response_from_auth_error_is_generic() {
        let resp = ErrorResponse::from(&AuthError::BadCredentials);
        assert_eq!(resp.message, "Invalid login or password");

        let resp = ErrorResponse::from(&AuthError::Credential("bad phc".into()));
        assert_eq!(resp.message, "internal error");
    }

    #[test]
    fn invalid_verify_response_has_no_info() {
        let json = serde_json::to_value(VerifyResponse {
            valid: false,
            token_info: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "valid": false }));
    }
}
