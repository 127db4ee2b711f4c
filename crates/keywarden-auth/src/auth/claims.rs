//! Claim set carried by every keywarden token.

use serde::{Deserialize, Serialize};

/// Token claims, using JWT registered names where one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    pub username: String,
    pub email: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
    /// JWT ID (unique per token).
    pub jti: String,
}

impl Claims {
    /// Build a fresh claim set valid for `ttl_minutes` from `now`.
    pub fn new(
        user_id: &str,
        username: &str,
        email: &str,
        issuer: &str,
        now: i64,
        ttl_minutes: u32,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            iss: issuer.to_string(),
            iat: now,
            exp: now.saturating_add(i64::from(ttl_minutes) * 60),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// The expiry instant itself already counts as expired.
    pub const fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    /// Seconds of validity left at `now`, zero once expired.
    pub const fn remaining_secs(&self, now: i64) -> i64 {
        if self.exp > now { self.exp - now } else { 0 }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_claims_span_the_ttl() {
        let claims = Claims::new("42", "alice", "alice@example.com", "keywarden", 1_000, 1440);
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.exp, 1_000 + 86_400);
        assert_eq!(claims.iss, "keywarden");
        assert!(uuid::Uuid::parse_str(&claims.jti).is_ok());
    }

    #[test]
    fn every_claim_set_gets_its_own_id() {
        let a = Claims::new("42", "alice", "a@x", "keywarden", 0, 1);
        let b = Claims::new("42", "alice", "a@x", "keywarden", 0, 1);
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let claims = Claims::new("42", "alice", "a@x", "keywarden", 100, 1);
        assert!(!claims.is_expired_at(159));
        assert!(claims.is_expired_at(160));
        assert!(claims.is_expired_at(161));
        assert_eq!(claims.remaining_secs(100), 60);
        assert_eq!(claims.remaining_secs(500), 0);
    }

    #[test]
    fn zero_ttl_is_born_expired() {
        let claims = Claims::new("42", "alice", "a@x", "keywarden", 100, 0);
        assert!(claims.is_expired_at(100));
    }

    #[test]
    fn serializes_with_registered_names() {
        let claims = Claims::new("42", "alice", "a@x", "keywarden", 100, 1);
        let json = serde_json::to_value(&claims).unwrap();
        for key in ["sub", "username", "email", "iss", "iat", "exp", "jti"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
