//! Token issuance and verification.
//!
//! [`TokenCodec`] is the single entry point. It is built once against the
//! process [`KeyManager`] and pinned to one [`TokenFormat`]; the wire work
//! is delegated to a [`TokenStrategy`]:
//!
//! - [`SignedTokens`]: JWS compact, RS256. Claims are readable by anyone,
//!   verifiable with the public key.
//! - [`EncryptedTokens`]: JWE compact, RSA-OAEP-256 + A256GCM. Claims are
//!   readable only by the private-key holder.
//!
//! Strategies authenticate and decode. Issuer and expiry policy live here
//! so both formats enforce them identically.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::{DecodeError, Engine};
use keywarden_core::TokenFormat;
use keywarden_core::db::unix_timestamp;
use keywarden_crypto::KeyManager;
use tracing::debug;

use super::claims::Claims;
use super::encrypted::EncryptedTokens;
use super::signed::SignedTokens;

/// Why a token was rejected.
///
/// Every variant is surfaced to callers as "unauthorized" and is never
/// retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Not a token of the expected structure, format, or issuer.
    #[error("malformed token")]
    Malformed,
    /// Signature or authenticated decryption failed.
    #[error("token failed cryptographic verification")]
    CryptoInvalid,
    #[error("token expired")]
    Expired,
}

/// Failure while producing a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenCreationError {
    #[error("failed to serialize claims: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("failed to encrypt token: {0}")]
    Encryption(String),
}

/// One compact token serialization.
pub trait TokenStrategy: Send + Sync {
    fn format(&self) -> TokenFormat;

    fn encode(&self, claims: &Claims) -> Result<String, TokenCreationError>;

    /// Parse and authenticate `token`. Does not look at `iss` or `exp`.
    fn decode(&self, token: &str) -> Result<Claims, TokenError>;
}

/// Decode a base64url segment carrying signature or ciphertext bytes.
///
/// Stray bits in the final symbol mean the segment was altered and count as
/// a failed check. Any other decode error means the input is not a token.
pub(super) fn decode_sealed_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD.decode(segment).map_err(|e| match e {
        DecodeError::InvalidLastSymbol(..) => TokenError::CryptoInvalid,
        _ => TokenError::Malformed,
    })
}

/// Issues and verifies bearer tokens.
pub struct TokenCodec {
    keys: Arc<KeyManager>,
    strategy: Box<dyn TokenStrategy>,
    issuer: String,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("format", &self.strategy.format())
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(keys: Arc<KeyManager>, format: TokenFormat, issuer: impl Into<String>) -> Self {
        let strategy: Box<dyn TokenStrategy> = match format {
            TokenFormat::Signed => Box::new(SignedTokens::new(Arc::clone(&keys))),
            TokenFormat::Encrypted => Box::new(EncryptedTokens::new(Arc::clone(&keys))),
        };
        Self {
            keys,
            strategy,
            issuer: issuer.into(),
        }
    }

    pub fn format(&self) -> TokenFormat {
        self.strategy.format()
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue a token for the user, valid for `ttl_minutes` from now.
    pub fn issue(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
        ttl_minutes: u32,
    ) -> Result<String, TokenCreationError> {
        self.issue_at(user_id, username, email, ttl_minutes, unix_timestamp())
    }

    /// [`issue`](Self::issue) with an explicit clock.
    pub fn issue_at(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
        ttl_minutes: u32,
        now: i64,
    ) -> Result<String, TokenCreationError> {
        let claims = Claims::new(user_id, username, email, &self.issuer, now, ttl_minutes);
        self.issue_claims(&claims)
    }

    /// Encode a prepared claim set as-is.
    pub fn issue_claims(&self, claims: &Claims) -> Result<String, TokenCreationError> {
        let token = self.strategy.encode(claims)?;
        debug!(
            user_id = %claims.sub,
            jti = %claims.jti,
            format = %self.format(),
            exp = claims.exp,
            "Token issued"
        );
        Ok(token)
    }

    /// Verify `token` and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, unix_timestamp())
    }

    /// [`verify`](Self::verify) with an explicit clock.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let claims = self.strategy.decode(token)?;

        if claims.iss != self.issuer {
            debug!(issuer = %claims.iss, "Token from foreign issuer rejected");
            return Err(TokenError::Malformed);
        }
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// True iff [`verify`](Self::verify) succeeds.
    pub fn is_valid(&self, token: &str) -> bool {
        self.verify(token).is_ok()
    }

    pub fn is_valid_at(&self, token: &str, now: i64) -> bool {
        self.verify_at(token, now).is_ok()
    }

    // Each accessor runs a full verification. Callers that need several
    // fields should call `verify` once.

    pub fn subject_of(&self, token: &str) -> Option<String> {
        self.verify(token).ok().map(|c| c.sub)
    }

    pub fn username_of(&self, token: &str) -> Option<String> {
        self.verify(token).ok().map(|c| c.username)
    }

    pub fn email_of(&self, token: &str) -> Option<String> {
        self.verify(token).ok().map(|c| c.email)
    }

    pub fn token_id_of(&self, token: &str) -> Option<String> {
        self.verify(token).ok().map(|c| c.jti)
    }

    /// Base64 DER public key, served without authentication.
    pub fn public_key_base64(&self) -> String {
        self.keys.public_key_base64()
    }
}
