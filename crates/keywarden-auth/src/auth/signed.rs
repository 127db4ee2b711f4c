//! JWS compact tokens signed with RS256.

use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use keywarden_core::TokenFormat;
use keywarden_crypto::KeyManager;
use tracing::debug;

use super::claims::Claims;
use super::codec::{TokenCreationError, TokenError, TokenStrategy, decode_sealed_segment};

/// RS256 signed tokens.
#[derive(Clone)]
pub struct SignedTokens {
    keys: Arc<KeyManager>,
    validation: Validation,
}

impl SignedTokens {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        // Expiry, issuer and required claims are enforced by the codec.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        Self { keys, validation }
    }
}

impl TokenStrategy for SignedTokens {
    fn format(&self) -> TokenFormat {
        TokenFormat::Signed
    }

    fn encode(&self, claims: &Claims) -> Result<String, TokenCreationError> {
        let header = Header::new(Algorithm::RS256);
        jsonwebtoken::encode(&header, claims, self.keys.jwt_encoding_key())
            .map_err(|e| TokenCreationError::Signing(e.to_string()))
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [_, _, signature] = segments.as_slice() else {
            return Err(TokenError::Malformed);
        };
        // jsonwebtoken reports a damaged signature encoding as a parse error.
        decode_sealed_segment(signature)?;

        let data = jsonwebtoken::decode::<Claims>(
            token,
            self.keys.jwt_decoding_key(),
            &self.validation,
        )
        .map_err(|e| {
            debug!(error = %e, "Signed token rejected");
            classify(e.kind())
        })?;
        Ok(data.claims)
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature => TokenError::CryptoInvalid,
        _ => TokenError::Malformed,
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use keywarden_crypto::test_key_manager;

    use super::*;

    fn sample() -> Claims {
        Claims::new("42", "alice", "alice@example.com", "keywarden", 1_000, 10)
    }

    #[test]
    fn header_names_rs256() {
        let tokens = SignedTokens::new(test_key_manager());
        let token = tokens.encode(&sample()).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
    }

    #[test]
    fn claims_are_readable_without_the_key() {
        let tokens = SignedTokens::new(test_key_manager());
        let token = tokens.encode(&sample()).unwrap();

        let payload = token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(json["sub"], "42");
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn decode_ignores_expiry() {
        let tokens = SignedTokens::new(test_key_manager());
        // Long expired against the real clock.
        let claims = sample();
        let token = tokens.encode(&claims).unwrap();
        assert_eq!(tokens.decode(&token).unwrap(), claims);
    }

    #[test]
    fn unsigned_token_is_rejected() {
        let tokens = SignedTokens::new(test_key_manager());
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&sample()).unwrap());
        let forged = format!("{header}.{payload}.");
        assert!(tokens.decode(&forged).is_err());
    }

    #[test]
    fn hmac_header_is_rejected() {
        let tokens = SignedTokens::new(test_key_manager());
        let token = tokens.encode(&sample()).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let hs_header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        parts[0] = &hs_header;
        assert!(tokens.decode(&parts.join(".")).is_err());
    }
}
