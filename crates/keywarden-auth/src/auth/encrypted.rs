//! JWE compact tokens: RSA-OAEP-256 key wrap, A256GCM content encryption.
//!
//! Layout is `header.encrypted_key.iv.ciphertext.tag`, every segment
//! base64url without padding. The protected header's encoded form is the
//! GCM additional authenticated data, so it cannot be swapped.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use keywarden_core::TokenFormat;
use keywarden_crypto::{EnvelopeError, KeyManager, SealedEnvelope, seal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::claims::Claims;
use super::codec::{TokenCreationError, TokenError, TokenStrategy, decode_sealed_segment};

const ALG: &str = "RSA-OAEP-256";
const ENC: &str = "A256GCM";

#[derive(Debug, Serialize, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Encrypted tokens readable only by the key holder.
#[derive(Clone)]
pub struct EncryptedTokens {
    keys: Arc<KeyManager>,
}

impl EncryptedTokens {
    pub const fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }
}

impl TokenStrategy for EncryptedTokens {
    fn format(&self) -> TokenFormat {
        TokenFormat::Encrypted
    }

    fn encode(&self, claims: &Claims) -> Result<String, TokenCreationError> {
        let header = JweHeader {
            alg: ALG.to_string(),
            enc: ENC.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload = serde_json::to_vec(claims)?;

        let envelope = seal(self.keys.public_key(), &payload, header.as_bytes())
            .map_err(|e| TokenCreationError::Encryption(e.to_string()))?;

        Ok([
            header,
            URL_SAFE_NO_PAD.encode(&envelope.wrapped_key),
            URL_SAFE_NO_PAD.encode(&envelope.nonce),
            URL_SAFE_NO_PAD.encode(&envelope.ciphertext),
            URL_SAFE_NO_PAD.encode(&envelope.tag),
        ]
        .join("."))
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, wrapped_key, nonce, ciphertext, tag] = segments.as_slice() else {
            return Err(TokenError::Malformed);
        };

        let parsed: JweHeader = serde_json::from_slice(&b64(header)?).map_err(|e| {
            debug!(error = %e, "Encrypted token header rejected");
            TokenError::Malformed
        })?;
        if parsed.alg != ALG || parsed.enc != ENC {
            debug!(alg = %parsed.alg, enc = %parsed.enc, "Unsupported JWE algorithm");
            return Err(TokenError::Malformed);
        }

        let envelope = SealedEnvelope {
            wrapped_key: decode_sealed_segment(wrapped_key)?,
            nonce: decode_sealed_segment(nonce)?,
            ciphertext: decode_sealed_segment(ciphertext)?,
            tag: decode_sealed_segment(tag)?,
        };

        let plaintext = self
            .keys
            .open_envelope(&envelope, header.as_bytes())
            .map_err(|e| {
                debug!(error = %e, "Encrypted token rejected");
                match e {
                    EnvelopeError::InvalidNonceLength { .. }
                    | EnvelopeError::InvalidTagLength { .. } => TokenError::Malformed,
                    _ => TokenError::CryptoInvalid,
                }
            })?;

        // Authenticated by GCM, so a parse failure here means we issued it
        // with a different claim shape.
        serde_json::from_slice(&plaintext).map_err(|_| TokenError::Malformed)
    }
}

fn b64(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use keywarden_crypto::test_key_manager;

    use super::*;

    fn sample() -> Claims {
        Claims::new("42", "alice", "alice@example.com", "keywarden", 1_000, 10)
    }

    fn header_of(token: &str) -> serde_json::Value {
        let segment = token.split('.').next().unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
    }

    #[test]
    fn header_is_self_describing() {
        let tokens = EncryptedTokens::new(test_key_manager());
        let token = tokens.encode(&sample()).unwrap();

        let header = header_of(&token);
        assert_eq!(header["alg"], "RSA-OAEP-256");
        assert_eq!(header["enc"], "A256GCM");
        assert_eq!(header["typ"], "JWT");
    }

    #[test]
    fn segment_sizes() {
        let tokens = EncryptedTokens::new(test_key_manager());
        let token = tokens.encode(&sample()).unwrap();
        let segments: Vec<&str> = token.split('.').collect();

        assert_eq!(URL_SAFE_NO_PAD.decode(segments[1]).unwrap().len(), 256);
        assert_eq!(URL_SAFE_NO_PAD.decode(segments[2]).unwrap().len(), 12);
        assert_eq!(URL_SAFE_NO_PAD.decode(segments[4]).unwrap().len(), 16);
    }

    #[test]
    fn claims_are_not_visible_in_the_token() {
        let tokens = EncryptedTokens::new(test_key_manager());
        let token = tokens.encode(&sample()).unwrap();

        for segment in token.split('.').skip(1) {
            let bytes = URL_SAFE_NO_PAD.decode(segment).unwrap();
            let text = String::from_utf8_lossy(&bytes);
            assert!(!text.contains("alice"));
        }
    }

    #[test]
    fn decode_recovers_claims() {
        let tokens = EncryptedTokens::new(test_key_manager());
        let claims = sample();
        let token = tokens.encode(&claims).unwrap();
        assert_eq!(tokens.decode(&token).unwrap(), claims);
    }

    #[test]
    fn swapped_header_fails_authentication() {
        let tokens = EncryptedTokens::new(test_key_manager());
        let token = tokens.encode(&sample()).unwrap();

        // Same meaning, different bytes: the AAD no longer matches.
        let other_header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RSA-OAEP-256","enc":"A256GCM"}"#);
        let rest: Vec<&str> = token.split('.').skip(1).collect();
        let swapped = format!("{other_header}.{}", rest.join("."));

        assert_eq!(tokens.decode(&swapped), Err(TokenError::CryptoInvalid));
    }

    #[test]
    fn unsupported_algorithms_are_malformed() {
        let tokens = EncryptedTokens::new(test_key_manager());
        let token = tokens.encode(&sample()).unwrap();
        let rest: Vec<&str> = token.split('.').skip(1).collect();

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RSA1_5","enc":"A128CBC-HS256"}"#);
        let forged = format!("{header}.{}", rest.join("."));
        assert_eq!(tokens.decode(&forged), Err(TokenError::Malformed));
    }

    #[test]
    fn truncated_tag_is_malformed() {
        let tokens = EncryptedTokens::new(test_key_manager());
        let token = tokens.encode(&sample()).unwrap();
        let mut segments: Vec<String> = token.split('.').map(str::to_string).collect();
        // Whole base64 quanta, so only the length is wrong.
        segments[4].truncate(8);
        assert_eq!(tokens.decode(&segments.join(".")), Err(TokenError::Malformed));
    }
}
