//! Public-key envelope encryption.
//!
//! A random 256-bit content key encrypts the payload with AES-256-GCM; the
//! content key itself is wrapped with RSA-OAEP (SHA-256) under the service
//! public key. Only the `KeyManager` holding the private half can open it.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::EnvelopeError;
use crate::keys::KeyManager;

/// Content key size for AES-256-GCM.
pub const CONTENT_KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM.
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size for AES-GCM.
pub const TAG_SIZE: usize = 16;

/// All parts of a sealed payload, kept separate for compact serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    /// Content key wrapped with RSA-OAEP-SHA256.
    pub wrapped_key: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Seal `plaintext` for the holder of `public`.
///
/// `aad` is authenticated but not encrypted and must be presented again
/// on open.
pub fn seal(
    public: &RsaPublicKey,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedEnvelope, EnvelopeError> {
    let mut content_key = Zeroizing::new([0u8; CONTENT_KEY_SIZE]);
    OsRng.fill_bytes(content_key.as_mut());

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let wrapped_key = public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), content_key.as_ref())
        .map_err(|e| EnvelopeError::EncryptionFailed(e.to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(content_key.as_ref())
        .map_err(|e| EnvelopeError::EncryptionFailed(e.to_string()))?;
    let mut ciphertext = cipher
        .encrypt(
            &Nonce::from(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| EnvelopeError::EncryptionFailed(e.to_string()))?;

    // aes-gcm appends the tag to the ciphertext.
    let tag = ciphertext.split_off(ciphertext.len() - TAG_SIZE);

    Ok(SealedEnvelope {
        wrapped_key,
        nonce: nonce.to_vec(),
        ciphertext,
        tag,
    })
}

impl KeyManager {
    /// Unwrap the content key and decrypt an envelope sealed to this pair.
    ///
    /// Any wrong key, altered part, or altered `aad` yields
    /// [`EnvelopeError::DecryptionFailed`].
    pub fn open_envelope(
        &self,
        envelope: &SealedEnvelope,
        aad: &[u8],
    ) -> Result<Vec<u8>, EnvelopeError> {
        let nonce = <[u8; NONCE_SIZE]>::try_from(envelope.nonce.as_slice()).map_err(|_| {
            EnvelopeError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: envelope.nonce.len(),
            }
        })?;
        if envelope.tag.len() != TAG_SIZE {
            return Err(EnvelopeError::InvalidTagLength {
                expected: TAG_SIZE,
                actual: envelope.tag.len(),
            });
        }

        let content_key = Zeroizing::new(
            self.private_key()
                .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), &envelope.wrapped_key)
                .map_err(|e| EnvelopeError::DecryptionFailed(e.to_string()))?,
        );

        let mut sealed = Vec::with_capacity(envelope.ciphertext.len() + TAG_SIZE);
        sealed.extend_from_slice(&envelope.ciphertext);
        sealed.extend_from_slice(&envelope.tag);

        let cipher = Aes256Gcm::new_from_slice(&content_key).map_err(|_| {
            EnvelopeError::InvalidKeyLength {
                expected: CONTENT_KEY_SIZE,
                actual: content_key.len(),
            }
        })?;
        cipher
            .decrypt(
                &Nonce::from(nonce),
                Payload { msg: &sealed, aad },
            )
            .map_err(|e| EnvelopeError::DecryptionFailed(e.to_string()))
    }
}
