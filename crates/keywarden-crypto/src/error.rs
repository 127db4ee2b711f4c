//! Crypto error types.

use std::path::PathBuf;

/// Errors raised while bringing up the process key pair.
///
/// All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum KeyInitializationError {
    #[error("RSA key generation failed: {0}")]
    Generation(String),

    #[error("Key encoding failed: {0}")]
    Encoding(String),

    #[error("Invalid PEM in {path}: {reason}")]
    InvalidPem { path: PathBuf, reason: String },

    #[error("Key directory {dir} is missing {missing}; refusing to regenerate over the remaining half")]
    Incomplete { dir: PathBuf, missing: &'static str },

    #[error("Public key in {0} does not belong to the private key")]
    Mismatch(PathBuf),

    #[error("Failed to lock key directory {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors from envelope (wrap + AEAD) operations.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("Invalid tag length: expected {expected}, got {actual}")]
    InvalidTagLength { expected: usize, actual: usize },
}
