//! keywarden key material library
//!
//! Owns the RSA key pair behind every token the service issues.
//!
//! ## Crypto primitives
//!
//! - **Key pair**: RSA-2048, generated per process or persisted as two
//!   PKCS#8 / SPKI PEM files under a locked directory
//! - **Signing keys**: RS256 `jsonwebtoken` keys derived from the pair
//! - **Envelope**: RSA-OAEP-SHA256 key wrap + AES-256-GCM content
//!   encryption, 12-byte random nonce, caller-supplied AAD

pub mod envelope;
pub mod error;
pub mod keys;
pub mod lock;

pub use envelope::{CONTENT_KEY_SIZE, NONCE_SIZE, SealedEnvelope, TAG_SIZE, seal};
pub use error::{EnvelopeError, KeyInitializationError};
pub use keys::{
    KeyManager, KeySource, PRIVATE_KEY_FILE, PUBLIC_KEY_FILE, PublicKeyMaterial, fingerprint_of,
};
#[cfg(any(test, feature = "test-utils"))]
pub use keys::{test_key_manager, test_key_manager_alt};
pub use lock::KeyDirLock;
