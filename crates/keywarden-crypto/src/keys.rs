//! RSA key pair management.
//!
//! The service holds exactly one RSA key pair per process. It is either
//! generated at startup and discarded on exit, or loaded from (and on first
//! run persisted to) a key directory holding `private_key.pem` (PKCS#8) and
//! `public_key.pem` (SPKI).
//!
//! When the directory already holds both files they are authoritative and
//! are never regenerated, so tokens issued before a restart stay verifiable.

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::info;
use zeroize::Zeroizing;

use crate::error::KeyInitializationError;
use crate::lock::KeyDirLock;

/// File name of the PKCS#8 private key inside a key directory.
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";

/// File name of the SPKI public key inside a key directory.
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";

/// Where the process key pair comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Fresh pair for this process only.
    Ephemeral,
    /// Load from `dir`, generating and persisting on first use.
    Persistent { dir: PathBuf },
}

impl KeySource {
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        dir.map_or(Self::Ephemeral, |dir| Self::Persistent { dir })
    }
}

/// Read-only view of the public half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyMaterial {
    pub key: RsaPublicKey,
    /// Standard base64 of the DER `SubjectPublicKeyInfo`.
    pub der_base64: String,
}

/// The process RSA key pair.
///
/// Immutable once built; share it behind an `Arc` for concurrent use.
#[derive(Clone)]
pub struct KeyManager {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    private_pem: Zeroizing<String>,
    public_pem: String,
    public_der: Vec<u8>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("bits", &self.public.size().saturating_mul(8))
            .field("fingerprint", &self.fingerprint())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

impl KeyManager {
    /// Bring up the key pair for `source`.
    ///
    /// Any failure here is fatal: the caller should abort startup.
    pub fn initialize(source: &KeySource, bits: usize) -> Result<Self, KeyInitializationError> {
        match source {
            KeySource::Ephemeral => {
                let manager = Self::generate(bits)?;
                info!(
                    fingerprint = %manager.fingerprint(),
                    bits,
                    "Generated ephemeral RSA key pair"
                );
                Ok(manager)
            }
            KeySource::Persistent { dir } => Self::load_or_generate(dir, bits),
        }
    }

    /// Generate a new random key pair.
    pub fn generate(bits: usize) -> Result<Self, KeyInitializationError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| KeyInitializationError::Generation(e.to_string()))?;
        Self::from_private_key(private)
    }

    /// Wrap an existing private key, deriving the public half.
    pub fn from_private_key(private: RsaPrivateKey) -> Result<Self, KeyInitializationError> {
        let public = RsaPublicKey::from(&private);

        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyInitializationError::Encoding(e.to_string()))?;
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyInitializationError::Encoding(e.to_string()))?;
        let public_der = public
            .to_public_key_der()
            .map_err(|e| KeyInitializationError::Encoding(e.to_string()))?
            .as_bytes()
            .to_vec();

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| KeyInitializationError::Encoding(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| KeyInitializationError::Encoding(e.to_string()))?;

        Ok(Self {
            private,
            public,
            private_pem,
            public_pem,
            public_der,
            encoding_key,
            decoding_key,
        })
    }

    /// Load a pair from an already provisioned directory.
    ///
    /// Both files must be present, parse, and belong together.
    pub fn load(dir: &Path) -> Result<Self, KeyInitializationError> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let public_path = dir.join(PUBLIC_KEY_FILE);

        let private_text = Zeroizing::new(std::fs::read_to_string(&private_path)?);
        let private = RsaPrivateKey::from_pkcs8_pem(&private_text).map_err(|e| {
            KeyInitializationError::InvalidPem {
                path: private_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let public_text = std::fs::read_to_string(&public_path)?;
        let public = RsaPublicKey::from_public_key_pem(&public_text).map_err(|e| {
            KeyInitializationError::InvalidPem {
                path: public_path.clone(),
                reason: e.to_string(),
            }
        })?;

        if RsaPublicKey::from(&private) != public {
            return Err(KeyInitializationError::Mismatch(public_path));
        }

        Self::from_private_key(private)
    }

    /// Load the pair in `dir`, or generate and persist one if the directory
    /// holds neither file.
    ///
    /// A fully provisioned directory is read without locking, so it may be
    /// read-only. Otherwise the check-then-generate step runs under an
    /// exclusive lock on the directory, so concurrent initializers agree on
    /// a single pair.
    pub fn load_or_generate(dir: &Path, bits: usize) -> Result<Self, KeyInitializationError> {
        if has_pair(dir) {
            return Self::load_persisted(dir);
        }

        let _lock = match KeyDirLock::try_acquire(dir)? {
            Some(lock) => lock,
            None => {
                info!(dir = %dir.display(), "Waiting for another process initializing keys");
                KeyDirLock::acquire(dir)?
            }
        };

        // Another initializer may have finished while we waited.
        let has_private = dir.join(PRIVATE_KEY_FILE).exists();
        let has_public = dir.join(PUBLIC_KEY_FILE).exists();

        match (has_private, has_public) {
            (true, true) => Self::load_persisted(dir),
            (false, false) => {
                let manager = Self::generate(bits)?;
                manager.write_to_dir(dir)?;
                info!(
                    fingerprint = %manager.fingerprint(),
                    dir = %dir.display(),
                    bits,
                    "Generated and persisted RSA key pair"
                );
                Ok(manager)
            }
            (true, false) => Err(KeyInitializationError::Incomplete {
                dir: dir.to_path_buf(),
                missing: PUBLIC_KEY_FILE,
            }),
            (false, true) => Err(KeyInitializationError::Incomplete {
                dir: dir.to_path_buf(),
                missing: PRIVATE_KEY_FILE,
            }),
        }
    }

    fn load_persisted(dir: &Path) -> Result<Self, KeyInitializationError> {
        let manager = Self::load(dir)?;
        info!(
            fingerprint = %manager.fingerprint(),
            dir = %dir.display(),
            "Loaded persisted RSA key pair"
        );
        Ok(manager)
    }

    fn write_to_dir(&self, dir: &Path) -> Result<(), KeyInitializationError> {
        std::fs::create_dir_all(dir)?;
        write_atomic(&dir.join(PRIVATE_KEY_FILE), self.private_pem.as_bytes(), 0o600)?;
        write_atomic(&dir.join(PUBLIC_KEY_FILE), self.public_pem.as_bytes(), 0o644)?;
        Ok(())
    }

    pub const fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub(crate) const fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// SPKI PEM of the public key.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// DER `SubjectPublicKeyInfo` of the public key.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_der
    }

    /// Standard base64 of the DER public key, as served to clients.
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(&self.public_der)
    }

    pub fn public_key_material(&self) -> PublicKeyMaterial {
        PublicKeyMaterial {
            key: self.public.clone(),
            der_base64: self.public_key_base64(),
        }
    }

    /// Colon-separated SHA-256 of the DER public key.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.public_der)
    }

    /// RS256 signing key for `jsonwebtoken`.
    pub const fn jwt_encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// RS256 verification key for `jsonwebtoken`.
    pub const fn jwt_decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

fn has_pair(dir: &Path) -> bool {
    dir.join(PRIVATE_KEY_FILE).is_file() && dir.join(PUBLIC_KEY_FILE).is_file()
}

/// Compute a colon-separated hex fingerprint of a DER public key.
pub fn fingerprint_of(der: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(der);
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Write `contents` to `path` through a temp file in the same directory.
#[cfg_attr(not(unix), allow(unused_variables))]
fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(any(test, feature = "test-utils"))]
static TEST_KEYS: std::sync::LazyLock<std::sync::Arc<KeyManager>> =
    std::sync::LazyLock::new(|| {
        #[allow(clippy::expect_used)]
        let manager = KeyManager::generate(2048).expect("test key generation");
        std::sync::Arc::new(manager)
    });

#[cfg(any(test, feature = "test-utils"))]
static TEST_KEYS_ALT: std::sync::LazyLock<std::sync::Arc<KeyManager>> =
    std::sync::LazyLock::new(|| {
        #[allow(clippy::expect_used)]
        let manager = KeyManager::generate(2048).expect("test key generation");
        std::sync::Arc::new(manager)
    });

/// Key pair shared by every test in the binary.
#[cfg(any(test, feature = "test-utils"))]
pub fn test_key_manager() -> std::sync::Arc<KeyManager> {
    std::sync::Arc::clone(&TEST_KEYS)
}

/// A second, unrelated pair for wrong-key tests.
#[cfg(any(test, feature = "test-utils"))]
pub fn test_key_manager_alt() -> std::sync::Arc<KeyManager> {
    std::sync::Arc::clone(&TEST_KEYS_ALT)
}
