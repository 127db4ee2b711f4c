//! Configuration resolution for keywarden.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/keywarden/settings.json`)
//! 3. Project config (`.keywarden/settings.json`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! Files may be partial. Layers are deep-merged as JSON before the final
//! typed decode, so a project file that only sets `tokens.format` keeps the
//! global `keys.dir`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Issuer written into every token when none is configured.
pub const DEFAULT_ISSUER: &str = "keywarden";

/// Token lifetime used by login, refresh and registration (24 hours).
pub const DEFAULT_TOKEN_TTL_MINUTES: u32 = 24 * 60;

/// RSA modulus size for generated key pairs.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Complete keywarden configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub keys: KeyConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Key material configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeyConfig {
    /// Directory holding `private_key.pem` / `public_key.pem`.
    ///
    /// `None` means a fresh pair is generated for every process.
    pub dir: Option<PathBuf>,
    /// Modulus size used when a pair has to be generated.
    pub bits: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            dir: None,
            bits: DEFAULT_KEY_BITS,
        }
    }
}

/// Which token serialization the codec issues and accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenFormat {
    /// JWS compact (RS256): claims readable, integrity-protected.
    #[default]
    Signed,
    /// JWE compact (RSA-OAEP-256 + A256GCM): claims confidential.
    Encrypted,
}

impl TokenFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signed => "signed",
            Self::Encrypted => "encrypted",
        }
    }
}

impl fmt::Display for TokenFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "signed" | "jws" => Ok(Self::Signed),
            "encrypted" | "jwe" => Ok(Self::Encrypted),
            other => Err(Error::Config(format!(
                "unknown token format '{other}' (expected 'signed' or 'encrypted')"
            ))),
        }
    }
}

/// Token issuance configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenConfig {
    pub format: TokenFormat,
    pub issuer: String,
    pub ttl_minutes: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            format: TokenFormat::default(),
            issuer: DEFAULT_ISSUER.to_string(),
            ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
        }
    }
}

/// User store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "keywarden=info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Reject settings that would make the service unusable.
    ///
    /// A zero token lifetime would hand out tokens that are already expired.
    pub fn validate(&self) -> Result<()> {
        if self.tokens.ttl_minutes == 0 {
            return Err(Error::Config(
                "tokens.ttl_minutes must be at least 1".to_string(),
            ));
        }
        if self.tokens.issuer.trim().is_empty() {
            return Err(Error::Config("tokens.issuer must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut layers = Vec::new();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            layers.push(load_config_file(&global_path)?);
        }
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".keywarden").join("settings.json");
        if project_path.exists() {
            layers.push(load_config_file(&project_path)?);
        }
    }

    let mut config = resolve_layers(layers)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Merge raw JSON layers over the defaults and decode the result.
pub fn resolve_layers(layers: impl IntoIterator<Item = Value>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for layer in layers {
        merge_values(&mut merged, layer);
    }
    Ok(serde_json::from_value(merged)?)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("keywarden").join("settings.json"))
}

/// Default location of the user database.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("keywarden").join("users.db"))
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply `KEYWARDEN_*` overrides read through `lookup`.
///
/// Unparseable numeric or enum values are rejected rather than ignored.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(val) = lookup("KEYWARDEN_KEY_DIR") {
        config.keys.dir = (!val.is_empty()).then(|| PathBuf::from(val));
    }
    if let Some(val) = lookup("KEYWARDEN_TOKEN_FORMAT") {
        config.tokens.format = val.parse()?;
    }
    if let Some(val) = lookup("KEYWARDEN_ISSUER") {
        config.tokens.issuer = val;
    }
    if let Some(val) = lookup("KEYWARDEN_TOKEN_TTL_MINUTES") {
        config.tokens.ttl_minutes = val.parse().map_err(|e| {
            Error::Config(format!("KEYWARDEN_TOKEN_TTL_MINUTES must be a number: {e}"))
        })?;
    }
    if let Some(val) = lookup("KEYWARDEN_DB_PATH") {
        config.storage.database_path = (!val.is_empty()).then(|| PathBuf::from(val));
    }
    if let Some(val) = lookup("KEYWARDEN_LOG_LEVEL") {
        config.log.level = val;
    }
    if let Some(val) = lookup("KEYWARDEN_LOG_JSON") {
        config.log.json = matches!(val.as_str(), "1" | "true" | "yes");
    }
    Ok(())
}
