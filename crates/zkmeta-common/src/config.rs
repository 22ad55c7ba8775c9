//! Configuration types for zkmeta
//!
//! A store is configured with the root node its entries live under and the
//! charset used for values. Configuration can come from a file, from
//! `ZKMETA_*` environment variables, or be built in code.

use crate::encoding::{EncodingError, TextEncoding};
use crate::path::normalize_root;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default root node for store entries
pub const DEFAULT_ROOT: &str = "/SpringIntegration-MetadataStore";

/// Default charset for values
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Environment variable prefix for configuration overrides
const ENV_PREFIX: &str = "ZKMETA";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("'root' must start with '/': {0}")]
    InvalidRoot(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Metadata store configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root node; entries are its direct children
    pub root: String,
    /// Charset name used to store values
    pub encoding: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            encoding: DEFAULT_ENCODING.to_string(),
        }
    }
}

/// Configuration after validation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedConfig {
    /// Normalized root path
    pub root: String,
    /// Resolved charset
    pub encoding: TextEncoding,
}

impl StoreConfig {
    /// Load configuration from a file (format picked by extension),
    /// overlaid with `ZKMETA_*` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Load configuration from `ZKMETA_*` environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Normalize the root and resolve the encoding.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        Ok(ValidatedConfig {
            root: normalize_root(&self.root)?,
            encoding: self.encoding.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.root, "/SpringIntegration-MetadataStore");
        assert_eq!(config.encoding, "UTF-8");

        let validated = config.validate().unwrap();
        assert_eq!(validated.encoding, TextEncoding::Utf8);
    }

    #[test]
    fn test_validate_normalizes_root() {
        let config = StoreConfig {
            root: "/test-store/".into(),
            encoding: "latin1".into(),
        };
        let validated = config.validate().unwrap();
        assert_eq!(validated.root, "/test-store");
        assert_eq!(validated.encoding, TextEncoding::Iso8859_1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = StoreConfig {
            root: "relative".into(),
            ..StoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRoot(_))));

        let config = StoreConfig {
            encoding: String::new(),
            ..StoreConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Encoding(EncodingError::Empty))
        ));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "root = \"/from-file\"").unwrap();
        file.flush().unwrap();

        let config = StoreConfig::load(file.path()).unwrap();
        assert_eq!(config.root, "/from-file");
        assert_eq!(config.encoding, DEFAULT_ENCODING);
    }

    #[test]
    fn test_serde_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"encoding":"UTF-16"}"#).unwrap();
        assert_eq!(config.root, DEFAULT_ROOT);
        assert_eq!(config.validate().unwrap().encoding, TextEncoding::Utf16);
    }
}
