//! Configuration loading and validation for Tollgate.
//!
//! Configuration is a KDL document with three optional blocks:
//!
//! ```kdl
//! storage {
//!     certificates-dir "/var/lib/haproxy/certs"
//!     secrets-dir "/var/lib/tollgate/secrets"
//!     outbox-dir "/var/lib/tollgate/outbox"
//! }
//! keys {
//!     password-length 12
//!     encryption-rounds 100000
//! }
//! certificates {
//!     hostname "example.internal"
//!     expiry-warning-days 30
//! }
//! ```
//!
//! Anything omitted falls back to the defaults below.

use miette::Diagnostic;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use validator::Validate;

use tollgate_common::Hostname;

pub mod kdl;
pub mod validate;

/// Configuration embedded in the binary, used when no file is given
pub const DEFAULT_CONFIG_KDL: &str = r#"
storage {
    certificates-dir "/var/lib/haproxy/certs"
    secrets-dir "/var/lib/tollgate/secrets"
    outbox-dir "/var/lib/tollgate/outbox"
}
"#;

/// Configuration errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kdl(#[from] ::kdl::KdlError),

    #[error("unknown configuration block '{0}'")]
    #[diagnostic(help("valid top-level blocks are: storage, keys, certificates"))]
    UnknownBlock(String),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Where certificate material lives on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageConfig {
    /// Directory the reverse proxy loads `<hostname>.pem` bundles from
    pub certificates_dir: PathBuf,
    /// Directory holding encrypted key material, one record per hostname
    pub secrets_dir: PathBuf,
    /// Directory outgoing CSRs are spooled to for the certificate authority
    pub outbox_dir: PathBuf,
}

pub fn default_certificates_dir() -> PathBuf {
    PathBuf::from("/var/lib/haproxy/certs")
}
pub fn default_secrets_dir() -> PathBuf {
    PathBuf::from("/var/lib/tollgate/secrets")
}
pub fn default_outbox_dir() -> PathBuf {
    PathBuf::from("/var/lib/tollgate/outbox")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            certificates_dir: default_certificates_dir(),
            secrets_dir: default_secrets_dir(),
            outbox_dir: default_outbox_dir(),
        }
    }
}

/// Private key protection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Validate)]
pub struct KeyConfig {
    /// Length of the random password each private key is encrypted with
    #[validate(range(min = 8, max = 128))]
    pub password_length: usize,
    /// PBKDF2 rounds used to derive the key encryption key
    #[validate(range(min = 1000))]
    pub encryption_rounds: u32,
}

pub fn default_password_length() -> usize {
    12
}
pub fn default_encryption_rounds() -> u32 {
    100_000
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            password_length: default_password_length(),
            encryption_rounds: default_encryption_rounds(),
        }
    }
}

/// Hostnames to manage and certificate checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Validate)]
pub struct CertificatesConfig {
    /// Hostnames requested on startup
    pub hostnames: Vec<Hostname>,
    /// Warn when a materialized certificate expires within this many days
    #[validate(range(min = 1, max = 365))]
    pub expiry_warning_days: u32,
}

pub fn default_expiry_warning_days() -> u32 {
    30
}

impl Default for CertificatesConfig {
    fn default() -> Self {
        Self {
            hostnames: Vec::new(),
            expiry_warning_days: default_expiry_warning_days(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub keys: KeyConfig,
    pub certificates: CertificatesConfig,
}

impl Config {
    /// Load configuration from a KDL file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_kdl(&content)?;
        info!(
            path = %path.display(),
            hostnames = config.certificates.hostnames.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from KDL text
    pub fn from_kdl(content: &str) -> Result<Self, ConfigError> {
        let document: ::kdl::KdlDocument = content.parse()?;
        kdl::parse_document(&document)
    }

    /// Configuration compiled into the binary
    pub fn default_embedded() -> Result<Self, ConfigError> {
        Self::from_kdl(DEFAULT_CONFIG_KDL)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        Validate::validate(&self.keys).map_err(|e| ConfigError::Validation(e.to_string()))?;
        Validate::validate(&self.certificates)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        let storage = &self.storage;
        let dirs = [
            ("certificates-dir", &storage.certificates_dir),
            ("secrets-dir", &storage.secrets_dir),
            ("outbox-dir", &storage.outbox_dir),
        ];
        for (i, (name_a, dir_a)) in dirs.iter().enumerate() {
            for (name_b, dir_b) in &dirs[i + 1..] {
                if dir_a == dir_b {
                    return Err(ConfigError::Validation(format!(
                        "{} and {} must be different directories (both are {})",
                        name_a,
                        name_b,
                        dir_a.display()
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for hostname in &self.certificates.hostnames {
            if !seen.insert(hostname) {
                return Err(ConfigError::Validation(format!(
                    "hostname '{}' is listed more than once",
                    hostname
                )));
            }
        }

        debug!("Configuration validated");
        Ok(())
    }
}
