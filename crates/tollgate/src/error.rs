//! Error types for certificate lifecycle operations.

use thiserror::Error;
use tollgate_common::{Hostname, HostnameError};

/// Result type for certificate lifecycle operations.
pub type CertResult<T> = Result<T, CertError>;

/// Errors surfaced by the key store, matcher, CSR builder and lifecycle manager.
#[derive(Debug, Error)]
pub enum CertError {
    /// Input could not be parsed as a certificate, or carries no usable hostname.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// No key material is stored for the hostname. Expected in normal
    /// operation; the caller decides whether to create one.
    #[error("no key material stored for {0}")]
    KeyNotFound(Hostname),

    /// An event implies key material that is missing or unusable.
    #[error("private key for {hostname} is unavailable: {reason}")]
    GetPrivateKey { hostname: Hostname, reason: String },

    /// The exchange channel could not transmit a CSR.
    #[error("failed to submit CSR for {hostname}: {source}")]
    ExchangeSubmission {
        hostname: Hostname,
        #[source]
        source: ExchangeError,
    },

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("key encryption failed: {0}")]
    KeyEncryption(String),

    #[error("CSR generation failed: {0}")]
    CsrGeneration(String),

    #[error("secret store error: {0}")]
    Secret(#[from] SecretStoreError),

    #[error("certificate directory error: {0}")]
    Directory(#[from] std::io::Error),

    #[error(transparent)]
    InvalidHostname(#[from] HostnameError),
}

impl CertError {
    /// Turn a missing key into the inconsistency error used when an event
    /// assumes the key exists.
    pub(crate) fn into_get_private_key(self) -> Self {
        match self {
            Self::KeyNotFound(hostname) => Self::GetPrivateKey {
                hostname,
                reason: "no key material in the secret store".to_string(),
            },
            other => other,
        }
    }
}

/// Secret store backend errors.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt secret record for {hostname}: {reason}")]
    Corrupt { hostname: Hostname, reason: String },
}

/// Exchange channel errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request rejected: {0}")]
    Rejected(String),
}
