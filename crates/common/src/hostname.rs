//! Validated DNS hostname newtype.
//!
//! Every piece of per-certificate state is keyed by hostname: the secret
//! store record, the pending request marker and the certificate directory
//! artifact. Parsing once into [`Hostname`] keeps raw strings out of those
//! maps and guarantees the value is safe to use as a single path component.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a full DNS name
pub const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single DNS label
pub const MAX_LABEL_LEN: usize = 63;

static HOSTNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("hostname pattern is a valid regex")
});

/// Hostname validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostnameError {
    #[error("hostname is empty")]
    Empty,

    #[error("hostname is {0} characters long (max {MAX_HOSTNAME_LEN})")]
    TooLong(usize),

    #[error("hostname label '{0}' exceeds {MAX_LABEL_LEN} characters")]
    LabelTooLong(String),

    #[error("'{0}' is not a valid hostname")]
    Invalid(String),
}

/// A DNS name a certificate is issued for.
///
/// Stored lowercased; two hostnames that differ only in ASCII case compare
/// equal after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hostname(String);

impl Hostname {
    /// Parse and normalize a hostname
    pub fn parse(s: &str) -> Result<Self, HostnameError> {
        let normalized = s.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(HostnameError::Empty);
        }
        if normalized.len() > MAX_HOSTNAME_LEN {
            return Err(HostnameError::TooLong(normalized.len()));
        }
        if let Some(label) = normalized.split('.').find(|l| l.len() > MAX_LABEL_LEN) {
            return Err(HostnameError::LabelTooLong(label.to_string()));
        }
        if !HOSTNAME_RE.is_match(&normalized) {
            return Err(HostnameError::Invalid(s.to_string()));
        }

        Ok(Self(normalized))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Hostname {
    type Err = HostnameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Hostname {
    type Error = HostnameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for Hostname {
    type Error = HostnameError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Hostname> for String {
    fn from(h: Hostname) -> Self {
        h.0
    }
}
