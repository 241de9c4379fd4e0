//! Certificate directory validation
//!
//! Checks the `<hostname>.pem` bundles the proxy will load: file names,
//! parseability and expiry.

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::Config;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::Path;
use tollgate_common::Hostname;
use tracing::debug;

/// Validate every certificate bundle in the configured certificate directory
pub fn validate_certificates(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    let dir = &config.storage.certificates_dir;

    if !dir.exists() {
        result.add_warning(ValidationWarning::new(format!(
            "Certificate directory {:?} does not exist yet; it is created on first write",
            dir
        )));
        return result;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            result.add_error(ValidationError::new(
                ErrorCategory::Storage,
                format!("Failed to read certificate directory {:?}: {}", dir, e),
            ));
            return result;
        }
    };

    let warn_within = Duration::days(i64::from(config.certificates.expiry_warning_days));

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("pem") {
            continue;
        }

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Err(e) = Hostname::parse(stem) {
            result.add_error(ValidationError::new(
                ErrorCategory::Certificate,
                format!("Certificate file {:?} is not named after a hostname: {}", path, e),
            ));
            continue;
        }

        match load_and_validate_cert(&path, warn_within) {
            Ok(Some(expiry_warning)) => result.add_warning(expiry_warning),
            Ok(None) => debug!(path = %path.display(), "Certificate is valid"),
            Err(e) => result.add_error(e),
        }
    }

    result
}

/// Load the leaf certificate of a bundle and check its expiry
fn load_and_validate_cert(
    cert_path: &Path,
    warn_within: Duration,
) -> Result<Option<ValidationWarning>, ValidationError> {
    let content = fs::read(cert_path).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to read certificate {:?}: {}", cert_path, e),
        )
    })?;

    let blocks = pem::parse_many(&content).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to parse certificate {:?}: {}", cert_path, e),
        )
    })?;

    let leaf = blocks
        .iter()
        .find(|block| block.tag() == "CERTIFICATE")
        .ok_or_else(|| {
            ValidationError::new(
                ErrorCategory::Certificate,
                format!("No certificate block found in {:?}", cert_path),
            )
        })?;

    let (_, cert) = x509_parser::parse_x509_certificate(leaf.contents()).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Invalid X509 certificate {:?}: {}", cert_path, e),
        )
    })?;

    let not_after = cert.validity().not_after;
    let expires = DateTime::<Utc>::from_timestamp(not_after.timestamp(), 0).ok_or_else(|| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Certificate {:?} has an unrepresentable expiry", cert_path),
        )
    })?;

    let now = Utc::now();
    if expires < now {
        return Err(ValidationError::new(
            ErrorCategory::Certificate,
            format!(
                "Certificate expired: {:?} (expired at {})",
                cert_path, not_after
            ),
        ));
    }

    if expires < now + warn_within {
        return Ok(Some(ValidationWarning::new(format!(
            "Certificate expires soon: {:?} (expires at {})",
            cert_path, not_after
        ))));
    }

    Ok(None)
}
