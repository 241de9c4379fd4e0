//! Certificate parsing and hostname matching.
//!
//! Certificates come back from the authority without any binding to the
//! request that produced them. The hostname is recovered from the
//! certificate itself: the subject common name, or failing that the first
//! DNS subject alternative name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;

use crate::error::{CertError, CertResult};
use tollgate_common::Hostname;

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// A certificate issued by the authority, with its CA chain.
///
/// Constructing one parses the leaf, so an instance always carries a valid
/// hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderCertificate {
    certificate: String,
    chain: Vec<String>,
    hostname: Hostname,
}

impl ProviderCertificate {
    /// Parse the leaf certificate and bind it to its hostname
    pub fn new(certificate: impl Into<String>, chain: Vec<String>) -> CertResult<Self> {
        let certificate = certificate.into();
        let hostname = hostname_of(&certificate)?;
        Ok(Self {
            certificate,
            chain,
            hostname,
        })
    }

    /// PEM-encoded leaf certificate
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// PEM-encoded CA certificates, leaf issuer first
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn hostname(&self) -> &Hostname {
        &self.hostname
    }
}

/// Raw certificate + chain as delivered over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProviderCertificate {
    pub certificate: String,
    #[serde(default)]
    pub chain: Vec<String>,
}

impl TryFrom<RawProviderCertificate> for ProviderCertificate {
    type Error = CertError;

    fn try_from(raw: RawProviderCertificate) -> CertResult<Self> {
        Self::new(raw.certificate, raw.chain)
    }
}

/// Decode the first `CERTIFICATE` block and hand the parsed certificate to `f`
fn with_certificate<T>(
    certificate_pem: &str,
    f: impl FnOnce(&X509Certificate<'_>) -> CertResult<T>,
) -> CertResult<T> {
    let blocks = pem::parse_many(certificate_pem)
        .map_err(|e| CertError::InvalidCertificate(format!("malformed PEM: {}", e)))?;
    let block = blocks
        .iter()
        .find(|b| b.tag() == CERTIFICATE_TAG)
        .ok_or_else(|| CertError::InvalidCertificate("no CERTIFICATE block found".to_string()))?;

    let (_, cert) = x509_parser::parse_x509_certificate(block.contents())
        .map_err(|e| CertError::InvalidCertificate(format!("invalid X509 certificate: {}", e)))?;
    f(&cert)
}

/// Subject hostname of a PEM certificate.
///
/// Prefers the common name; falls back to the first DNS subject alternative
/// name that is a valid hostname.
pub fn hostname_of(certificate_pem: &str) -> CertResult<Hostname> {
    with_certificate(certificate_pem, |cert| {
        let common_name = cert
            .subject()
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok())
            .find_map(|cn| Hostname::parse(cn).ok());
        if let Some(hostname) = common_name {
            return Ok(hostname);
        }

        let san = cert
            .subject_alternative_name()
            .map_err(|e| CertError::InvalidCertificate(e.to_string()))?;
        if let Some(san) = san {
            for name in &san.value.general_names {
                if let GeneralName::DNSName(dns) = name {
                    if let Ok(hostname) = Hostname::parse(dns) {
                        return Ok(hostname);
                    }
                }
            }
        }

        Err(CertError::InvalidCertificate(
            "certificate subject carries no hostname".to_string(),
        ))
    })
}

/// Not-after time of a PEM certificate
pub fn expiry_of(certificate_pem: &str) -> CertResult<DateTime<Utc>> {
    with_certificate(certificate_pem, |cert| {
        let not_after = cert.validity().not_after;
        DateTime::<Utc>::from_timestamp(not_after.timestamp(), 0).ok_or_else(|| {
            CertError::InvalidCertificate(format!("unrepresentable expiry {}", not_after))
        })
    })
}

/// First candidate issued for `hostname`.
///
/// `None` is an ordinary outcome. If the authority ever hands out more than
/// one certificate for a hostname, the earliest in `candidates` wins.
pub fn find_for_hostname<'a>(
    hostname: &Hostname,
    candidates: &'a [ProviderCertificate],
) -> Option<&'a ProviderCertificate> {
    candidates.iter().find(|c| c.hostname() == hostname)
}
