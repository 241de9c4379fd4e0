//! Certificate signing request builder.

use rcgen::{CertificateParams, DistinguishedName, DnType};
use serde::Serialize;

use crate::error::{CertError, CertResult};
use crate::keys::KeyMaterial;
use tollgate_common::Hostname;

/// A PEM-encoded CSR for one hostname.
///
/// Transient: handed to the exchange channel and never persisted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSigningRequest {
    pub hostname: Hostname,
    pub pem: String,
}

/// Build a CSR for `hostname` signed with the stored key.
///
/// Subject common name and the single DNS subject alternative name are both
/// the hostname. Two builds from the same inputs differ only in the
/// signature bytes.
pub fn build_csr(hostname: &Hostname, key: &KeyMaterial) -> CertResult<CertificateSigningRequest> {
    let private_key = key.decrypt()?;
    let key_pair = rcgen::KeyPair::from_pem(&private_key)
        .map_err(|e| CertError::CsrGeneration(format!("unusable private key: {}", e)))?;

    let mut params = CertificateParams::new(vec![hostname.to_string()])
        .map_err(|e| CertError::CsrGeneration(e.to_string()))?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, hostname.as_str());

    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| CertError::CsrGeneration(e.to_string()))?;
    let pem = csr
        .pem()
        .map_err(|e| CertError::CsrGeneration(e.to_string()))?;

    Ok(CertificateSigningRequest {
        hostname: hostname.clone(),
        pem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_key_material, KeyOptions};
    use rcgen::PublicKeyData;
    use x509_parser::extensions::GeneralName;
    use x509_parser::prelude::{FromDer, X509CertificationRequest};

    fn key() -> KeyMaterial {
        generate_key_material(&KeyOptions {
            password_length: 12,
            encryption_rounds: 1_000,
        })
        .unwrap()
    }

    fn parse(pem_text: &str) -> (String, Vec<String>, Vec<u8>) {
        let block = pem::parse(pem_text).unwrap();
        assert_eq!(block.tag(), "CERTIFICATE REQUEST");
        let (_, csr) = X509CertificationRequest::from_der(block.contents()).unwrap();
        let info = &csr.certification_request_info;

        let cn = info
            .subject
            .iter_common_name()
            .next()
            .unwrap()
            .as_str()
            .unwrap()
            .to_string();

        let mut sans = Vec::new();
        if let Some(extensions) = csr.requested_extensions() {
            for ext in extensions {
                if let x509_parser::extensions::ParsedExtension::SubjectAlternativeName(san) = ext {
                    for name in &san.general_names {
                        if let GeneralName::DNSName(dns) = name {
                            sans.push(dns.to_string());
                        }
                    }
                }
            }
        }

        let public_key = info.subject_pki.raw.to_vec();
        (cn, sans, public_key)
    }

    #[test]
    fn test_subject_is_hostname() {
        let host = Hostname::parse("example.internal").unwrap();
        let csr = build_csr(&host, &key()).unwrap();

        assert_eq!(csr.hostname, host);
        let (cn, sans, _) = parse(&csr.pem);
        assert_eq!(cn, "example.internal");
        assert_eq!(sans, vec!["example.internal".to_string()]);
    }

    #[test]
    fn test_uses_stored_key() {
        let host = Hostname::parse("example.internal").unwrap();
        let material = key();

        let first = build_csr(&host, &material).unwrap();
        let second = build_csr(&host, &material).unwrap();

        let (_, _, key_a) = parse(&first.pem);
        let (_, _, key_b) = parse(&second.pem);
        assert_eq!(key_a, key_b);

        let expected = rcgen::KeyPair::from_pem(&material.decrypt().unwrap())
            .unwrap()
            .subject_public_key_info();
        assert_eq!(key_a, expected);
    }

    #[test]
    fn test_undecryptable_key() {
        let host = Hostname::parse("example.internal").unwrap();
        let mut material = key();
        material.password = "wrong".to_string();

        assert!(matches!(
            build_csr(&host, &material),
            Err(CertError::KeyEncryption(_))
        ));
    }
}
