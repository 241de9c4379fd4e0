//! Storage, key and certificate block parsing.

use kdl::KdlNode;
use std::path::PathBuf;
use tracing::{trace, warn};

use tollgate_common::Hostname;

use crate::{
    default_certificates_dir, default_encryption_rounds, default_expiry_warning_days,
    default_outbox_dir, default_password_length, default_secrets_dir, CertificatesConfig,
    ConfigError, KeyConfig, StorageConfig,
};

use super::helpers::{get_first_arg_string, get_int_entry_as, get_string_entry, invalid};

const STORAGE_FIELDS: &[&str] = &["certificates-dir", "secrets-dir", "outbox-dir"];
const KEY_FIELDS: &[&str] = &["password-length", "encryption-rounds"];
const CERTIFICATE_FIELDS: &[&str] = &["hostname", "expiry-warning-days"];

/// Parse the `storage` block
pub fn parse_storage_config(node: &KdlNode) -> Result<StorageConfig, ConfigError> {
    trace!("Parsing storage configuration block");
    warn_unknown_fields(node, STORAGE_FIELDS);

    let config = StorageConfig {
        certificates_dir: get_string_entry(node, "certificates-dir")?
            .map(PathBuf::from)
            .unwrap_or_else(default_certificates_dir),
        secrets_dir: get_string_entry(node, "secrets-dir")?
            .map(PathBuf::from)
            .unwrap_or_else(default_secrets_dir),
        outbox_dir: get_string_entry(node, "outbox-dir")?
            .map(PathBuf::from)
            .unwrap_or_else(default_outbox_dir),
    };

    trace!(
        certificates_dir = %config.certificates_dir.display(),
        secrets_dir = %config.secrets_dir.display(),
        outbox_dir = %config.outbox_dir.display(),
        "Parsed storage configuration"
    );

    Ok(config)
}

/// Parse the `keys` block
pub fn parse_key_config(node: &KdlNode) -> Result<KeyConfig, ConfigError> {
    trace!("Parsing keys configuration block");
    warn_unknown_fields(node, KEY_FIELDS);

    Ok(KeyConfig {
        password_length: get_int_entry_as(node, "password-length")?
            .unwrap_or_else(default_password_length),
        encryption_rounds: get_int_entry_as(node, "encryption-rounds")?
            .unwrap_or_else(default_encryption_rounds),
    })
}

/// Parse the `certificates` block
///
/// `hostname` may repeat; every occurrence adds one managed hostname.
pub fn parse_certificates_config(node: &KdlNode) -> Result<CertificatesConfig, ConfigError> {
    trace!("Parsing certificates configuration block");
    warn_unknown_fields(node, CERTIFICATE_FIELDS);

    let mut hostnames = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() != "hostname" {
                continue;
            }
            let raw = get_first_arg_string(child)
                .ok_or_else(|| invalid("hostname", "expected a string argument"))?;
            let hostname = Hostname::parse(&raw).map_err(|e| invalid("hostname", e.to_string()))?;
            trace!(hostname = %hostname, "Parsed managed hostname");
            hostnames.push(hostname);
        }
    }

    Ok(CertificatesConfig {
        hostnames,
        expiry_warning_days: get_int_entry_as(node, "expiry-warning-days")?
            .unwrap_or_else(default_expiry_warning_days),
    })
}

fn warn_unknown_fields(node: &KdlNode, known: &[&str]) {
    let Some(children) = node.children() else {
        return;
    };
    for child in children.nodes() {
        let name = child.name().value();
        if !known.contains(&name) {
            warn!(
                block = %node.name().value(),
                field = %name,
                "Ignoring unknown configuration field"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdl::KdlDocument;

    fn first_node(text: &str) -> KdlNode {
        let doc: KdlDocument = text.parse().unwrap();
        doc.nodes()[0].clone()
    }

    #[test]
    fn test_storage_partial_override() {
        let node = first_node(r#"storage { secrets-dir "/srv/secrets"; }"#);
        let storage = parse_storage_config(&node).unwrap();
        assert_eq!(storage.secrets_dir, PathBuf::from("/srv/secrets"));
        assert_eq!(storage.certificates_dir, default_certificates_dir());
        assert_eq!(storage.outbox_dir, default_outbox_dir());
    }

    #[test]
    fn test_storage_wrong_type() {
        let node = first_node("storage { secrets-dir 42; }");
        let err = parse_storage_config(&node).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "secrets-dir"));
    }

    #[test]
    fn test_keys_out_of_range() {
        let node = first_node("keys { password-length -1; }");
        let err = parse_key_config(&node).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_keys_defaults() {
        let node = first_node("keys { }");
        let keys = parse_key_config(&node).unwrap();
        assert_eq!(keys, KeyConfig::default());
    }

    #[test]
    fn test_certificates_hostnames_in_order() {
        let node = first_node(
            r#"certificates {
                hostname "b.example"
                hostname "a.example"
            }"#,
        );
        let certs = parse_certificates_config(&node).unwrap();
        let names: Vec<_> = certs.hostnames.iter().map(|h| h.as_str()).collect();
        assert_eq!(names, vec!["b.example", "a.example"]);
        assert_eq!(certs.expiry_warning_days, 30);
    }
}
