//! End-to-end lifecycle behaviour against real on-disk stores.

use std::sync::Arc;

use proptest::prelude::*;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use tempfile::TempDir;

use tollgate::{
    find_for_hostname, hostname_of, render_bundle, CertError, CertState, CertificateDirectory,
    FileSecretStore, Hostname, InvalidatedCertificate, KeyMaterialStore, KeyOptions,
    LifecycleManager, MemoryExchange, Outcome, ProviderCertificate, SecretStore,
};

const TEST_KEY_OPTIONS: KeyOptions = KeyOptions {
    password_length: 12,
    encryption_rounds: 1_000,
};

struct Node {
    temp_dir: TempDir,
    secrets: Arc<FileSecretStore>,
    exchange: Arc<MemoryExchange>,
    manager: LifecycleManager,
}

impl Node {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let secrets = Arc::new(FileSecretStore::new(&temp_dir.path().join("secrets")).unwrap());
        let exchange = Arc::new(MemoryExchange::new());
        let manager = Self::manager_for(&temp_dir, secrets.clone(), exchange.clone());
        Self {
            temp_dir,
            secrets,
            exchange,
            manager,
        }
    }

    fn manager_for(
        temp_dir: &TempDir,
        secrets: Arc<FileSecretStore>,
        exchange: Arc<MemoryExchange>,
    ) -> LifecycleManager {
        let keys = KeyMaterialStore::new(secrets, TEST_KEY_OPTIONS);
        let directory = CertificateDirectory::new(&temp_dir.path().join("certs")).unwrap();
        LifecycleManager::new(keys, exchange, directory)
    }

    /// A fresh manager over the same directories, as after a restart
    fn restarted(&self) -> LifecycleManager {
        Self::manager_for(&self.temp_dir, self.secrets.clone(), self.exchange.clone())
    }

    fn artifacts(&self) -> Vec<Hostname> {
        self.manager.directory().list().unwrap()
    }
}

fn host(name: &str) -> Hostname {
    Hostname::parse(name).unwrap()
}

fn certificate_pem(name: &str) -> String {
    let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, name);
    let key = KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap().pem()
}

fn issued(name: &str) -> ProviderCertificate {
    ProviderCertificate::new(certificate_pem(name), vec![certificate_pem("ca.internal")]).unwrap()
}

#[test]
fn test_double_request_is_idempotent() {
    let mut node = Node::new();
    let name = host("example.internal");

    let first = node.manager.request_certificate(&name).unwrap();
    let second = node.manager.request_certificate(&name).unwrap();

    assert!(matches!(first, Outcome::Submitted { .. }));
    assert!(matches!(
        second,
        Outcome::Skipped {
            state: CertState::Pending,
            ..
        }
    ));
    assert_eq!(node.exchange.submissions_for(&name), 1);
    assert_eq!(node.secrets.list().unwrap(), vec![name]);
}

#[test]
fn test_example_internal_issuance() {
    let mut node = Node::new();
    let name = host("example.internal");

    node.manager.request_certificate(&name).unwrap();
    let csr = &node.exchange.submitted()[0];
    assert_eq!(csr.hostname, name);
    assert!(csr.pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));

    let certificate = issued("example.internal");
    let outcome = node.manager.certificate_available(&certificate).unwrap();

    assert!(outcome.directory_changed());
    assert_eq!(node.manager.state(&name), CertState::Active);

    let bundle = node
        .manager
        .read_certificate_from_unit(&name)
        .unwrap()
        .unwrap();
    assert!(bundle.contains(certificate.certificate().trim_end()));
    assert!(bundle.contains(certificate.chain()[0].trim_end()));
    assert_eq!(hostname_of(&bundle).unwrap(), name);
}

#[test]
fn test_expiring_without_key_fails() {
    let mut node = Node::new();
    let before = node.artifacts();

    let err = node
        .manager
        .certificate_expiring(&certificate_pem("example.internal"))
        .unwrap_err();

    assert!(matches!(err, CertError::GetPrivateKey { .. }));
    assert_eq!(node.artifacts(), before);
    assert!(node.exchange.submitted().is_empty());
}

#[test]
fn test_invalidated_unknown_certificate_is_ignored() {
    let mut node = Node::new();
    let tracked = host("example.internal");
    node.manager.request_certificate(&tracked).unwrap();
    node.manager
        .certificate_available(&issued("example.internal"))
        .unwrap();

    let outcome = node
        .manager
        .certificate_invalidated(&InvalidatedCertificate::Certificate(certificate_pem(
            "unknown.internal",
        )))
        .unwrap();

    assert!(matches!(outcome, Outcome::Discarded { .. }));
    assert_eq!(node.manager.state(&tracked), CertState::Active);
    assert_eq!(
        node.manager.state(&host("unknown.internal")),
        CertState::Unrequested
    );
    assert_eq!(node.artifacts(), vec![tracked]);
}

#[test]
fn test_invalidated_by_raw_certificate_removes_artifact() {
    let mut node = Node::new();
    let name = host("example.internal");
    let certificate = issued("example.internal");
    node.manager.request_certificate(&name).unwrap();
    node.manager.certificate_available(&certificate).unwrap();

    let outcome = node
        .manager
        .certificate_invalidated(&InvalidatedCertificate::Certificate(
            certificate.certificate().to_string(),
        ))
        .unwrap();

    assert!(outcome.directory_changed());
    assert_eq!(node.manager.state(&name), CertState::Invalidated);
    assert!(node.artifacts().is_empty());
    assert!(node.manager.keys().contains(&name).unwrap());
}

#[test]
fn test_purge_leaves_nothing() {
    let mut node = Node::new();
    for name in ["a.internal", "b.internal", "c.internal"] {
        node.manager.request_certificate(&host(name)).unwrap();
    }
    node.manager
        .certificate_available(&issued("a.internal"))
        .unwrap();
    node.manager
        .certificate_available(&issued("b.internal"))
        .unwrap();
    // An artifact left behind by an earlier run
    node.manager
        .directory()
        .write(&host("stale.internal"), "old bundle")
        .unwrap();

    node.manager.all_certificates_invalidated().unwrap();

    assert!(node.secrets.list().unwrap().is_empty());
    assert!(node.artifacts().is_empty());

    // Repeating it on an empty node is harmless
    let summary = node.manager.all_certificates_invalidated().unwrap();
    assert_eq!(summary.artifacts_removed, 0);
    assert_eq!(summary.keys_removed, 0);
}

#[test]
fn test_write_then_remove_round_trip() {
    let node = Node::new();
    let name = host("example.internal");
    let key = node.manager.keys().get_or_create(&name).unwrap();
    let certificate = issued("example.internal");

    assert!(node.manager.write_certificate_to_unit(&certificate).unwrap());
    let expected = render_bundle(&certificate, &key.decrypt().unwrap());
    assert_eq!(
        node.manager.read_certificate_from_unit(&name).unwrap(),
        Some(expected)
    );

    // Idempotent in both directions
    assert!(!node.manager.write_certificate_to_unit(&certificate).unwrap());
    assert!(node.manager.remove_certificate_from_unit(&name).unwrap());
    assert!(!node.manager.remove_certificate_from_unit(&name).unwrap());
    assert_eq!(node.manager.read_certificate_from_unit(&name).unwrap(), None);
}

#[test]
fn test_write_without_key_is_get_private_key_error() {
    let node = Node::new();
    let err = node
        .manager
        .write_certificate_to_unit(&issued("example.internal"))
        .unwrap_err();
    assert!(matches!(err, CertError::GetPrivateKey { .. }));
    assert!(node.artifacts().is_empty());
}

#[test]
fn test_renewal_preserves_key() {
    let mut node = Node::new();
    let name = host("example.internal");
    let certificate = issued("example.internal");
    node.manager.request_certificate(&name).unwrap();
    node.manager.certificate_available(&certificate).unwrap();
    let key_before = node.manager.keys().get(&name).unwrap();

    node.manager
        .certificate_expiring(certificate.certificate())
        .unwrap();

    assert_eq!(node.manager.keys().get(&name).unwrap(), key_before);
    assert_eq!(node.exchange.submissions_for(&name), 2);
    assert_eq!(node.manager.state(&name), CertState::Renewing);

    let csrs = node.exchange.submitted();
    assert_ne!(csrs[0].pem, "");
    assert_eq!(csrs[1].hostname, name);
}

#[test]
fn test_restart_restores_and_renews() {
    let mut node = Node::new();
    let name = host("example.internal");
    let certificate = issued("example.internal");
    node.manager.request_certificate(&name).unwrap();
    node.manager.certificate_available(&certificate).unwrap();

    let mut restarted = node.restarted();
    assert_eq!(restarted.state(&name), CertState::Unrequested);
    assert_eq!(restarted.restore().unwrap(), 1);
    assert_eq!(restarted.state(&name), CertState::Active);

    // Configured hostnames are re-requested on start; already active
    let outcome = restarted.request_certificate(&name).unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));

    restarted
        .certificate_expiring(certificate.certificate())
        .unwrap();
    assert_eq!(restarted.state(&name), CertState::Renewing);
}

#[test]
fn test_restart_keeps_outstanding_request() {
    let mut node = Node::new();
    let name = host("dyn.internal");
    node.manager.request_certificate(&name).unwrap();

    let mut restarted = node.restarted();
    restarted.restore().unwrap();
    assert_eq!(restarted.state(&name), CertState::Pending);

    // Already requested before the restart; no second CSR
    let outcome = restarted.request_certificate(&name).unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));
    assert_eq!(node.exchange.submissions_for(&name), 1);

    let outcome = restarted
        .certificate_available(&issued("dyn.internal"))
        .unwrap();
    assert!(matches!(outcome, Outcome::Materialized { changed: true, .. }));
    assert_eq!(restarted.state(&name), CertState::Active);
    assert!(restarted.directory().exists(&name));
}

#[test]
fn test_reconcile_first_match_wins() {
    let mut node = Node::new();
    let name = host("example.internal");
    node.manager.keys().get_or_create(&name).unwrap();

    let first = issued("example.internal");
    let second = issued("example.internal");
    let candidates = vec![first.clone(), second];
    assert_eq!(find_for_hostname(&name, &candidates), Some(&first));

    let outcomes = node.manager.reconcile(&candidates).unwrap();
    assert_eq!(outcomes.len(), 1);

    let bundle = node
        .manager
        .read_certificate_from_unit(&name)
        .unwrap()
        .unwrap();
    assert!(bundle.starts_with(first.certificate().trim_end()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_matcher_recovers_subject(name in "[a-z][a-z0-9]{0,10}(\\.[a-z][a-z0-9]{0,10}){1,3}") {
        let pem = certificate_pem(&name);
        let recovered = hostname_of(&pem).unwrap();
        prop_assert_eq!(recovered.as_str(), name.as_str());
    }

    #[test]
    fn prop_find_for_hostname_absent_is_none(name in "[a-z]{1,10}\\.absent") {
        let candidates = vec![issued("present.internal")];
        prop_assert!(find_for_hostname(&host(&name), &candidates).is_none());
    }
}
