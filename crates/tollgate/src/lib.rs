//! Tollgate - TLS certificate lifecycle manager for a reverse-proxy node
//!
//! Generates and stores per-hostname private keys, sends certificate signing
//! requests to an external certificate authority, binds the certificates it
//! sends back to the hostnames that asked for them, and keeps the proxy's
//! certificate directory in step with renewals and revocations.
//!
//! - **Key material**: encrypted private keys in a pluggable secret store
//! - **CSRs**: built from the stored key, subject = hostname
//! - **Matching**: hostname recovered from an issued certificate
//! - **Lifecycle**: per-hostname state machine driven by events
//! - **Materialization**: `<hostname>.pem` bundles for the proxy
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tollgate::{
//!     CertificateDirectory, KeyMaterialStore, KeyOptions, LifecycleManager,
//!     MemoryExchange, MemorySecretStore,
//! };
//!
//! let keys = KeyMaterialStore::new(Arc::new(MemorySecretStore::new()), KeyOptions::default());
//! let directory = CertificateDirectory::new("/var/lib/haproxy/certs".as_ref())?;
//! let mut manager = LifecycleManager::new(keys, Arc::new(MemoryExchange::new()), directory);
//!
//! manager.request_certificate(&"example.internal".parse()?)?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod csr;
pub mod directory;
pub mod error;
pub mod events;
pub mod exchange;
mod fsutil;
pub mod keys;
pub mod lifecycle;
pub mod matcher;
pub mod secrets;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Errors
pub use error::{CertError, CertResult, ExchangeError, SecretStoreError};

// Key material
pub use keys::{KeyMaterial, KeyMaterialStore, KeyOptions};
pub use secrets::{FileSecretStore, MemorySecretStore, SecretStore};

// Requests and matching
pub use csr::{build_csr, CertificateSigningRequest};
pub use matcher::{
    expiry_of, find_for_hostname, hostname_of, ProviderCertificate, RawProviderCertificate,
};

// Exchange channel
pub use exchange::{ExchangeChannel, MemoryExchange, SpoolExchange};

// Certificate directory
pub use directory::{render_bundle, CertificateDirectory};

// Lifecycle
pub use lifecycle::{CertState, InvalidatedCertificate, LifecycleManager, Outcome, PurgeSummary};

// Event stream
pub use events::{dispatch, run_event_stream, EventReport, Handled, LifecycleEvent, StreamSummary};

pub use tollgate_common::Hostname;
