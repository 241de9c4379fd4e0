//! Outbound side of the exchange with the certificate authority.
//!
//! The lifecycle manager only ever *sends* through this interface. Issued,
//! expiring and revoked certificates come back asynchronously as
//! [`LifecycleEvent`](crate::events::LifecycleEvent)s, delivered by whatever
//! drives the manager.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::csr::CertificateSigningRequest;
use crate::error::ExchangeError;
use crate::fsutil::{ensure_dir, write_atomic};
use tollgate_common::Hostname;

/// Transport for certificate signing requests.
pub trait ExchangeChannel: Send + Sync {
    /// Hand a CSR to the authority. Retries and timeouts are the channel's
    /// own business; an error here means the request was not sent.
    fn submit_csr(
        &self,
        hostname: &Hostname,
        csr: &CertificateSigningRequest,
    ) -> Result<(), ExchangeError>;
}

/// Spools CSRs as `<outbox>/<hostname>.csr` files for an external agent to
/// pick up. Re-submitting replaces the earlier request for that hostname.
#[derive(Debug)]
pub struct SpoolExchange {
    outbox: PathBuf,
}

impl SpoolExchange {
    pub fn new(outbox: &Path) -> Result<Self, ExchangeError> {
        ensure_dir(outbox, 0o755)?;
        info!(outbox = %outbox.display(), "Initialized CSR outbox");
        Ok(Self {
            outbox: outbox.to_path_buf(),
        })
    }

    /// Where the CSR for a hostname is spooled
    pub fn request_path(&self, hostname: &Hostname) -> PathBuf {
        self.outbox.join(format!("{}.csr", hostname))
    }
}

impl ExchangeChannel for SpoolExchange {
    fn submit_csr(
        &self,
        hostname: &Hostname,
        csr: &CertificateSigningRequest,
    ) -> Result<(), ExchangeError> {
        let path = self.request_path(hostname);
        write_atomic(&path, csr.pem.as_bytes(), 0o644)?;
        info!(hostname = %hostname, path = %path.display(), "Spooled certificate signing request");
        Ok(())
    }
}

/// Keeps submitted CSRs in memory, in submission order.
///
/// Can be armed to reject the next submission.
#[derive(Debug, Default)]
pub struct MemoryExchange {
    submitted: Mutex<Vec<CertificateSigningRequest>>,
    fail_next: AtomicBool,
}

impl MemoryExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `submit_csr` call fail
    pub fn fail_next_submission(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Everything submitted so far
    pub fn submitted(&self) -> Vec<CertificateSigningRequest> {
        self.submitted.lock().clone()
    }

    /// Submissions for one hostname
    pub fn submissions_for(&self, hostname: &Hostname) -> usize {
        self.submitted
            .lock()
            .iter()
            .filter(|csr| &csr.hostname == hostname)
            .count()
    }
}

impl ExchangeChannel for MemoryExchange {
    fn submit_csr(
        &self,
        hostname: &Hostname,
        csr: &CertificateSigningRequest,
    ) -> Result<(), ExchangeError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ExchangeError::Rejected(format!(
                "submission for {} rejected",
                hostname
            )));
        }
        debug!(hostname = %hostname, "Recorded certificate signing request");
        self.submitted.lock().push(csr.clone());
        Ok(())
    }
}
