//! Certificate lifecycle manager
//!
//! Drives one state machine per hostname:
//!
//! ```text
//! Unrequested ──request──▶ Pending ──available──▶ Active ──expiring──▶ Renewing
//!                                                   ▲                     │
//!                                                   └──────available──────┘
//! any ──invalidated──▶ Invalidated ──request──▶ Pending
//! ```
//!
//! Each operation runs to completion and only records the new state once
//! every side effect (secret store, exchange, certificate directory) has
//! succeeded. A failed event leaves the previous state in place.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::csr::build_csr;
use crate::directory::{render_bundle, CertificateDirectory};
use crate::error::{CertError, CertResult};
use crate::exchange::ExchangeChannel;
use crate::keys::KeyMaterialStore;
use crate::matcher::{find_for_hostname, hostname_of, ProviderCertificate};
use tollgate_common::Hostname;

/// Per-hostname certificate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertState {
    Unrequested,
    /// CSR submitted, nothing issued yet
    Pending,
    /// Certificate materialized in the certificate directory
    Active,
    /// Renewal CSR submitted; the previous certificate is still served
    Renewing,
    /// Artifact removed; a new request starts over
    Invalidated,
}

impl CertState {
    /// Whether a CSR for this hostname is awaiting issuance
    pub fn is_awaiting_issuance(self) -> bool {
        matches!(self, CertState::Pending | CertState::Renewing)
    }
}

impl fmt::Display for CertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CertState::Unrequested => "unrequested",
            CertState::Pending => "pending",
            CertState::Active => "active",
            CertState::Renewing => "renewing",
            CertState::Invalidated => "invalidated",
        };
        f.write_str(name)
    }
}

/// What handling an event did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    /// A CSR went out through the exchange channel
    Submitted { hostname: Hostname },
    /// The certificate bundle was written; `changed` is false when the
    /// directory already held identical content
    Materialized { hostname: Hostname, changed: bool },
    /// The certificate bundle was removed (or was already absent)
    Removed { hostname: Hostname, changed: bool },
    /// Repeated event; nothing to do in the current state
    Skipped { hostname: Hostname, state: CertState },
    /// Stale or unexpected event, dropped
    Discarded { hostname: Hostname, reason: String },
}

impl Outcome {
    pub fn hostname(&self) -> &Hostname {
        match self {
            Outcome::Submitted { hostname }
            | Outcome::Materialized { hostname, .. }
            | Outcome::Removed { hostname, .. }
            | Outcome::Skipped { hostname, .. }
            | Outcome::Discarded { hostname, .. } => hostname,
        }
    }

    /// True when the proxy should reload its certificates
    pub fn directory_changed(&self) -> bool {
        match self {
            Outcome::Materialized { changed, .. } | Outcome::Removed { changed, .. } => *changed,
            _ => false,
        }
    }
}

/// Invalidation notice, either raw or already bound to a hostname
#[derive(Debug, Clone)]
pub enum InvalidatedCertificate {
    /// PEM certificate that still has to be matched
    Certificate(String),
    /// Certificate whose hostname the caller already resolved
    Provider(ProviderCertificate),
}

/// Result of tearing down every certificate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub invalidated: usize,
    pub artifacts_removed: usize,
    pub keys_removed: usize,
}

impl PurgeSummary {
    pub fn directory_changed(&self) -> bool {
        self.artifacts_removed > 0
    }
}

/// Orchestrates key material, CSRs, the exchange channel and the
/// certificate directory.
pub struct LifecycleManager {
    keys: KeyMaterialStore,
    exchange: Arc<dyn ExchangeChannel>,
    directory: CertificateDirectory,
    states: BTreeMap<Hostname, CertState>,
}

impl LifecycleManager {
    pub fn new(
        keys: KeyMaterialStore,
        exchange: Arc<dyn ExchangeChannel>,
        directory: CertificateDirectory,
    ) -> Self {
        Self {
            keys,
            exchange,
            directory,
            states: BTreeMap::new(),
        }
    }

    pub fn keys(&self) -> &KeyMaterialStore {
        &self.keys
    }

    pub fn directory(&self) -> &CertificateDirectory {
        &self.directory
    }

    /// Current state; hostnames never seen are `Unrequested`
    pub fn state(&self, hostname: &Hostname) -> CertState {
        self.states
            .get(hostname)
            .copied()
            .unwrap_or(CertState::Unrequested)
    }

    /// Hostnames with a CSR awaiting issuance, sorted
    pub fn pending_hostnames(&self) -> Vec<Hostname> {
        self.states
            .iter()
            .filter(|(_, state)| state.is_awaiting_issuance())
            .map(|(hostname, _)| hostname.clone())
            .collect()
    }

    /// Every hostname the manager has seen, with its state, sorted
    pub fn tracked(&self) -> Vec<(Hostname, CertState)> {
        self.states
            .iter()
            .map(|(hostname, state)| (hostname.clone(), *state))
            .collect()
    }

    fn transition(&mut self, hostname: &Hostname, to: CertState) {
        let from = self.state(hostname);
        self.states.insert(hostname.clone(), to);
        if from != to {
            info!(hostname = %hostname, from = %from, to = %to, "Certificate state changed");
        }
    }

    /// Build a CSR with the stored key and send it
    fn submit(&self, hostname: &Hostname, key_must_exist: bool) -> CertResult<()> {
        let key = if key_must_exist {
            self.keys
                .get(hostname)
                .map_err(CertError::into_get_private_key)?
        } else {
            self.keys.get_or_create(hostname)?
        };

        let csr = build_csr(hostname, &key)?;
        self.exchange
            .submit_csr(hostname, &csr)
            .map_err(|source| CertError::ExchangeSubmission {
                hostname: hostname.clone(),
                source,
            })
    }

    /// Request a certificate for `hostname`.
    ///
    /// No-op while a request is outstanding or a certificate is active.
    /// Creates the key on first use and reuses it afterwards.
    pub fn request_certificate(&mut self, hostname: &Hostname) -> CertResult<Outcome> {
        let state = self.state(hostname);
        if matches!(
            state,
            CertState::Pending | CertState::Active | CertState::Renewing
        ) {
            debug!(hostname = %hostname, state = %state, "Certificate already requested");
            return Ok(Outcome::Skipped {
                hostname: hostname.clone(),
                state,
            });
        }

        self.submit(hostname, false)?;
        self.transition(hostname, CertState::Pending);
        Ok(Outcome::Submitted {
            hostname: hostname.clone(),
        })
    }

    /// Bind an issued certificate to its hostname and materialize it
    pub fn certificate_available(
        &mut self,
        certificate: &ProviderCertificate,
    ) -> CertResult<Outcome> {
        let hostname = certificate.hostname();
        let state = self.state(hostname);

        if matches!(state, CertState::Unrequested | CertState::Invalidated) {
            warn!(
                hostname = %hostname,
                state = %state,
                "Discarding certificate for a hostname with no outstanding request"
            );
            return Ok(Outcome::Discarded {
                hostname: hostname.clone(),
                reason: format!("no outstanding request ({})", state),
            });
        }

        let changed = self.write_certificate_to_unit(certificate)?;
        self.transition(hostname, CertState::Active);
        Ok(Outcome::Materialized {
            hostname: hostname.clone(),
            changed,
        })
    }

    /// Start renewal for the hostname `certificate_pem` was issued for.
    ///
    /// Reuses the stored key; the current bundle stays in place until the
    /// replacement arrives.
    pub fn certificate_expiring(&mut self, certificate_pem: &str) -> CertResult<Outcome> {
        let hostname = hostname_of(certificate_pem)?;
        let state = self.state(&hostname);

        match state {
            CertState::Pending | CertState::Renewing => {
                debug!(hostname = %hostname, state = %state, "Request already in flight");
                return Ok(Outcome::Skipped { hostname, state });
            }
            CertState::Invalidated => {
                warn!(hostname = %hostname, "Ignoring expiry notice for invalidated certificate");
                return Ok(Outcome::Discarded {
                    hostname,
                    reason: "certificate was invalidated".to_string(),
                });
            }
            CertState::Unrequested | CertState::Active => {}
        }

        self.submit(&hostname, true)?;
        self.transition(&hostname, CertState::Renewing);
        Ok(Outcome::Submitted { hostname })
    }

    /// Withdraw a revoked or otherwise invalid certificate.
    ///
    /// The key stays in the secret store so a later request reuses it.
    pub fn certificate_invalidated(
        &mut self,
        invalidated: &InvalidatedCertificate,
    ) -> CertResult<Outcome> {
        let hostname = match invalidated {
            InvalidatedCertificate::Certificate(pem) => hostname_of(pem)?,
            InvalidatedCertificate::Provider(certificate) => certificate.hostname().clone(),
        };

        if !self.states.contains_key(&hostname) && !self.directory.exists(&hostname) {
            warn!(hostname = %hostname, "Invalidated certificate matches no tracked hostname");
            return Ok(Outcome::Discarded {
                hostname,
                reason: "no tracked hostname".to_string(),
            });
        }

        let changed = self.remove_certificate_from_unit(&hostname)?;
        self.transition(&hostname, CertState::Invalidated);
        Ok(Outcome::Removed { hostname, changed })
    }

    /// Tear everything down: every bundle and every stored key.
    pub fn all_certificates_invalidated(&mut self) -> CertResult<PurgeSummary> {
        let artifacts_removed = self.directory.clear()?;

        // Bundles are gone; state must say so even if the key purge fails
        let tracked: Vec<Hostname> = self.states.keys().cloned().collect();
        for hostname in &tracked {
            self.transition(hostname, CertState::Invalidated);
        }

        let keys_removed = self.keys.purge()?;

        let summary = PurgeSummary {
            invalidated: tracked.len(),
            artifacts_removed,
            keys_removed,
        };
        info!(
            invalidated = summary.invalidated,
            artifacts_removed, keys_removed, "All certificates invalidated"
        );
        Ok(summary)
    }

    /// Write the bundle for `certificate` with the hostname's decrypted key.
    ///
    /// Returns whether the directory changed.
    pub fn write_certificate_to_unit(&self, certificate: &ProviderCertificate) -> CertResult<bool> {
        let hostname = certificate.hostname();
        let key = self
            .keys
            .get(hostname)
            .map_err(CertError::into_get_private_key)?;
        let private_key = key.decrypt().map_err(|e| CertError::GetPrivateKey {
            hostname: hostname.clone(),
            reason: e.to_string(),
        })?;

        let bundle = render_bundle(certificate, &private_key);
        Ok(self.directory.write(hostname, &bundle)?)
    }

    /// Remove the hostname's bundle, if any. Returns whether one was removed.
    pub fn remove_certificate_from_unit(&self, hostname: &Hostname) -> CertResult<bool> {
        Ok(self.directory.remove(hostname)?)
    }

    /// Bundle currently served for `hostname`
    pub fn read_certificate_from_unit(&self, hostname: &Hostname) -> CertResult<Option<String>> {
        Ok(self.directory.read(hostname)?)
    }

    /// Rebuild state from disk after a restart.
    ///
    /// Hostnames with a bundle become `Active`. Hostnames with stored key
    /// material but no bundle were requested and never served, so they
    /// become `Pending` and their certificate is accepted when it arrives.
    /// Returns how many hostnames were restored.
    pub fn restore(&mut self) -> CertResult<usize> {
        let mut restored = 0;

        for hostname in self.directory.list()? {
            if self.state(&hostname) == CertState::Unrequested {
                self.states.insert(hostname, CertState::Active);
                restored += 1;
            }
        }
        for hostname in self.keys.hostnames()? {
            if self.state(&hostname) == CertState::Unrequested {
                debug!(hostname = %hostname, "Restoring outstanding request");
                self.states.insert(hostname, CertState::Pending);
                restored += 1;
            }
        }

        info!(restored, "Restored certificate state from disk");
        Ok(restored)
    }

    /// Materialize the certificates currently assigned to this unit.
    ///
    /// Only hostnames with stored key material are considered; for each the
    /// first matching candidate wins.
    pub fn reconcile(&mut self, candidates: &[ProviderCertificate]) -> CertResult<Vec<Outcome>> {
        let mut hostnames: Vec<&Hostname> = Vec::new();
        for candidate in candidates {
            if !hostnames.contains(&candidate.hostname()) {
                hostnames.push(candidate.hostname());
            }
        }

        let mut outcomes = Vec::with_capacity(hostnames.len());
        for hostname in hostnames {
            let Some(certificate) = find_for_hostname(hostname, candidates) else {
                continue;
            };

            if !self.keys.contains(hostname)? {
                warn!(hostname = %hostname, "Skipping assigned certificate without key material");
                outcomes.push(Outcome::Discarded {
                    hostname: hostname.clone(),
                    reason: "no key material".to_string(),
                });
                continue;
            }

            let changed = self.write_certificate_to_unit(certificate)?;
            self.transition(hostname, CertState::Active);
            outcomes.push(Outcome::Materialized {
                hostname: hostname.clone(),
                changed,
            });
        }

        Ok(outcomes)
    }

    /// Invalidate `hostname` and delete its key material as well
    pub fn forget_hostname(&mut self, hostname: &Hostname) -> CertResult<Outcome> {
        let changed = self.remove_certificate_from_unit(hostname)?;
        self.keys.delete(hostname)?;
        self.transition(hostname, CertState::Invalidated);
        info!(hostname = %hostname, "Forgot hostname and its key material");
        Ok(Outcome::Removed {
            hostname: hostname.clone(),
            changed,
        })
    }
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("directory", &self.directory)
            .field("tracked", &self.states.len())
            .finish()
    }
}
