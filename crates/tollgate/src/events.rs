//! Lifecycle events and the line-delimited JSON event stream.
//!
//! Whatever sits between the certificate authority and this node turns its
//! own notifications into [`LifecycleEvent`]s, one JSON object per line:
//!
//! ```text
//! {"event":"request-certificate","hostname":"example.internal"}
//! {"event":"certificate-available","certificate":"-----BEGIN CERTIFICATE-----...","chain":[]}
//! {"event":"certificate-expiring","certificate":"-----BEGIN CERTIFICATE-----..."}
//! {"event":"certificate-invalidated","certificate":"-----BEGIN CERTIFICATE-----..."}
//! {"event":"all-certificates-invalidated"}
//! ```
//!
//! Every input line gets exactly one [`EventReport`] line back.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::error::{CertError, CertResult};
use crate::lifecycle::{InvalidatedCertificate, LifecycleManager, Outcome, PurgeSummary};
use crate::matcher::{ProviderCertificate, RawProviderCertificate};
use tollgate_common::Hostname;

/// Inbound lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    RequestCertificate {
        hostname: Hostname,
    },
    CertificateAvailable {
        certificate: String,
        #[serde(default)]
        chain: Vec<String>,
    },
    CertificateExpiring {
        certificate: String,
    },
    #[serde(rename_all = "kebab-case")]
    CertificateInvalidated {
        #[serde(default)]
        certificate: Option<String>,
        #[serde(default)]
        provider_certificate: Option<RawProviderCertificate>,
    },
    AllCertificatesInvalidated,
}

impl LifecycleEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::RequestCertificate { .. } => "request-certificate",
            LifecycleEvent::CertificateAvailable { .. } => "certificate-available",
            LifecycleEvent::CertificateExpiring { .. } => "certificate-expiring",
            LifecycleEvent::CertificateInvalidated { .. } => "certificate-invalidated",
            LifecycleEvent::AllCertificatesInvalidated => "all-certificates-invalidated",
        }
    }
}

/// Result of a handled event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Handled {
    Outcome(Outcome),
    Purge(PurgeSummary),
}

impl Handled {
    pub fn directory_changed(&self) -> bool {
        match self {
            Handled::Outcome(outcome) => outcome.directory_changed(),
            Handled::Purge(summary) => summary.directory_changed(),
        }
    }
}

/// Map one event onto the matching manager operation
pub fn dispatch(manager: &mut LifecycleManager, event: &LifecycleEvent) -> CertResult<Handled> {
    let outcome = match event {
        LifecycleEvent::RequestCertificate { hostname } => manager.request_certificate(hostname)?,
        LifecycleEvent::CertificateAvailable { certificate, chain } => {
            let certificate = ProviderCertificate::new(certificate.clone(), chain.clone())?;
            manager.certificate_available(&certificate)?
        }
        LifecycleEvent::CertificateExpiring { certificate } => {
            manager.certificate_expiring(certificate)?
        }
        LifecycleEvent::CertificateInvalidated {
            certificate,
            provider_certificate,
        } => {
            let invalidated = match (provider_certificate, certificate) {
                (Some(raw), _) => {
                    InvalidatedCertificate::Provider(ProviderCertificate::try_from(raw.clone())?)
                }
                (None, Some(pem)) => InvalidatedCertificate::Certificate(pem.clone()),
                (None, None) => {
                    return Err(CertError::InvalidCertificate(
                        "invalidation notice carries no certificate".to_string(),
                    ))
                }
            };
            manager.certificate_invalidated(&invalidated)?
        }
        LifecycleEvent::AllCertificatesInvalidated => {
            return Ok(Handled::Purge(manager.all_certificates_invalidated()?));
        }
    };
    Ok(Handled::Outcome(outcome))
}

/// One line of stream output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventReport {
    /// 1-based input line number
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Handled>,
    /// The certificate directory changed; the proxy should reload
    pub reload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Totals for a finished stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub events: usize,
    pub failed: usize,
    pub reloads: usize,
}

fn handle_line(manager: &mut LifecycleManager, line: usize, text: &str) -> EventReport {
    let event = match serde_json::from_str::<LifecycleEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(line, error = %e, "Malformed lifecycle event");
            return EventReport {
                line,
                event: None,
                result: None,
                reload: false,
                error: Some(format!("malformed event: {}", e)),
            };
        }
    };

    debug!(line, event = event.name(), "Handling lifecycle event");
    match dispatch(manager, &event) {
        Ok(handled) => EventReport {
            line,
            event: Some(event.name()),
            reload: handled.directory_changed(),
            result: Some(handled),
            error: None,
        },
        Err(e) => {
            match &e {
                CertError::InvalidCertificate(_) => {
                    warn!(line, event = event.name(), error = %e, "Discarding event")
                }
                _ => error!(line, event = event.name(), error = %e, "Lifecycle event failed"),
            }
            EventReport {
                line,
                event: Some(event.name()),
                result: None,
                reload: false,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Handle events from `reader` until EOF, writing one report per event.
///
/// Malformed lines and failed events are reported and skipped. Only I/O
/// errors on the stream itself end the loop early.
pub async fn run_event_stream<R, W>(
    manager: &mut LifecycleManager,
    reader: R,
    mut writer: W,
) -> std::io::Result<StreamSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = StreamSummary::default();
    let mut lines = reader.lines();
    let mut line = 0;

    while let Some(text) = lines.next_line().await? {
        line += 1;
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let report = handle_line(manager, line, text);
        summary.events += 1;
        if !report.is_ok() {
            summary.failed += 1;
        }
        if report.reload {
            summary.reloads += 1;
        }

        let mut encoded = serde_json::to_vec(&report).map_err(std::io::Error::other)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }

    info!(
        events = summary.events,
        failed = summary.failed,
        reloads = summary.reloads,
        "Event stream closed"
    );
    Ok(summary)
}
