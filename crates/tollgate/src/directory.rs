//! Certificate directory the reverse proxy loads from.
//!
//! # Directory Structure
//!
//! ```text
//! certs/                          # 0755
//! ├── example.internal.pem        # leaf + chain + private key, 0644
//! └── www.example.internal.pem
//! ```
//!
//! One bundle per hostname in the layout HAProxy's `crt` directive expects.
//! Only the lifecycle manager writes here.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace, warn};

use crate::fsutil::{ensure_dir, write_atomic};
use crate::matcher::ProviderCertificate;
use tollgate_common::Hostname;

const BUNDLE_EXTENSION: &str = "pem";

/// Concatenate leaf, chain and decrypted private key into one bundle
pub fn render_bundle(certificate: &ProviderCertificate, private_key_pem: &str) -> String {
    let mut blocks = Vec::with_capacity(certificate.chain().len() + 2);
    blocks.push(certificate.certificate().trim_end());
    blocks.extend(certificate.chain().iter().map(|c| c.trim_end()));
    blocks.push(private_key_pem.trim_end());

    let mut bundle = blocks.join("\n");
    bundle.push('\n');
    bundle
}

/// Bundle directory manager
#[derive(Debug)]
pub struct CertificateDirectory {
    base_path: PathBuf,
}

impl CertificateDirectory {
    /// Open (creating if needed) the certificate directory
    pub fn new(base_path: &Path) -> std::io::Result<Self> {
        ensure_dir(base_path, 0o755)?;

        info!(
            certificates_dir = %base_path.display(),
            "Initialized certificate directory"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of a hostname's bundle
    pub fn bundle_path(&self, hostname: &Hostname) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", hostname, BUNDLE_EXTENSION))
    }

    pub fn exists(&self, hostname: &Hostname) -> bool {
        self.bundle_path(hostname).exists()
    }

    /// Read a hostname's bundle, if present
    pub fn read(&self, hostname: &Hostname) -> std::io::Result<Option<String>> {
        let path = self.bundle_path(hostname);
        if !path.exists() {
            trace!(hostname = %hostname, "No certificate bundle found");
            return Ok(None);
        }
        fs::read_to_string(&path).map(Some)
    }

    /// Write a hostname's bundle.
    ///
    /// Returns `false` without touching the file when it already holds
    /// exactly `content`.
    pub fn write(&self, hostname: &Hostname, content: &str) -> std::io::Result<bool> {
        if self.read(hostname)?.as_deref() == Some(content) {
            debug!(hostname = %hostname, "Certificate bundle already up to date");
            return Ok(false);
        }

        let path = self.bundle_path(hostname);
        write_atomic(&path, content.as_bytes(), 0o644)?;

        info!(
            hostname = %hostname,
            path = %path.display(),
            "Certificate bundle written"
        );
        Ok(true)
    }

    /// Remove a hostname's bundle. Returns `false` if there was none.
    pub fn remove(&self, hostname: &Hostname) -> std::io::Result<bool> {
        let path = self.bundle_path(hostname);

        if path.exists() {
            fs::remove_file(&path)?;
            info!(hostname = %hostname, "Removed certificate bundle");
            Ok(true)
        } else {
            trace!(hostname = %hostname, "Certificate bundle to remove not found");
            Ok(false)
        }
    }

    /// Hostnames with a bundle on disk
    ///
    /// Files not named `<hostname>.pem` are ignored.
    pub fn list(&self) -> std::io::Result<Vec<Hostname>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let mut hostnames = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BUNDLE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Hostname::parse(stem) {
                Ok(hostname) => hostnames.push(hostname),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring file that is not named after a hostname"
                ),
            }
        }

        hostnames.sort();
        Ok(hostnames)
    }

    /// Remove every bundle, returning how many were removed
    pub fn clear(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        for hostname in self.list()? {
            if self.remove(&hostname)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
