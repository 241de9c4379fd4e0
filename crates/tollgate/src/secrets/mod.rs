//! Secret store backends for per-hostname key material.
//!
//! The secret store is the only place a private key survives a restart.
//! [`KeyMaterialStore`](crate::keys::KeyMaterialStore) owns all access to
//! it; nothing else reads or writes the backend directly.

mod file;
mod memory;

pub use file::FileSecretStore;
pub use memory::MemorySecretStore;

use crate::error::SecretStoreError;
use crate::keys::KeyMaterial;
use tollgate_common::Hostname;

/// Durable, access-controlled storage for key material keyed by hostname.
pub trait SecretStore: Send + Sync {
    /// Store (or replace) the key material for a hostname.
    fn put(&self, hostname: &Hostname, key: &KeyMaterial) -> Result<(), SecretStoreError>;

    /// Look up the key material for a hostname.
    fn get(&self, hostname: &Hostname) -> Result<Option<KeyMaterial>, SecretStoreError>;

    /// Remove the record. Returns `false` if there was nothing to remove.
    fn delete(&self, hostname: &Hostname) -> Result<bool, SecretStoreError>;

    /// All hostnames with a stored record.
    fn list(&self) -> Result<Vec<Hostname>, SecretStoreError>;
}
