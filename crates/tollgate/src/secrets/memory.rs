//! In-memory secret store.

use dashmap::DashMap;
use tracing::trace;

use super::SecretStore;
use crate::error::SecretStoreError;
use crate::keys::KeyMaterial;
use tollgate_common::Hostname;

/// Secret store backed by a concurrent map. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: DashMap<Hostname, KeyMaterial>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SecretStore for MemorySecretStore {
    fn put(&self, hostname: &Hostname, key: &KeyMaterial) -> Result<(), SecretStoreError> {
        trace!(hostname = %hostname, "Storing key material in memory");
        self.entries.insert(hostname.clone(), key.clone());
        Ok(())
    }

    fn get(&self, hostname: &Hostname) -> Result<Option<KeyMaterial>, SecretStoreError> {
        Ok(self.entries.get(hostname).map(|entry| entry.value().clone()))
    }

    fn delete(&self, hostname: &Hostname) -> Result<bool, SecretStoreError> {
        Ok(self.entries.remove(hostname).is_some())
    }

    fn list(&self) -> Result<Vec<Hostname>, SecretStoreError> {
        let mut hostnames: Vec<Hostname> =
            self.entries.iter().map(|entry| entry.key().clone()).collect();
        hostnames.sort();
        Ok(hostnames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tag: &str) -> KeyMaterial {
        KeyMaterial {
            private_key: format!("key-{tag}"),
            password: format!("pw-{tag}"),
        }
    }

    #[test]
    fn test_put_get_delete() {
        let store = MemorySecretStore::new();
        let host = Hostname::parse("example.internal").unwrap();

        assert!(store.get(&host).unwrap().is_none());

        store.put(&host, &key("a")).unwrap();
        assert_eq!(store.get(&host).unwrap(), Some(key("a")));
        assert_eq!(store.len(), 1);

        assert!(store.delete(&host).unwrap());
        assert!(!store.delete(&host).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_sorted() {
        let store = MemorySecretStore::new();
        for name in ["c.example", "a.example", "b.example"] {
            store.put(&Hostname::parse(name).unwrap(), &key(name)).unwrap();
        }

        let listed: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(Hostname::into_string)
            .collect();
        assert_eq!(listed, vec!["a.example", "b.example", "c.example"]);
    }
}
