//! In-memory metadata store
//!
//! Holds entries for the life of the process. Useful when only one process
//! needs the metadata, and in tests of components that take a
//! [`ConcurrentMetadataStore`].

use crate::error::MetadataStoreResult;
use crate::metadata::{ConcurrentMetadataStore, MetadataStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Process-local metadata store
#[derive(Debug, Default)]
pub struct SimpleMetadataStore {
    entries: Mutex<HashMap<String, String>>,
}

impl SimpleMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl MetadataStore for SimpleMetadataStore {
    async fn put(&self, key: &str, value: &str) -> MetadataStoreResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> MetadataStoreResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> MetadataStoreResult<Option<String>> {
        Ok(self.entries.lock().remove(key))
    }
}

#[async_trait]
impl ConcurrentMetadataStore for SimpleMetadataStore {
    async fn put_if_absent(&self, key: &str, value: &str) -> MetadataStoreResult<Option<String>> {
        match self.entries.lock().entry(key.to_string()) {
            Entry::Occupied(existing) => Ok(Some(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                Ok(None)
            }
        }
    }

    /// Returns `true` only when the value was replaced
    async fn replace(
        &self,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> MetadataStoreResult<bool> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(current) if current.as_str() == old_value => {
                *current = new_value.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_remove() {
        let store = SimpleMetadataStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.put("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.len(), 1);

        assert_eq!(store.remove("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.remove("a").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_if_absent() {
        let store = SimpleMetadataStore::new();
        assert_eq!(store.put_if_absent("a", "1").await.unwrap(), None);
        assert_eq!(store.put_if_absent("a", "2").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_replace() {
        let store = SimpleMetadataStore::new();
        store.put("a", "1").await.unwrap();
        assert!(store.replace("a", "1", "2").await.unwrap());
        assert!(!store.replace("a", "1", "3").await.unwrap());
        assert!(!store.replace("missing", "x", "y").await.unwrap());
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
    }
}
