//! Metadata store traits
//!
//! A metadata store is a string key/value map shared by components that
//! need to remember small pieces of state (offsets, last-seen ids).

use crate::error::MetadataStoreResult;
use crate::listener::MetadataStoreListener;
use async_trait::async_trait;
use std::sync::Arc;

/// Basic key/value operations
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Store a value, overwriting any previous one
    async fn put(&self, key: &str, value: &str) -> MetadataStoreResult<()>;

    /// Current value of a key
    async fn get(&self, key: &str) -> MetadataStoreResult<Option<String>>;

    /// Remove a key, returning its previous value
    async fn remove(&self, key: &str) -> MetadataStoreResult<Option<String>>;
}

/// Atomic conditional operations
#[async_trait]
pub trait ConcurrentMetadataStore: MetadataStore {
    /// Store a value only if the key is absent; returns the existing value
    /// otherwise
    async fn put_if_absent(&self, key: &str, value: &str) -> MetadataStoreResult<Option<String>>;

    /// Replace `old_value` with `new_value`
    async fn replace(&self, key: &str, old_value: &str, new_value: &str)
    -> MetadataStoreResult<bool>;
}

/// Stores that notify listeners about changes
pub trait ListenableMetadataStore: ConcurrentMetadataStore {
    fn add_listener(&self, listener: Arc<dyn MetadataStoreListener>);

    /// Returns whether the listener was registered
    fn remove_listener(&self, listener: &Arc<dyn MetadataStoreListener>) -> bool;
}
