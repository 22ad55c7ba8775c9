//! zkmeta Store - listenable metadata store on a coordination service
//!
//! Entries live as children of a root node. Reads are served from a watch
//! cache that lags the service; an overlay of this process's own writes
//! masks the lag so a caller never reads past its own last write.

pub mod error;
pub mod lifecycle;
pub mod listener;
pub mod metadata;
mod overlay;
pub mod simple;
pub mod zookeeper;

// Re-exports
pub use error::{MetadataStoreError, MetadataStoreResult};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use listener::{ListenerSet, MetadataStoreListener};
pub use metadata::{ConcurrentMetadataStore, ListenableMetadataStore, MetadataStore};
pub use simple::SimpleMetadataStore;
pub use zookeeper::ZkMetadataStore;
