//! Metadata store backed by a hierarchical coordination service
//!
//! Each key is a child node of the configured root; the node payload is the
//! encoded value. Writes go straight to the coordination service. Reads come
//! from a children watch cache, which lags behind, so every successful local
//! write is also recorded in an overlay that wins over the cache until the
//! cache shows a version at least as new:
//!
//! ```text
//! put/put_if_absent/replace/remove --> coordination service --> overlay
//!                                              |
//!                                        watch events
//!                                              v
//! get --> watch cache --(version check)--> overlay --> value
//! ```
//!
//! One async mutex serializes every operation and the reconciliation of
//! cache events, so the overlay-versus-cache comparison is never torn.
//! Listener callbacks run while that mutex is held.

use crate::error::{MetadataStoreError, MetadataStoreResult};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::listener::{ListenerSet, MetadataStoreListener};
use crate::metadata::{ConcurrentMetadataStore, ListenableMetadataStore, MetadataStore};
use crate::overlay::OverlayMap;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zkmeta_common::{
    DEFAULT_ROOT, StoreConfig, TextEncoding, child_key, child_path, normalize_root,
};
use zkmeta_coord::{
    ANY_VERSION, CacheEvent, CacheListener, CoordResult, CoordinationClient, CoordinationError,
    PathChildrenCacheBuilder, WatchCache, WatchCacheBuilder,
};

/// State guarded by the store mutex
#[derive(Default)]
struct StoreState {
    lifecycle: LifecycleState,
    /// Outlives the cache: kept across stop/start
    overlay: OverlayMap,
    cache: Option<Arc<dyn WatchCache>>,
}

/// Listenable metadata store on a coordination service
pub struct ZkMetadataStore {
    client: Arc<dyn CoordinationClient>,
    cache_builder: Arc<dyn WatchCacheBuilder>,
    root: String,
    encoding: TextEncoding,
    state: Arc<Mutex<StoreState>>,
    listeners: Arc<ListenerSet>,
}

impl ZkMetadataStore {
    /// Create a stopped store with the default root and UTF-8 values
    pub fn new(client: Arc<dyn CoordinationClient>) -> Self {
        Self {
            client,
            cache_builder: Arc::new(PathChildrenCacheBuilder),
            root: DEFAULT_ROOT.to_string(),
            encoding: TextEncoding::default(),
            state: Arc::new(Mutex::new(StoreState::default())),
            listeners: Arc::new(ListenerSet::new()),
        }
    }

    /// Create a stopped store from configuration
    pub fn with_config(
        client: Arc<dyn CoordinationClient>,
        config: &StoreConfig,
    ) -> MetadataStoreResult<Self> {
        let validated = config.validate()?;
        let mut store = Self::new(client);
        store.root = validated.root;
        store.encoding = validated.encoding;
        Ok(store)
    }

    /// Use a different watch cache implementation
    #[must_use]
    pub fn with_cache_builder(mut self, builder: Arc<dyn WatchCacheBuilder>) -> Self {
        self.cache_builder = builder;
        self
    }

    /// Set the root node; entries become its children
    pub fn set_root(&mut self, root: &str) -> MetadataStoreResult<()> {
        self.ensure_stopped()?;
        self.root = normalize_root(root)?;
        Ok(())
    }

    /// Set the charset used for values
    pub fn set_encoding(&mut self, encoding: &str) -> MetadataStoreResult<()> {
        self.ensure_stopped()?;
        self.encoding = encoding.parse()?;
        Ok(())
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub const fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Node path holding `key`; the empty key maps to the root itself
    pub fn path_for(&self, key: &str) -> String {
        child_path(&self.root, key)
    }

    fn ensure_stopped(&self) -> MetadataStoreResult<()> {
        let state = self
            .state
            .try_lock()
            .map_err(|_| MetadataStoreError::Busy)?;
        if state.lifecycle == LifecycleState::Stopped {
            Ok(())
        } else {
            Err(MetadataStoreError::AlreadyRunning)
        }
    }

    /// Unconditional upsert
    pub async fn put(&self, key: &str, value: &str) -> MetadataStoreResult<()> {
        let path = self.path_for(key);
        let data = self.encoding.encode(value);
        let write_failed = |e| MetadataStoreError::write_failed(key, e);

        let mut state = self.state.lock().await;
        // Ask the service, not the cache: the cache may not have seen the node yet.
        let existing = self.client.exists(&path).await.map_err(write_failed)?;
        let stat = match existing {
            None => match self.client.create(&path, data.clone()).await {
                Ok(stat) => stat,
                Err(CoordinationError::NodeExists(_)) => self
                    .client
                    .set_data(&path, data, ANY_VERSION)
                    .await
                    .map_err(write_failed)?,
                Err(e) => return Err(write_failed(e)),
            },
            Some(_) => self
                .client
                .set_data(&path, data, ANY_VERSION)
                .await
                .map_err(write_failed)?,
        };
        state.overlay.record_write(key, value, stat.version);
        Ok(())
    }

    /// Create the entry only if absent; returns the existing value otherwise
    pub async fn put_if_absent(&self, key: &str, value: &str) -> MetadataStoreResult<Option<String>> {
        let path = self.path_for(key);
        let mut state = self.state.lock().await;
        match self.client.create(&path, self.encoding.encode(value)).await {
            Ok(stat) => {
                state.overlay.record_write(key, value, stat.version);
                Ok(None)
            }
            Err(CoordinationError::NodeExists(_)) => match self.client.get_data(&path).await {
                Ok((bytes, _)) => Ok(Some(self.encoding.decode(&bytes))),
                Err(CoordinationError::NoNode(_)) => Ok(None),
                Err(e) => Err(MetadataStoreError::write_failed(key, e)),
            },
            Err(e) => Err(MetadataStoreError::write_failed(key, e)),
        }
    }

    /// Compare-and-swap on the current value.
    ///
    /// Returns `true` whenever the node exists, even if `old_value` did not
    /// match and nothing was written. Returns `false` when the node is
    /// missing or a concurrent write changed its version first.
    pub async fn replace(
        &self,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> MetadataStoreResult<bool> {
        let path = self.path_for(key);
        let mut state = self.state.lock().await;
        let (bytes, stat) = match self.client.get_data(&path).await {
            Ok(current) => current,
            Err(CoordinationError::NoNode(_)) => return Ok(false),
            Err(e) => return Err(MetadataStoreError::cas_failed(key, e)),
        };
        if self.encoding.decode(&bytes) == old_value {
            let data = self.encoding.encode(new_value);
            match self.client.set_data(&path, data, stat.version).await {
                Ok(new_stat) => state.overlay.record_write(key, new_value, new_stat.version),
                Err(CoordinationError::NoNode(_) | CoordinationError::BadVersion { .. }) => {
                    debug!("Lost replace race for key '{}'", key);
                    return Ok(false);
                }
                Err(e) => return Err(MetadataStoreError::cas_failed(key, e)),
            }
        }
        Ok(true)
    }

    /// Delete the entry, returning its previous value
    pub async fn remove(&self, key: &str) -> MetadataStoreResult<Option<String>> {
        let path = self.path_for(key);
        let mut state = self.state.lock().await;
        let (bytes, stat) = match self.client.get_data(&path).await {
            Ok(current) => current,
            Err(CoordinationError::NoNode(_)) => return Ok(None),
            Err(e) => return Err(MetadataStoreError::write_failed(key, e)),
        };
        match self.client.delete(&path).await {
            Ok(()) => {}
            Err(CoordinationError::NoNode(_)) => return Ok(None),
            Err(e) => return Err(MetadataStoreError::write_failed(key, e)),
        }
        // The tombstone outranks whatever version the cache still holds.
        state.overlay.record_tombstone(key, stat.mzxid);
        Ok(Some(self.encoding.decode(&bytes)))
    }

    /// Read a value; requires a running store
    pub async fn get(&self, key: &str) -> MetadataStoreResult<Option<String>> {
        let path = self.path_for(key);
        let state = self.state.lock().await;
        let cache = match (&state.lifecycle, &state.cache) {
            (LifecycleState::Running, Some(cache)) => cache,
            _ => return Err(MetadataStoreError::NotStarted),
        };
        let cached = cache.current_data(&path);
        if let Some(entry) = state
            .overlay
            .masking(key, cached.as_ref().map(|c| c.stat.version))
        {
            debug!(
                "Serving key '{}' from overlay (version {})",
                key, entry.version
            );
            return Ok(entry.value.clone());
        }
        Ok(cached.map(|c| self.encoding.decode(&c.data)))
    }

    pub fn add_listener(&self, listener: Arc<dyn MetadataStoreListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn MetadataStoreListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Ensure the root exists and start the watch cache; no-op when running
    pub async fn start(&self) -> MetadataStoreResult<()> {
        let mut state = self.state.lock().await;
        if state.lifecycle == LifecycleState::Running {
            return Ok(());
        }
        state.lifecycle = LifecycleState::Starting;
        match self.open_cache().await {
            Ok(cache) => {
                // Deletions whose events were never delivered are already
                // reflected in the freshly primed cache.
                let settled = state.overlay.settle_tombstones(|key| {
                    cache
                        .current_data(&self.path_for(key))
                        .map(|child| child.stat.mzxid)
                });
                if settled > 0 {
                    debug!("Settled {} tombstones on start", settled);
                }
                state.cache = Some(cache);
                state.lifecycle = LifecycleState::Running;
                info!("Metadata store started at {}", self.root);
                Ok(())
            }
            Err(e) => {
                state.lifecycle = LifecycleState::Stopped;
                Err(MetadataStoreError::StartFailed(e))
            }
        }
    }

    async fn open_cache(&self) -> CoordResult<Arc<dyn WatchCache>> {
        self.client.create_containers(&self.root).await?;
        let cache = self
            .cache_builder
            .build(Arc::clone(&self.client), &self.root);
        cache.add_listener(Arc::new(Reconciler {
            state: Arc::downgrade(&self.state),
            listeners: Arc::clone(&self.listeners),
            root: self.root.clone(),
            encoding: self.encoding,
        }));
        if let Err(e) = cache.start().await {
            if let Err(close_err) = cache.close().await {
                warn!("Failed to close watch cache for {}: {}", self.root, close_err);
            }
            return Err(e);
        }
        Ok(cache)
    }

    /// Close the watch cache; no-op when not running. The overlay is kept.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if state.lifecycle != LifecycleState::Running {
            return;
        }
        state.lifecycle = LifecycleState::Stopping;
        if let Some(cache) = state.cache.take() {
            if let Err(e) = cache.close().await {
                warn!("Failed to close watch cache for {}: {}", self.root, e);
            }
        }
        state.lifecycle = LifecycleState::Stopped;
        info!("Metadata store stopped at {}", self.root);
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.lifecycle == LifecycleState::Running
    }
}

/// Cache listener that retires overlay entries and notifies store listeners
struct Reconciler {
    state: Weak<Mutex<StoreState>>,
    listeners: Arc<ListenerSet>,
    root: String,
    encoding: TextEncoding,
}

#[async_trait]
impl CacheListener for Reconciler {
    async fn child_event(&self, event: CacheEvent) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let data = event.data();
        let Some(key) = child_key(&self.root, &data.path) else {
            warn!("Ignoring cache event for {}", data.path);
            return;
        };
        let value = self.encoding.decode(&data.data);

        let mut state = state.lock().await;
        match &event {
            CacheEvent::ChildAdded(child) => {
                if state.overlay.supersede(key, child.stat.mzxid) {
                    debug!("Key '{}' recreated after local delete", key);
                } else if state.overlay.confirm(key, child.stat.version) {
                    debug!("Cache caught up with key '{}'", key);
                }
                self.listeners.dispatch_add(key, &value);
            }
            CacheEvent::ChildUpdated(child) => {
                if state.overlay.confirm(key, child.stat.version) {
                    debug!("Cache caught up with key '{}'", key);
                }
                self.listeners.dispatch_update(key, &value);
            }
            CacheEvent::ChildRemoved(_) => {
                state.overlay.clear(key);
                self.listeners.dispatch_remove(key, &value);
            }
        }
    }
}

#[async_trait]
impl MetadataStore for ZkMetadataStore {
    async fn put(&self, key: &str, value: &str) -> MetadataStoreResult<()> {
        Self::put(self, key, value).await
    }

    async fn get(&self, key: &str) -> MetadataStoreResult<Option<String>> {
        Self::get(self, key).await
    }

    async fn remove(&self, key: &str) -> MetadataStoreResult<Option<String>> {
        Self::remove(self, key).await
    }
}

#[async_trait]
impl ConcurrentMetadataStore for ZkMetadataStore {
    async fn put_if_absent(&self, key: &str, value: &str) -> MetadataStoreResult<Option<String>> {
        Self::put_if_absent(self, key, value).await
    }

    async fn replace(
        &self,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> MetadataStoreResult<bool> {
        Self::replace(self, key, old_value, new_value).await
    }
}

impl ListenableMetadataStore for ZkMetadataStore {
    fn add_listener(&self, listener: Arc<dyn MetadataStoreListener>) {
        Self::add_listener(self, listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn MetadataStoreListener>) -> bool {
        Self::remove_listener(self, listener)
    }
}

#[async_trait]
impl Lifecycle for ZkMetadataStore {
    async fn start(&self) -> MetadataStoreResult<()> {
        Self::start(self).await
    }

    async fn stop(&self) {
        Self::stop(self).await;
    }

    async fn is_running(&self) -> bool {
        Self::is_running(self).await
    }
}
