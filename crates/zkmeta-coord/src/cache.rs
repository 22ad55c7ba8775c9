//! Children watch cache
//!
//! A [`WatchCache`] mirrors the direct children of one node and tells its
//! listeners about added, updated and removed children. Delivery is
//! asynchronous: the mirror lags the coordination service by however long
//! the watch takes to arrive.

use crate::client::{CoordResult, CoordinationClient, CoordinationError, NodeEvent, NodeEventKind, Stat};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zkmeta_common::{child_key, child_path};

/// Cached copy of one child node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildData {
    pub path: String,
    pub data: Bytes,
    pub stat: Stat,
}

/// Change to the cached children
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    ChildAdded(ChildData),
    ChildUpdated(ChildData),
    /// Carries the data the child had before it was deleted
    ChildRemoved(ChildData),
}

impl CacheEvent {
    /// Child the event is about
    #[must_use]
    pub const fn data(&self) -> &ChildData {
        match self {
            Self::ChildAdded(d) | Self::ChildUpdated(d) | Self::ChildRemoved(d) => d,
        }
    }
}

/// Receiver of cache events
#[async_trait]
pub trait CacheListener: Send + Sync {
    async fn child_event(&self, event: CacheEvent);
}

/// Local mirror of one node's children
#[async_trait]
pub trait WatchCache: Send + Sync {
    /// Cached data for a child path
    fn current_data(&self, path: &str) -> Option<ChildData>;

    /// Register a listener for subsequent events
    fn add_listener(&self, listener: Arc<dyn CacheListener>);

    /// Prime the mirror and begin applying watch events
    async fn start(&self) -> CoordResult<()>;

    /// Stop applying events and drop the mirror
    async fn close(&self) -> CoordResult<()>;
}

/// Factory for watch caches rooted at a path
pub trait WatchCacheBuilder: Send + Sync {
    fn build(&self, client: Arc<dyn CoordinationClient>, root: &str) -> Arc<dyn WatchCache>;
}

/// Builds [`PathChildrenCache`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct PathChildrenCacheBuilder;

impl WatchCacheBuilder for PathChildrenCacheBuilder {
    fn build(&self, client: Arc<dyn CoordinationClient>, root: &str) -> Arc<dyn WatchCache> {
        Arc::new(PathChildrenCache::new(client, root))
    }
}

struct Shared {
    root: String,
    children: RwLock<HashMap<String, ChildData>>,
    listeners: RwLock<Vec<Arc<dyn CacheListener>>>,
}

impl Shared {
    /// Apply one watch event to the mirror, returning the cache event to
    /// publish. Events the mirror already reflects are dropped.
    fn apply(&self, event: NodeEvent) -> Option<CacheEvent> {
        child_key(&self.root, &event.path)?;

        let mut children = self.children.write();
        let existing_zxid = children.get(&event.path).map(|c| c.stat.mzxid);
        match event.kind {
            NodeEventKind::Created | NodeEventKind::DataChanged => {
                if existing_zxid.is_some_and(|z| z >= event.stat.mzxid) {
                    return None;
                }
                let data = ChildData {
                    path: event.path.clone(),
                    data: event.data,
                    stat: event.stat,
                };
                children.insert(event.path, data.clone());
                Some(if existing_zxid.is_some() {
                    CacheEvent::ChildUpdated(data)
                } else {
                    CacheEvent::ChildAdded(data)
                })
            }
            NodeEventKind::Deleted => {
                if !existing_zxid.is_some_and(|z| z < event.zxid) {
                    return None;
                }
                children.remove(&event.path);
                Some(CacheEvent::ChildRemoved(ChildData {
                    path: event.path,
                    data: event.data,
                    stat: event.stat,
                }))
            }
        }
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<NodeEvent>) {
        while let Some(event) = rx.recv().await {
            let Some(cache_event) = self.apply(event) else {
                continue;
            };
            let listeners = self.listeners.read().clone();
            for listener in listeners {
                listener.child_event(cache_event.clone()).await;
            }
        }
        debug!("Watch stream for {} ended", self.root);
    }
}

/// Watch cache over the direct children of a root node.
///
/// `start` primes the mirror without emitting events, then one task applies
/// watch events and awaits each listener in registration order.
pub struct PathChildrenCache {
    client: Arc<dyn CoordinationClient>,
    shared: Arc<Shared>,
    started: AtomicBool,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PathChildrenCache {
    pub fn new(client: Arc<dyn CoordinationClient>, root: &str) -> Self {
        Self {
            client,
            shared: Arc::new(Shared {
                root: root.to_string(),
                children: RwLock::new(HashMap::new()),
                listeners: RwLock::new(Vec::new()),
            }),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Root whose children are mirrored
    pub fn root(&self) -> &str {
        &self.shared.root
    }

    /// Number of cached children
    pub fn len(&self) -> usize {
        self.shared.children.read().len()
    }

    /// Check if no children are cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn prime(&self) -> CoordResult<mpsc::UnboundedReceiver<NodeEvent>> {
        let root = self.shared.root.as_str();
        let rx = self.client.watch(root).await?;
        let mut primed = HashMap::new();
        for name in self.client.get_children(root).await? {
            let path = child_path(root, &name);
            match self.client.get_data(&path).await {
                Ok((data, stat)) => {
                    primed.insert(path.clone(), ChildData { path, data, stat });
                }
                Err(CoordinationError::NoNode(_)) => {}
                Err(e) => return Err(e),
            }
        }
        debug!("Primed children cache for {} with {} nodes", root, primed.len());
        *self.shared.children.write() = primed;
        Ok(rx)
    }
}

#[async_trait]
impl WatchCache for PathChildrenCache {
    fn current_data(&self, path: &str) -> Option<ChildData> {
        self.shared.children.read().get(path).cloned()
    }

    fn add_listener(&self, listener: Arc<dyn CacheListener>) {
        self.shared.listeners.write().push(listener);
    }

    async fn start(&self) -> CoordResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordinationError::other(format!(
                "children cache for {} is closed",
                self.shared.root
            )));
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let rx = match self.prime().await {
            Ok(rx) => rx,
            Err(e) => {
                self.started.store(false, Ordering::Release);
                return Err(e);
            }
        };
        let handle = tokio::spawn(Arc::clone(&self.shared).run(rx));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn close(&self) -> CoordResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Abort rather than join: the task may be waiting inside a listener.
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.shared.children.write().clear();
        self.shared.listeners.write().clear();
        debug!("Closed children cache for {}", self.shared.root);
        Ok(())
    }
}

impl Drop for PathChildrenCache {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            if !handle.is_finished() {
                warn!("Children cache for {} dropped without close", self.shared.root);
            }
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ANY_VERSION;
    use crate::memory::MemoryCoordinator;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<CacheEvent>>,
    }

    #[async_trait]
    impl CacheListener for Recorder {
        async fn child_event(&self, event: CacheEvent) {
            self.events.lock().push(event);
        }
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn started_cache(coord: &Arc<MemoryCoordinator>) -> (PathChildrenCache, Arc<Recorder>) {
        coord.create_containers("/root").await.unwrap();
        let cache = PathChildrenCache::new(coord.clone(), "/root");
        let recorder = Arc::new(Recorder::default());
        cache.add_listener(recorder.clone());
        cache.start().await.unwrap();
        (cache, recorder)
    }

    #[tokio::test]
    async fn test_prime_does_not_emit() {
        let coord = Arc::new(MemoryCoordinator::new());
        coord.create_containers("/root").await.unwrap();
        coord.create("/root/a", Bytes::from_static(b"1")).await.unwrap();

        let (cache, recorder) = started_cache(&coord).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.current_data("/root/a").unwrap().data.as_ref(),
            b"1"
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(recorder.events.lock().is_empty());
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_follow_changes() {
        let coord = Arc::new(MemoryCoordinator::new());
        let (cache, recorder) = started_cache(&coord).await;

        coord.create("/root/a", Bytes::from_static(b"1")).await.unwrap();
        coord
            .set_data("/root/a", Bytes::from_static(b"2"), ANY_VERSION)
            .await
            .unwrap();
        coord.delete("/root/a").await.unwrap();

        eventually(|| recorder.events.lock().len() == 3).await;
        let events = recorder.events.lock().clone();
        assert!(matches!(&events[0], CacheEvent::ChildAdded(d) if d.data.as_ref() == b"1"));
        assert!(matches!(&events[1], CacheEvent::ChildUpdated(d) if d.stat.version == 1));
        assert!(matches!(&events[2], CacheEvent::ChildRemoved(d) if d.data.as_ref() == b"2"));
        assert!(cache.is_empty());
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_ignores_root_and_grandchildren() {
        let coord = Arc::new(MemoryCoordinator::new());
        let (cache, recorder) = started_cache(&coord).await;

        coord
            .set_data("/root", Bytes::from_static(b"x"), ANY_VERSION)
            .await
            .unwrap();
        coord.create("/root/a", Bytes::new()).await.unwrap();
        coord.create("/root/a/nested", Bytes::new()).await.unwrap();
        coord.create("/root/b", Bytes::new()).await.unwrap();

        eventually(|| recorder.events.lock().len() == 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let paths: Vec<String> = recorder
            .events
            .lock()
            .iter()
            .map(|e| e.data().path.clone())
            .collect();
        assert_eq!(paths, vec!["/root/a".to_string(), "/root/b".to_string()]);
        assert!(cache.current_data("/root").is_none());
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let coord = Arc::new(MemoryCoordinator::new());
        let (cache, recorder) = started_cache(&coord).await;
        cache.close().await.unwrap();
        cache.close().await.unwrap();

        coord.create("/root/a", Bytes::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(recorder.events.lock().is_empty());
        assert!(cache.current_data("/root/a").is_none());
        assert!(cache.start().await.is_err());
    }

    #[tokio::test]
    async fn test_start_fails_without_root() {
        let coord = Arc::new(MemoryCoordinator::new());
        let cache = PathChildrenCache::new(coord, "/missing");
        assert_eq!(
            cache.start().await,
            Err(CoordinationError::NoNode("/missing".into()))
        );
    }
}
