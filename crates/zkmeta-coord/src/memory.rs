//! In-process coordination service
//!
//! [`MemoryCoordinator`] keeps a node tree in memory and follows ZooKeeper
//! semantics for versions, parents and deletes. Watch delivery can be held
//! back to simulate propagation delay, and single calls can be made to fail
//! to simulate network faults and lost races.

use crate::client::{
    ANY_VERSION, CoordResult, CoordinationClient, CoordinationError, NodeEvent, NodeEventKind,
    Stat,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tracing::debug;
use zkmeta_common::parent_path;

/// Client operations that can be made to fail with [`MemoryCoordinator::fail_next`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Exists,
    Create,
    GetData,
    SetData,
    Delete,
    CreateContainers,
    GetChildren,
    Watch,
}

struct Node {
    data: Bytes,
    stat: Stat,
}

struct Watcher {
    path: String,
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl Watcher {
    fn covers(&self, path: &str) -> bool {
        self.path == "/"
            || path == self.path
            || path
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

struct Tree {
    nodes: BTreeMap<String, Node>,
    zxid: i64,
    watchers: Vec<Watcher>,
    /// Events buffered while watch delivery is held
    held: Option<Vec<NodeEvent>>,
    faults: HashMap<Operation, CoordinationError>,
    /// Next `exists` reports every node absent
    stale_exists: bool,
}

impl Tree {
    fn take_fault(&mut self, op: Operation) -> CoordResult<()> {
        match self.faults.remove(&op) {
            Some(err) => {
                debug!("Injected {:?} failure: {}", op, err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn has_children(&self, path: &str) -> bool {
        self.nodes.keys().any(|k| parent_path(k) == Some(path))
    }

    fn insert(&mut self, path: &str, data: Bytes) -> Stat {
        let zxid = self.next_zxid();
        let stat = Stat {
            version: 0,
            mzxid: zxid,
        };
        self.nodes.insert(
            path.to_string(),
            Node {
                data: data.clone(),
                stat,
            },
        );
        self.publish(NodeEvent {
            kind: NodeEventKind::Created,
            path: path.to_string(),
            data,
            stat,
            zxid,
        });
        stat
    }

    fn publish(&mut self, event: NodeEvent) {
        if let Some(held) = self.held.as_mut() {
            held.push(event);
        } else {
            self.deliver(&event);
        }
    }

    fn deliver(&mut self, event: &NodeEvent) {
        self.watchers.retain(|w| {
            if w.covers(&event.path) {
                w.tx.send(event.clone()).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
    }
}

fn validate_path(path: &str) -> CoordResult<()> {
    let valid = path.starts_with('/')
        && (path == "/" || (!path.ends_with('/') && !path.contains("//")));
    if valid {
        Ok(())
    } else {
        Err(CoordinationError::InvalidPath(path.to_string()))
    }
}

/// In-memory coordination service with ZooKeeper-style semantics
pub struct MemoryCoordinator {
    tree: Mutex<Tree>,
}

impl MemoryCoordinator {
    /// Create an empty tree containing only `/`
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Bytes::new(),
                stat: Stat::default(),
            },
        );
        Self {
            tree: Mutex::new(Tree {
                nodes,
                zxid: 0,
                watchers: Vec::new(),
                held: None,
                faults: HashMap::new(),
                stale_exists: false,
            }),
        }
    }

    /// Buffer watch events until [`release_watches`](Self::release_watches)
    pub fn hold_watches(&self) {
        let mut tree = self.tree.lock();
        if tree.held.is_none() {
            tree.held = Some(Vec::new());
        }
    }

    /// Deliver buffered watch events in order and resume live delivery
    pub fn release_watches(&self) {
        let mut tree = self.tree.lock();
        if let Some(held) = tree.held.take() {
            debug!("Releasing {} held watch events", held.len());
            for event in &held {
                tree.deliver(event);
            }
        }
    }

    /// Make the next call of `op` fail once with `err`
    pub fn fail_next(&self, op: Operation, err: CoordinationError) {
        self.tree.lock().faults.insert(op, err);
    }

    /// Make the next `exists` call report the node as absent, as a read
    /// served before a concurrent create would
    pub fn stale_next_exists(&self) {
        self.tree.lock().stale_exists = true;
    }

    /// Number of nodes in the tree, including `/`
    pub fn node_count(&self) -> usize {
        self.tree.lock().nodes.len()
    }
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordinator {
    async fn exists(&self, path: &str) -> CoordResult<Option<Stat>> {
        let mut tree = self.tree.lock();
        tree.take_fault(Operation::Exists)?;
        validate_path(path)?;
        if std::mem::take(&mut tree.stale_exists) {
            debug!("Reporting {} absent for a stale exists", path);
            return Ok(None);
        }
        Ok(tree.nodes.get(path).map(|n| n.stat))
    }

    async fn create(&self, path: &str, data: Bytes) -> CoordResult<Stat> {
        let mut tree = self.tree.lock();
        tree.take_fault(Operation::Create)?;
        validate_path(path)?;
        if tree.nodes.contains_key(path) {
            return Err(CoordinationError::NodeExists(path.to_string()));
        }
        let parent = parent_path(path).unwrap_or("/");
        if !tree.nodes.contains_key(parent) {
            return Err(CoordinationError::NoNode(parent.to_string()));
        }
        Ok(tree.insert(path, data))
    }

    async fn get_data(&self, path: &str) -> CoordResult<(Bytes, Stat)> {
        let mut tree = self.tree.lock();
        tree.take_fault(Operation::GetData)?;
        validate_path(path)?;
        tree.nodes
            .get(path)
            .map(|n| (n.data.clone(), n.stat))
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))
    }

    async fn set_data(&self, path: &str, data: Bytes, expected_version: i32) -> CoordResult<Stat> {
        let mut tree = self.tree.lock();
        tree.take_fault(Operation::SetData)?;
        validate_path(path)?;
        let zxid = tree.zxid + 1;
        let node = tree
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if expected_version != ANY_VERSION && expected_version != node.stat.version {
            return Err(CoordinationError::BadVersion {
                path: path.to_string(),
                expected: expected_version,
                actual: node.stat.version,
            });
        }
        node.data = data.clone();
        node.stat = Stat {
            version: node.stat.version + 1,
            mzxid: zxid,
        };
        let stat = node.stat;
        tree.zxid = zxid;
        tree.publish(NodeEvent {
            kind: NodeEventKind::DataChanged,
            path: path.to_string(),
            data,
            stat,
            zxid,
        });
        Ok(stat)
    }

    async fn delete(&self, path: &str) -> CoordResult<()> {
        let mut tree = self.tree.lock();
        tree.take_fault(Operation::Delete)?;
        validate_path(path)?;
        if path == "/" {
            return Err(CoordinationError::InvalidPath(path.to_string()));
        }
        if !tree.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        if tree.has_children(path) {
            return Err(CoordinationError::NotEmpty(path.to_string()));
        }
        let zxid = tree.next_zxid();
        if let Some(node) = tree.nodes.remove(path) {
            tree.publish(NodeEvent {
                kind: NodeEventKind::Deleted,
                path: path.to_string(),
                data: node.data,
                stat: node.stat,
                zxid,
            });
        }
        Ok(())
    }

    async fn create_containers(&self, path: &str) -> CoordResult<()> {
        let mut tree = self.tree.lock();
        tree.take_fault(Operation::CreateContainers)?;
        validate_path(path)?;
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            if !tree.nodes.contains_key(&current) {
                tree.insert(&current, Bytes::new());
            }
        }
        Ok(())
    }

    async fn get_children(&self, path: &str) -> CoordResult<Vec<String>> {
        let mut tree = self.tree.lock();
        tree.take_fault(Operation::GetChildren)?;
        validate_path(path)?;
        if !tree.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        Ok(tree
            .nodes
            .keys()
            .filter(|k| k.as_str() != "/" && parent_path(k) == Some(path))
            .filter_map(|k| k.rsplit('/').next().map(str::to_string))
            .collect())
    }

    async fn watch(&self, path: &str) -> CoordResult<mpsc::UnboundedReceiver<NodeEvent>> {
        let mut tree = self.tree.lock();
        tree.take_fault(Operation::Watch)?;
        validate_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        tree.watchers.push(Watcher {
            path: path.to_string(),
            tx,
        });
        Ok(rx)
    }
}
