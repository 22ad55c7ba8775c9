//! Coordination client contract
//!
//! The store talks to the coordination service only through this trait.
//! Implementations own sessions, reconnection and timeouts; every call
//! either succeeds with a fresh [`Stat`] or fails with a
//! [`CoordinationError`] naming the condition.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Expected version that matches any current version on `set_data`
pub const ANY_VERSION: i32 = -1;

/// Result type for coordination calls
pub type CoordResult<T> = Result<T, CoordinationError>;

/// Failures reported by the coordination service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("no node: {0}")]
    NoNode(String),

    #[error("bad version for {path}: expected {expected}, actual {actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("connection loss")]
    ConnectionLoss,

    #[error("session expired")]
    SessionExpired,

    #[error("coordination service error: {0}")]
    Other(String),
}

impl CoordinationError {
    /// Create a generic service error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if the call may succeed when retried
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLoss)
    }
}

/// Node metadata returned with every successful read or write
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    /// Data version: 0 on create, incremented by every `set_data`
    pub version: i32,
    /// Transaction id of the last modification
    pub mzxid: i64,
}

/// Kind of change published to watchers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeEventKind {
    Created,
    DataChanged,
    Deleted,
}

/// A change to one node, as seen by a subtree watch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeEvent {
    pub kind: NodeEventKind,
    pub path: String,
    /// Node data after the change; the last data for `Deleted`
    pub data: Bytes,
    /// Node stat after the change; the last stat for `Deleted`
    pub stat: Stat,
    /// Transaction id of the change
    pub zxid: i64,
}

/// Hierarchical coordination service client
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Stat of the node, or `None` if it does not exist
    async fn exists(&self, path: &str) -> CoordResult<Option<Stat>>;

    /// Create a node; fails with `NodeExists` if present, `NoNode` if the
    /// parent is missing
    async fn create(&self, path: &str, data: Bytes) -> CoordResult<Stat>;

    /// Read node data and stat; fails with `NoNode` if absent
    async fn get_data(&self, path: &str) -> CoordResult<(Bytes, Stat)>;

    /// Overwrite node data if its version equals `expected_version`
    /// ([`ANY_VERSION`] skips the check)
    async fn set_data(&self, path: &str, data: Bytes, expected_version: i32) -> CoordResult<Stat>;

    /// Delete a node regardless of version; fails with `NoNode` if absent
    async fn delete(&self, path: &str) -> CoordResult<()>;

    /// Ensure the node and all its ancestors exist
    async fn create_containers(&self, path: &str) -> CoordResult<()>;

    /// Names of the direct children of a node
    async fn get_children(&self, path: &str) -> CoordResult<Vec<String>>;

    /// Subscribe to every change at or below `path`
    async fn watch(&self, path: &str) -> CoordResult<mpsc::UnboundedReceiver<NodeEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(CoordinationError::ConnectionLoss.is_retryable());
        assert!(!CoordinationError::SessionExpired.is_retryable());
        assert!(!CoordinationError::NoNode("/a".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = CoordinationError::BadVersion {
            path: "/a".into(),
            expected: 1,
            actual: 2,
        };
        assert_eq!(err.to_string(), "bad version for /a: expected 1, actual 2");
    }
}
