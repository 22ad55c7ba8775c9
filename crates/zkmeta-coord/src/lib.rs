//! zkmeta Coordination - the coordination-service boundary
//!
//! This crate defines what the metadata store needs from a hierarchical
//! coordination service (ZooKeeper-style create/get/set/delete with version
//! stamps and subtree watches), a children cache that mirrors one node's
//! children from those watches, and an in-process coordinator that
//! implements the contract for tests and embedded use.

pub mod cache;
pub mod client;
pub mod memory;

pub use cache::{
    CacheEvent, CacheListener, ChildData, PathChildrenCache, PathChildrenCacheBuilder, WatchCache,
    WatchCacheBuilder,
};
pub use client::{
    ANY_VERSION, CoordResult, CoordinationClient, CoordinationError, NodeEvent, NodeEventKind,
    Stat,
};
pub use memory::{MemoryCoordinator, Operation};
