//! Start/stop contract for stores that hold live resources

use crate::error::MetadataStoreResult;
use async_trait::async_trait;
use std::fmt;

/// Lifecycle states of a store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Idempotent start/stop
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Acquire resources; no-op when already running
    async fn start(&self) -> MetadataStoreResult<()>;

    /// Release resources; no-op when not running
    async fn stop(&self);

    async fn is_running(&self) -> bool;
}
