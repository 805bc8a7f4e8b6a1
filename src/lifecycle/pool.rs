//! Dependent resource pools drained after the router.

use async_trait::async_trait;

use crate::error::BoxError;

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStat {
    pub open: u64,
    pub in_use: u64,
    pub idle: u64,
}

/// A pool of connections to some backing service (database, cache, ...).
#[async_trait]
pub trait ResourcePool: Send + Sync {
    /// Liveness probe; a failed ping skips waiting and closes directly.
    async fn ping(&self) -> Result<(), BoxError>;

    fn stat(&self) -> PoolStat;

    /// Release every connection. Called once, after in-use reaches zero or
    /// the drain deadline passes.
    async fn close(&self) -> Result<(), BoxError>;
}
