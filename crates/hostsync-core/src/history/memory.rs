// # Memory Execution Log
//
// In-memory implementation of ExecutionLog.
//
// ## Crash Behavior
//
// - All history is lost on restart/crash
// - Nothing about reconciliation depends on it, so a restart is harmless
//
// ## When to Use
//
// - Testing environments
// - Deployments that only need recent history while the daemon is up

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::execution_log::{ExecutionEntry, ExecutionLog, page_newest_first};

/// Default number of entries kept
const DEFAULT_CAPACITY: usize = 10_000;

/// In-memory execution log
///
/// Entries are kept oldest first in a vector protected by a RwLock. When the
/// capacity is reached the oldest entry is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use hostsync_core::history::MemoryExecutionLog;
/// use hostsync_core::ExecutionLog;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let log = MemoryExecutionLog::new();
///     assert_eq!(log.count().await?, 0);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryExecutionLog {
    inner: Arc<RwLock<Vec<ExecutionEntry>>>,
    capacity: usize,
}

impl MemoryExecutionLog {
    /// Create an empty log with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty log keeping at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// Remove all entries
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

impl Default for MemoryExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionLog for MemoryExecutionLog {
    async fn record(&self, entry: ExecutionEntry) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if guard.len() >= self.capacity {
            let overflow = guard.len() + 1 - self.capacity;
            guard.drain(..overflow);
        }
        guard.push(entry);
        Ok(())
    }

    async fn list(&self, page: usize, page_size: usize) -> Result<Vec<ExecutionEntry>, Error> {
        let guard = self.inner.read().await;
        Ok(page_newest_first(&guard, page, page_size))
    }

    async fn count(&self) -> Result<usize, Error> {
        Ok(self.inner.read().await.len())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
