// # Execution Log Trait
//
// Defines the interface for recording which host changes were carried out.
//
// ## Purpose
//
// The scheduler forgets a job the moment it fires. The execution log keeps a
// bounded-cost trail of completed changes for operators:
// - Which hostname was added or removed
// - Which target it was written to
// - Whether the run was a dry run
//
// ## Implementations
//
// - In-memory: `history::MemoryExecutionLog`
// - File-based: `history::FileExecutionLog` (JSON, crash-safe writes)
//
// ## Usage
//
// ```rust,ignore
// use hostsync_core::history::{ExecutionEntry, MemoryExecutionLog};
// use hostsync_core::ExecutionLog;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let log = MemoryExecutionLog::new();
//
//     log.record(entry).await?;
//
//     // Newest first
//     let first_page = log.list(1, 20).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::host::ChangeType;
use crate::scheduler::{JobRecord, JobType};

/// One completed host change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEntry {
    /// Id of the job that carried out the change
    pub job_id: String,
    /// Tag of that job
    pub job_type: JobType,
    /// Add or remove
    pub operation_type: ChangeType,
    /// Hostname that was changed
    pub hostname: String,
    /// Target the change was written to (absent for push jobs spanning targets)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Whether the target was running in dry-run mode
    pub dry_run: bool,
}

impl ExecutionEntry {
    /// Build an entry from a completed job
    ///
    /// Returns `None` for sync passes, which do not change a host, and for
    /// jobs whose metadata lacks a hostname or direction.
    pub fn from_job(record: &JobRecord, dry_run: bool) -> Option<Self> {
        let operation_type = match record.job_type {
            JobType::ApplyChanges => record.change_type()?,
            JobType::AddDnsRecord => ChangeType::Add,
            JobType::RemoveDnsRecord => ChangeType::Remove,
            JobType::SyncResources => return None,
        };

        Some(Self {
            job_id: record.job_id.clone(),
            job_type: record.job_type,
            operation_type,
            hostname: record.host_name()?.to_string(),
            target: record.target().map(str::to_string),
            timestamp: Utc::now(),
            dry_run,
        })
    }
}

/// Trait for execution log implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Cache entries in memory (with explicit flush)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn background tasks (the recorder task is owned by `history::spawn_recorder`)
/// - ❌ Influence scheduling or reconciliation
///
/// A failing log never fails a job: the recorder logs the error and moves on.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    /// Append an entry
    async fn record(&self, entry: ExecutionEntry) -> Result<(), crate::Error>;

    /// One page of entries, newest first
    ///
    /// # Parameters
    ///
    /// - `page`: 1-based page number (0 is treated as 1)
    /// - `page_size`: entries per page; 0 yields an empty page
    async fn list(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<ExecutionEntry>, crate::Error>;

    /// Total number of entries
    async fn count(&self) -> Result<usize, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Newest-first paging over an oldest-first slice
pub(crate) fn page_newest_first(
    entries: &[ExecutionEntry],
    page: usize,
    page_size: usize,
) -> Vec<ExecutionEntry> {
    let skip = page.max(1).saturating_sub(1).saturating_mul(page_size);
    entries
        .iter()
        .rev()
        .skip(skip)
        .take(page_size)
        .cloned()
        .collect()
}
