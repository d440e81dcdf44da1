// # Execution History
//
// Implementations of the ExecutionLog trait plus the task that feeds one from
// the scheduler's completion channel.

pub mod file;
pub mod memory;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::HistoryConfig;
use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::traits::{ExecutionEntry, ExecutionLog};

pub use file::FileExecutionLog;
pub use memory::MemoryExecutionLog;

/// Open the execution log described by `config`
///
/// Returns `None` when history is disabled.
pub async fn open(config: &HistoryConfig) -> Result<Option<Arc<dyn ExecutionLog>>> {
    let log: Arc<dyn ExecutionLog> = match config {
        HistoryConfig::Memory => Arc::new(MemoryExecutionLog::new()),
        HistoryConfig::File { path } => Arc::new(FileExecutionLog::new(path).await?),
        HistoryConfig::Disabled => return Ok(None),
    };
    Ok(Some(log))
}

/// Record every completed host change into `log`
///
/// Subscribes to `scheduler` and runs until the scheduler and all its clones
/// are dropped, or the returned handle is aborted. Jobs that do not change a
/// host are ignored. Log failures are reported and skipped.
pub fn spawn_recorder(
    scheduler: &Scheduler,
    log: Arc<dyn ExecutionLog>,
    dry_run: bool,
) -> JoinHandle<()> {
    let mut completions = scheduler.subscribe();

    tokio::spawn(async move {
        while let Some(record) = completions.recv().await {
            let Some(entry) = ExecutionEntry::from_job(&record, dry_run) else {
                continue;
            };

            tracing::debug!(
                "[History] {} {} on {}",
                entry.operation_type,
                entry.hostname,
                entry.target.as_deref().unwrap_or("-")
            );

            if let Err(e) = log.record(entry).await {
                tracing::error!("[History] Failed to record job \"{}\": {}", record.job_id, e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{JobMeta, JobRequest, JobType, META_CHANGE_TYPE, META_HOST_NAME};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_recorder_logs_completed_changes_only() {
        let scheduler = Scheduler::new();
        let log = Arc::new(MemoryExecutionLog::new());
        let _recorder = spawn_recorder(&scheduler, log.clone(), true);

        let mut meta = JobMeta::new();
        meta.insert(META_HOST_NAME.to_string(), "foo.example".to_string());
        meta.insert(META_CHANGE_TYPE.to_string(), "add".to_string());

        scheduler.schedule_job(
            JobRequest::new(JobType::ApplyChanges, "apply", Duration::from_secs(1)).with_meta(meta),
            || async { Ok(()) },
        );
        scheduler.schedule_job(
            JobRequest::new(JobType::SyncResources, "sync", Duration::from_secs(1)),
            || async { Ok(()) },
        );

        tokio::time::sleep(Duration::from_secs(2)).await;

        let entries = log.list(1, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hostname, "foo.example");
        assert!(entries[0].dry_run);
    }

    #[tokio::test]
    async fn test_open_disabled_history() {
        assert!(open(&HistoryConfig::Disabled).await.unwrap().is_none());
        assert!(open(&HistoryConfig::Memory).await.unwrap().is_some());
    }
}
