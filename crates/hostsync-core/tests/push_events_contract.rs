//! Contract Test: Provider Push Notifications
//!
//! Constraints verified:
//! - A push add cancels a pending removal of the same hostname, whether a push
//!   event or a sync pass scheduled it
//! - Repeated push events restart the settle window instead of stacking
//! - Push removals resolve the record from the target's cache when no id is given
//! - A push removal with nothing to remove is skipped: it touches neither the
//!   target nor the execution history
//! - Provider streams drive either full passes or direct push jobs
//!
//! If this test fails, provider notifications can race the settle windows.

mod common;

use common::*;
use hostsync_core::config::EventMode;
use hostsync_core::host::{ChangeType, Host, HostChange};
use hostsync_core::scheduler::JobType;
use hostsync_core::{ExecutionLog, MemoryExecutionLog, history};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn push_add_cancels_pending_push_removal() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &["flappy.example"]);
    let (operations, scheduler) = operations(&provider, &target);

    operations.schedule_delete_dns_record("flappy.example", None);
    tokio::time::sleep(Duration::from_secs(30)).await;
    operations.schedule_add_dns_record("flappy.example");

    let jobs = scheduler.get_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type, JobType::AddDnsRecord);
    assert_eq!(jobs[0].job_id, "target::flappy.example");

    tokio::time::sleep(REMOVE_DELAY * 2).await;

    let applied = target.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0][0].change_type, ChangeType::Add);
}

#[tokio::test(start_paused = true)]
async fn push_add_cancels_pending_sync_removal() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &["app.example"]);
    let (operations, scheduler) = operations(&provider, &target);

    // Container stopped: the pass schedules a removal
    tokio_test::assert_ok!(operations.sync_resources().await);
    assert_eq!(scheduler.get_jobs()[0].job_type, JobType::ApplyChanges);

    // Container restarted before the removal ran
    operations.schedule_add_dns_record("app.example");

    let jobs = scheduler.get_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type, JobType::AddDnsRecord);

    tokio::time::sleep(REMOVE_DELAY * 2).await;

    let applied = target.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0][0].change_type, ChangeType::Add);
}

#[tokio::test(start_paused = true)]
async fn push_add_leaves_other_hostnames_pending() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &["app.example", "old.example"]);
    let (operations, scheduler) = operations(&provider, &target);

    tokio_test::assert_ok!(operations.sync_resources().await);
    operations.schedule_add_dns_record("app.example");

    let mut pending: Vec<(JobType, String)> = scheduler
        .get_jobs()
        .into_iter()
        .map(|job| (job.job_type, job.host_name().unwrap_or_default().to_string()))
        .collect();
    pending.sort_by(|a, b| a.1.cmp(&b.1));

    assert_eq!(
        pending,
        vec![
            (JobType::AddDnsRecord, "app.example".to_string()),
            (JobType::ApplyChanges, "old.example".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_push_add_restarts_the_window() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &[]);
    let (operations, scheduler) = operations(&provider, &target);

    operations.schedule_add_dns_record("app.example");
    tokio::time::sleep(Duration::from_secs(5)).await;
    operations.schedule_add_dns_record("app.example");
    assert_eq!(scheduler.get_jobs().len(), 1);

    // First window would have closed at 10s
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(target.applied().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(target.applied().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn push_removal_uses_cached_record() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &["gone.example"]);
    let (operations, _scheduler) = operations(&provider, &target);

    operations.schedule_delete_dns_record("gone.example", None);
    tokio::time::sleep(REMOVE_DELAY + Duration::from_secs(1)).await;

    let applied = target.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0][0].change_type, ChangeType::Remove);
    assert_eq!(applied[0][0].host.id, "rec-gone.example");
    assert_eq!(applied[0][0].host.meta.as_deref(), Some("zone-1"));
}

#[tokio::test(start_paused = true)]
async fn push_removal_prefers_supplied_record_id() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &["gone.example"]);
    let (operations, _scheduler) = operations(&provider, &target);

    operations.schedule_delete_dns_record("gone.example", Some("explicit-id"));
    tokio::time::sleep(REMOVE_DELAY + Duration::from_secs(1)).await;

    let applied = target.applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0][0].host.id, "explicit-id");
}

#[tokio::test(start_paused = true)]
async fn push_removal_without_record_is_skipped() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &["kept.example"]);
    let (operations, scheduler) = operations(&provider, &target);
    let mut completions = scheduler.subscribe();

    operations.schedule_delete_dns_record("unknown.example", None);
    tokio::time::sleep(REMOVE_DELAY + Duration::from_secs(1)).await;

    assert_eq!(target.apply_attempts(), 0);
    assert!(scheduler.get_jobs().is_empty());
    assert!(completions.try_recv().is_err(), "skipped job reported as completed");
}

#[tokio::test(start_paused = true)]
async fn skipped_push_removal_stays_out_of_history() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &["gone.example"]);
    let (operations, scheduler) = operations(&provider, &target);

    let log = Arc::new(MemoryExecutionLog::new());
    let recorder = history::spawn_recorder(&scheduler, log.clone(), false);

    operations.schedule_delete_dns_record("unknown.example", None);
    operations.schedule_delete_dns_record("gone.example", None);
    tokio::time::sleep(REMOVE_DELAY + Duration::from_secs(1)).await;

    let entries = tokio_test::assert_ok!(log.list(1, 10).await);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].hostname, "gone.example");
    assert_eq!(entries[0].operation_type, ChangeType::Remove);

    recorder.abort();
}

#[tokio::test(start_paused = true)]
async fn direct_mode_turns_events_into_push_jobs() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &["old.example"]);
    let (operations, scheduler) = operations(&provider, &target);

    let listeners = operations.watch_providers(EventMode::Direct);
    provider.emit(vec![
        HostChange::add(Host::new("c1", "new.example")),
        HostChange::remove(Host::new("c2", "old.example")),
    ]);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut kinds: Vec<(JobType, String)> = scheduler
        .get_jobs()
        .into_iter()
        .map(|job| (job.job_type, job.host_name().unwrap_or_default().to_string()))
        .collect();
    kinds.sort_by(|a, b| a.1.cmp(&b.1));

    assert_eq!(
        kinds,
        vec![
            (JobType::AddDnsRecord, "new.example".to_string()),
            (JobType::RemoveDnsRecord, "old.example".to_string()),
        ]
    );
    assert_eq!(provider.get_hosts_calls(), 0, "direct mode must not run a full pass");

    for listener in listeners {
        listener.abort();
    }
}

#[tokio::test(start_paused = true)]
async fn sync_mode_runs_a_full_pass_per_batch() {
    let provider = MockProvider::new("provider", &[]);
    let target = MockTarget::new("target", &[]);
    let (operations, scheduler) = operations(&provider, &target);

    let listeners = operations.watch_providers(EventMode::Sync);

    provider.set_hosts(&["new.example"]);
    provider.emit(vec![HostChange::add(Host::new("new.example", "new.example"))]);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(provider.get_hosts_calls(), 1);
    let jobs = scheduler.get_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type, JobType::ApplyChanges);

    // Empty batches are ignored
    provider.emit(Vec::new());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(provider.get_hosts_calls(), 1);

    for listener in listeners {
        listener.abort();
    }
}
