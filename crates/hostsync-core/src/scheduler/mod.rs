//! Debounced job scheduler
//!
//! The scheduler owns the job registry: a map from job id to pending work.
//! It knows nothing about hosts, providers or targets.
//!
//! ## Job Lifecycle
//!
//! ```text
//!                schedule_job()                 timer fires
//!   (none) ─────────────────────▶ Scheduled ───────────────────▶ Executing ──┬──▶ Completed
//!                                     │     entry removed first              └──▶ Failed (logged)
//!                                     │
//!                                     └── remove_job_if_exists() ──▶ Cancelled
//! ```
//!
//! - A one-shot job's entry is removed the instant its timer fires, before the
//!   task runs, so executing jobs are invisible to [`Scheduler::get_jobs`].
//! - Failed tasks are logged and dropped. Nothing is retried or re-queued.
//! - A task may end as [`JobOutcome::Skipped`]; it is logged but subscribers
//!   never hear about it.
//! - Interval jobs keep their entry for as long as the interval lives.
//!
//! ## Threading
//!
//! All methods are synchronous and must be called from within a tokio runtime.
//! Registry mutations are short critical sections that never span an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::host::ChangeType;

/// Job metadata key holding the hostname a job acts on
pub const META_HOST_NAME: &str = "hostName";

/// Job metadata key holding the change direction (`add` / `remove`)
pub const META_CHANGE_TYPE: &str = "type";

/// Job metadata key holding the target a job writes to
pub const META_TARGET: &str = "target";

/// Default capacity of each subscriber channel
const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1000;

/// String-keyed job metadata
pub type JobMeta = BTreeMap<String, String>;

/// Tag identifying what kind of work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    /// Apply one reconciled change to a target
    ApplyChanges,
    /// Push-driven record creation
    AddDnsRecord,
    /// Push-driven record removal
    RemoveDnsRecord,
    /// Periodic full reconciliation pass
    SyncResources,
}

impl JobType {
    /// Stable name used in logs and execution history
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ApplyChanges => "ApplyChanges",
            JobType::AddDnsRecord => "AddDnsRecord",
            JobType::RemoveDnsRecord => "RemoveDnsRecord",
            JobType::SyncResources => "SyncResources",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a job runs once or repeatedly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Runs once after a delay
    OneShot,
    /// Runs every interval until cancelled
    Interval,
}

/// How a task that returned `Ok` ended
///
/// Tasks returning `Ok(())` count as [`JobOutcome::Completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The task did its work; subscribers are notified
    Completed,
    /// The task found nothing to do; subscribers are not notified
    Skipped,
}

impl From<()> for JobOutcome {
    fn from(_: ()) -> Self {
        JobOutcome::Completed
    }
}

/// Timer-free view of a job
///
/// Returned by [`Scheduler::get_jobs`] and delivered to subscribers after a
/// job completes successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// What the job does
    pub job_type: JobType,
    /// De-duplication and cancellation key
    pub job_id: String,
    /// Caller-supplied metadata
    pub meta: JobMeta,
    /// One-shot or interval
    pub kind: JobKind,
    /// When the job was scheduled
    pub scheduled_at: DateTime<Utc>,
    /// Expected execution time (one-shot jobs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Hostname recorded in the job metadata
    pub fn host_name(&self) -> Option<&str> {
        self.meta.get(META_HOST_NAME).map(String::as_str)
    }

    /// Change direction recorded in the job metadata
    pub fn change_type(&self) -> Option<ChangeType> {
        self.meta
            .get(META_CHANGE_TYPE)
            .and_then(|value| ChangeType::parse(value))
    }

    /// Target name recorded in the job metadata
    pub fn target(&self) -> Option<&str> {
        self.meta.get(META_TARGET).map(String::as_str)
    }
}

/// Parameters for a one-shot job
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Job tag
    pub job_type: JobType,
    /// Job id, unique per logical change
    pub job_id: String,
    /// Settle window before the task runs
    pub delay: Duration,
    /// Metadata recorded alongside the job
    pub meta: JobMeta,
}

impl JobRequest {
    /// Create a request without metadata
    pub fn new(job_type: JobType, job_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            job_type,
            job_id: job_id.into(),
            delay,
            meta: JobMeta::new(),
        }
    }

    /// Set the job metadata
    pub fn with_meta(mut self, meta: JobMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Parameters for an interval job
#[derive(Debug, Clone)]
pub struct IntervalJobRequest {
    /// Job tag
    pub job_type: JobType,
    /// Job id
    pub job_id: String,
    /// Time between runs (must be non-zero)
    pub interval: Duration,
    /// Also run once right away
    pub trigger_on_start: bool,
    /// Metadata recorded alongside the job
    pub meta: JobMeta,
}

impl IntervalJobRequest {
    /// Create a request that first runs after one interval
    pub fn new(job_type: JobType, job_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            job_type,
            job_id: job_id.into(),
            interval,
            trigger_on_start: false,
            meta: JobMeta::new(),
        }
    }

    /// Run the task once immediately in addition to every interval
    pub fn trigger_on_start(mut self, trigger: bool) -> Self {
        self.trigger_on_start = trigger;
        self
    }

    /// Set the job metadata
    pub fn with_meta(mut self, meta: JobMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Registry entry: the public record plus the timer's cancellation token
struct Job {
    record: JobRecord,
    sequence: u64,
    handle: AbortHandle,
}

struct SchedulerInner {
    jobs: Mutex<HashMap<String, Job>>,
    next_sequence: AtomicU64,
    subscribers: Mutex<Vec<mpsc::Sender<JobRecord>>>,
    subscriber_capacity: usize,
}

impl SchedulerInner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<mpsc::Sender<JobRecord>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove a fired one-shot entry, but only if it is still this timer's
    ///
    /// Returns `false` when the job was cancelled while its timer was firing.
    /// When a later schedule call reused the id, the newer entry is left alone
    /// and the older timer still runs.
    fn take_fired(&self, job_id: &str, sequence: u64) -> bool {
        let mut jobs = self.lock_jobs();
        match jobs.get(job_id) {
            Some(job) if job.sequence == sequence => {
                jobs.remove(job_id);
                true
            }
            Some(_) => {
                debug!(
                    "[Run Job] Job with id=\"{}\" was superseded by a newer schedule call",
                    job_id
                );
                true
            }
            None => false,
        }
    }

    /// Await a job's task, then notify subscribers or log the failure
    async fn execute<Fut, O>(&self, record: JobRecord, task: Fut)
    where
        Fut: Future<Output = Result<O>>,
        O: Into<JobOutcome>,
    {
        match task.await.map(Into::into) {
            Ok(JobOutcome::Completed) => {
                debug!(
                    "[Job Completed] {} Job with id=\"{}\" completed",
                    record.job_type, record.job_id
                );
                self.notify(record);
            }
            Ok(JobOutcome::Skipped) => {
                debug!(
                    "[Job Skipped] {} Job with id=\"{}\" had nothing to do",
                    record.job_type, record.job_id
                );
            }
            Err(e) => {
                error!(
                    "[Job Failed] {} Job with id=\"{}\" failed: {}",
                    record.job_type, record.job_id, e
                );
            }
        }
    }

    fn notify(&self, record: JobRecord) {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|tx| match tx.try_send(record.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Subscriber channel full, dropping completion of job \"{}\". \
                    Consider increasing event_channel_capacity.",
                    record.job_id
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }
}

/// Debounced and periodic job scheduler
///
/// Cloning is cheap; all clones share one registry. Construct one per process
/// and hand clones to every collaborator.
///
/// # Example
///
/// ```rust,no_run
/// use hostsync_core::scheduler::{JobRequest, JobType, Scheduler};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let scheduler = Scheduler::new();
///
///     scheduler.schedule_job(
///         JobRequest::new(JobType::ApplyChanges, "job-1", Duration::from_secs(10)),
///         || async { Ok(()) },
///     );
///
///     assert_eq!(scheduler.get_jobs().len(), 1);
/// }
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler with the default subscriber channel capacity
    pub fn new() -> Self {
        Self::with_subscriber_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a scheduler whose subscriber channels hold `capacity` records
    pub fn with_subscriber_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                jobs: Mutex::new(HashMap::new()),
                next_sequence: AtomicU64::new(0),
                subscribers: Mutex::new(Vec::new()),
                subscriber_capacity: capacity.max(1),
            }),
        }
    }

    /// Arm a one-shot timer
    ///
    /// The job shows up in [`Scheduler::get_jobs`] immediately. Any existing
    /// entry with the same id is replaced in the registry, but its timer keeps
    /// running; call [`Scheduler::remove_job_if_exists`] first to restart a
    /// debounce window.
    ///
    /// Subscribers hear about the job only if its task ends as
    /// [`JobOutcome::Completed`].
    pub fn schedule_job<F, Fut, O>(&self, request: JobRequest, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<JobOutcome> + Send + 'static,
    {
        let JobRequest {
            job_type,
            job_id,
            delay,
            meta,
        } = request;

        let scheduled_at = Utc::now();
        let run_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| scheduled_at.checked_add_signed(d));

        let record = JobRecord {
            job_type,
            job_id: job_id.clone(),
            meta,
            kind: JobKind::OneShot,
            scheduled_at,
            run_at,
        };

        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let fired = record.clone();

        // Held across spawn so a zero-delay timer cannot fire before its entry exists
        let mut jobs = self.inner.lock_jobs();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if !inner.take_fired(&fired.job_id, sequence) {
                debug!(
                    "[Run Job] {} Job with id=\"{}\" was cancelled before running",
                    fired.job_type, fired.job_id
                );
                return;
            }

            info!(
                "[Run Job] {} Job with id=\"{}\" has been executed",
                fired.job_type, fired.job_id
            );
            inner.execute(fired, task()).await;
        })
        .abort_handle();

        if jobs
            .insert(
                job_id.clone(),
                Job {
                    record,
                    sequence,
                    handle,
                },
            )
            .is_some()
        {
            debug!(
                "[Schedule Job] Replaced registry entry for job id=\"{}\"",
                job_id
            );
        }
        drop(jobs);

        info!(
            "[Schedule Job] {} Job with id=\"{}\" has been scheduled in {:?}",
            job_type, job_id, delay
        );
    }

    /// Arm a repeating timer
    ///
    /// The task runs every `interval`; with `trigger_on_start` it also runs
    /// once right away without the caller awaiting it. The registry entry
    /// lives until the job is removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero interval.
    pub fn schedule_interval_job<F, Fut>(&self, request: IntervalJobRequest, task: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let IntervalJobRequest {
            job_type,
            job_id,
            interval,
            trigger_on_start,
            meta,
        } = request;

        if interval.is_zero() {
            return Err(Error::invalid_input(format!(
                "Interval job \"{}\" needs a non-zero interval",
                job_id
            )));
        }

        let record = JobRecord {
            job_type,
            job_id: job_id.clone(),
            meta,
            kind: JobKind::Interval,
            scheduled_at: Utc::now(),
            run_at: None,
        };

        let task = Arc::new(task);

        if trigger_on_start {
            let inner = Arc::clone(&self.inner);
            let started = record.clone();
            let future = task();
            tokio::spawn(async move {
                info!(
                    "[Run Job] {} Job with id=\"{}\" has been executed (on start)",
                    started.job_type, started.job_id
                );
                inner.execute(started, future).await;
            });
        }

        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let ticking = record.clone();
        let first_tick = Instant::now() + interval;

        let mut jobs = self.inner.lock_jobs();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                info!(
                    "[Run Job] {} Job with id=\"{}\" has been executed",
                    ticking.job_type, ticking.job_id
                );

                // Runs are detached so a slow task does not shift the cadence
                let inner = Arc::clone(&inner);
                let record = ticking.clone();
                let future = task();
                tokio::spawn(async move {
                    inner.execute(record, future).await;
                });
            }
        })
        .abort_handle();

        jobs.insert(
            job_id.clone(),
            Job {
                record,
                sequence,
                handle,
            },
        );
        drop(jobs);

        info!(
            "[Schedule Interval Job] {} Job with id=\"{}\" has been scheduled every {:?}",
            job_type, job_id, interval
        );

        Ok(())
    }

    /// Cancel and remove a pending job
    ///
    /// Only acts when an entry exists for `job_id` **and** it was scheduled
    /// with `job_type`; anything else is a silent no-op. Safe to call twice.
    ///
    /// # Returns
    ///
    /// `true` if a job was cancelled
    pub fn remove_job_if_exists(&self, job_type: JobType, job_id: &str) -> bool {
        let mut jobs = self.inner.lock_jobs();

        let matches = jobs
            .get(job_id)
            .is_some_and(|job| job.record.job_type == job_type);

        if !matches {
            return false;
        }

        if let Some(job) = jobs.remove(job_id) {
            job.handle.abort();
        }
        drop(jobs);

        info!(
            "[Remove Job] {} Job with id=\"{}\" has been removed",
            job_type, job_id
        );
        true
    }

    /// Snapshot of all pending jobs, oldest first
    pub fn get_jobs(&self) -> Vec<JobRecord> {
        let jobs = self.inner.lock_jobs();

        let mut pending: Vec<(u64, JobRecord)> = jobs
            .values()
            .map(|job| (job.sequence, job.record.clone()))
            .collect();
        drop(jobs);

        pending.sort_by_key(|(sequence, _)| *sequence);
        pending.into_iter().map(|(_, record)| record).collect()
    }

    /// Receive a record for every job that completes successfully
    ///
    /// Records are dropped (with a warning) when the receiver falls behind by
    /// more than the channel capacity.
    pub fn subscribe(&self) -> mpsc::Receiver<JobRecord> {
        let (tx, rx) = mpsc::channel(self.inner.subscriber_capacity);
        self.inner.lock_subscribers().push(tx);
        rx
    }

    /// Cancel every pending job, interval jobs included
    ///
    /// Used on shutdown. Jobs that are already executing run to completion.
    ///
    /// # Returns
    ///
    /// The number of jobs cancelled
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Job> = self.inner.lock_jobs().drain().map(|(_, job)| job).collect();

        for job in &drained {
            job.handle.abort();
        }

        if !drained.is_empty() {
            info!("[Remove Job] Cancelled {} pending job(s)", drained.len());
        }
        drained.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending_jobs", &self.inner.lock_jobs().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn() -> std::future::Ready<Result<()>> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_visible_until_it_fires() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_job(
            JobRequest::new(JobType::ApplyChanges, "test", Duration::from_secs(100)),
            counting_task(&runs),
        );

        let jobs = scheduler.get_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, "test");
        assert_eq!(jobs[0].job_type, JobType::ApplyChanges);
        assert_eq!(jobs[0].kind, JobKind::OneShot);

        tokio::time::sleep(Duration::from_secs(99)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.get_jobs().len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(scheduler.get_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_removed_before_task_runs() {
        let scheduler = Scheduler::new();
        let observed = Arc::new(Mutex::new(None));

        let observer = scheduler.clone();
        let slot = Arc::clone(&observed);
        scheduler.schedule_job(
            JobRequest::new(JobType::ApplyChanges, "self-check", Duration::from_secs(1)),
            move || async move {
                let visible = observer.get_jobs().iter().any(|j| j.job_id == "self-check");
                *slot.lock().unwrap() = Some(visible);
                Ok(())
            },
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*observed.lock().unwrap(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_requires_matching_type() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_job(
            JobRequest::new(JobType::AddDnsRecord, "foo.example", Duration::from_secs(5)),
            counting_task(&runs),
        );

        assert!(!scheduler.remove_job_if_exists(JobType::RemoveDnsRecord, "foo.example"));
        assert_eq!(scheduler.get_jobs().len(), 1);

        assert!(scheduler.remove_job_if_exists(JobType::AddDnsRecord, "foo.example"));
        assert!(!scheduler.remove_job_if_exists(JobType::AddDnsRecord, "foo.example"));
        assert!(scheduler.get_jobs().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_not_retried() {
        let scheduler = Scheduler::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut completions = scheduler.subscribe();

        let counter = Arc::clone(&attempts);
        scheduler.schedule_job(
            JobRequest::new(JobType::ApplyChanges, "doomed", Duration::from_secs(1)),
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), Error>(Error::target("test", "apply failed"))
            },
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(scheduler.get_jobs().is_empty());
        assert!(completions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_completed_jobs() {
        let scheduler = Scheduler::new();
        let mut completions = scheduler.subscribe();

        let mut meta = JobMeta::new();
        meta.insert(META_HOST_NAME.to_string(), "foo.example".to_string());
        meta.insert(META_CHANGE_TYPE.to_string(), "add".to_string());

        scheduler.schedule_job(
            JobRequest::new(JobType::ApplyChanges, "done", Duration::from_secs(1)).with_meta(meta),
            || async { Ok(()) },
        );

        let record = completions.recv().await.expect("completion delivered");
        assert_eq!(record.job_id, "done");
        assert_eq!(record.host_name(), Some("foo.example"));
        assert_eq!(record.change_type(), Some(ChangeType::Add));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_job_is_not_delivered() {
        let scheduler = Scheduler::new();
        let mut completions = scheduler.subscribe();

        scheduler.schedule_job(
            JobRequest::new(JobType::RemoveDnsRecord, "nothing", Duration::from_secs(1)),
            || async { Ok(JobOutcome::Skipped) },
        );
        scheduler.schedule_job(
            JobRequest::new(JobType::RemoveDnsRecord, "something", Duration::from_secs(2)),
            || async { Ok(JobOutcome::Completed) },
        );

        let record = completions.recv().await.expect("completion delivered");
        assert_eq!(record.job_id, "something");
        assert!(completions.try_recv().is_err());
        assert!(scheduler.get_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_job_with_trigger_on_start() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule_interval_job(
                IntervalJobRequest::new(JobType::SyncResources, "sync", Duration::from_secs(60))
                    .trigger_on_start(true),
                counting_task(&runs),
            )
            .unwrap();

        tokio::task::yield_now().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(3 * 60 + 30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);

        let jobs = scheduler.get_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::Interval);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let scheduler = Scheduler::new();
        let result = scheduler.schedule_interval_job(
            IntervalJobRequest::new(JobType::SyncResources, "sync", Duration::ZERO),
            || async { Ok(()) },
        );

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(scheduler.get_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_intervals() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule_interval_job(
                IntervalJobRequest::new(JobType::SyncResources, "sync", Duration::from_secs(1)),
                counting_task(&runs),
            )
            .unwrap();
        scheduler.schedule_job(
            JobRequest::new(JobType::ApplyChanges, "pending", Duration::from_secs(5)),
            counting_task(&runs),
        );

        assert_eq!(scheduler.cancel_all(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(scheduler.get_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_is_in_scheduling_order() {
        let scheduler = Scheduler::new();

        for id in ["c", "a", "b"] {
            scheduler.schedule_job(
                JobRequest::new(JobType::ApplyChanges, id, Duration::from_secs(30)),
                || async { Ok(()) },
            );
        }

        let ids: Vec<String> = scheduler.get_jobs().into_iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
