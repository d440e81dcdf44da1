//! Reconciliation between providers and targets
//!
//! [`Operations`] turns host set differences into scheduled jobs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   get_hosts()    ┌──────────────┐   get_hosts()   ┌─────────────┐
//! │  Providers  │ ───────────────▶ │  Operations  │ ◀────────────── │   Targets   │
//! └─────────────┘                  └──────────────┘                 └─────────────┘
//!        │ subscribe()                     │                               ▲
//!        └──────── change batches ────────▶│ diff / resolve / schedule     │
//!                                          ▼                               │
//!                                  ┌──────────────┐   timer fires          │
//!                                  │  Scheduler   │ ── apply([change]) ────┘
//!                                  └──────────────┘
//! ```
//!
//! ## Sync Pass
//!
//! 1. Fetch every target's host set once
//! 2. Fetch each provider's host set
//! 3. For each (provider, target) pair, diff by hostname
//! 4. Cancel pending jobs that a new change undoes, and drop that change
//! 5. Schedule one `ApplyChanges` job per remaining change, after the
//!    add or remove settle window
//!
//! Pairs are processed one after another. Each pair is diffed on its own, so
//! two providers that disagree about a hostname will keep scheduling opposite
//! changes for it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, EventMode};
use crate::error::Result;
use crate::host::{ChangeType, Host, HostChange};
use crate::resolver::resolve_redundant;
use crate::scheduler::{
    IntervalJobRequest, JobMeta, JobOutcome, JobRecord, JobRequest, JobType, META_CHANGE_TYPE,
    META_HOST_NAME, META_TARGET, Scheduler,
};
use crate::traits::{Provider, Target, TargetMeta};

/// Job id of the periodic sync pass
pub const SYNC_JOB_ID: &str = "sync-resources";

/// Compute the changes that make `target_hosts` match `provider_hosts`
///
/// Adds come first, in provider order, for names the target lacks. Removes
/// follow, in target order, for names no longer provided; they keep the
/// target's host (id and metadata) so the target can find the record. A name
/// listed twice on either side yields at most one change, from its first host.
pub fn diff<M: Clone>(provider_hosts: &[Host], target_hosts: &[Host<M>]) -> Vec<HostChange<M>> {
    let provided: HashSet<&str> = provider_hosts.iter().map(|h| h.name.as_str()).collect();
    let existing: HashSet<&str> = target_hosts.iter().map(|h| h.name.as_str()).collect();

    let mut changes = Vec::new();

    let mut added = HashSet::new();
    for host in provider_hosts {
        if !existing.contains(host.name.as_str()) && added.insert(host.name.as_str()) {
            changes.push(HostChange::add(host.without_meta()));
        }
    }

    let mut removed = HashSet::new();
    for host in target_hosts {
        if !provided.contains(host.name.as_str()) && removed.insert(host.name.as_str()) {
            changes.push(HostChange::remove(host.clone()));
        }
    }

    changes
}

/// Reconciler for a set of providers and targets sharing one metadata type
///
/// # Example
///
/// ```rust,ignore
/// let operations = Arc::new(Operations::new(
///     scheduler.clone(),
///     vec![traefik],
///     vec![cloudflare],
///     &config.engine,
/// ));
///
/// operations.setup().await?;
/// operations.schedule_periodic_sync(config.engine.sync_interval())?;
/// ```
pub struct Operations<M: TargetMeta> {
    scheduler: Scheduler,
    providers: Vec<Arc<dyn Provider>>,
    targets: Vec<Arc<dyn Target<Meta = M>>>,
    add_delay: Duration,
    remove_delay: Duration,
}

impl<M: TargetMeta> Operations<M> {
    /// Create a reconciler
    ///
    /// Only the settle windows are taken from `engine`; the sync interval is
    /// passed to [`Operations::schedule_periodic_sync`].
    pub fn new(
        scheduler: Scheduler,
        providers: Vec<Arc<dyn Provider>>,
        targets: Vec<Arc<dyn Target<Meta = M>>>,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            scheduler,
            providers,
            targets,
            add_delay: engine.add_delay(),
            remove_delay: engine.remove_delay(),
        }
    }

    /// The scheduler jobs are placed on
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Names of the configured providers
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Names of the configured targets
    pub fn target_names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name().to_string()).collect()
    }

    /// Run `setup()` on every target, then every provider
    ///
    /// Stops at the first failure.
    pub async fn setup(&self) -> Result<()> {
        for target in &self.targets {
            target.setup().await?;
            info!("[Setup] Target \"{}\" is ready", target.name());
        }
        for provider in &self.providers {
            provider.setup().await?;
            info!("[Setup] Provider \"{}\" is ready", provider.name());
        }
        Ok(())
    }

    /// Run one full reconciliation pass
    ///
    /// # Errors
    ///
    /// Any `get_hosts()` failure aborts the pass and is returned as is. Jobs
    /// already scheduled by earlier pairs stay scheduled.
    pub async fn sync_resources(&self) -> Result<()> {
        let mut target_hosts = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            target_hosts.push(target.get_hosts().await?);
        }

        for provider in &self.providers {
            let provider_hosts = provider.get_hosts().await?;

            for (target, existing) in self.targets.iter().zip(&target_hosts) {
                let changes = diff(&provider_hosts, existing);
                if changes.is_empty() {
                    continue;
                }

                debug!(
                    "[Sync] {} change(s) between provider \"{}\" and target \"{}\"",
                    changes.len(),
                    provider.name(),
                    target.name()
                );
                self.reconcile(target, changes);
            }
        }

        Ok(())
    }

    /// Cancel redundant work and schedule the rest
    fn reconcile(&self, target: &Arc<dyn Target<Meta = M>>, changes: Vec<HostChange<M>>) {
        let target_name = target.name();

        let pending: Vec<JobRecord> = self
            .scheduler
            .get_jobs()
            .into_iter()
            .filter(|job| job.target() == Some(target_name))
            .collect();

        let pairs = resolve_redundant(&pending, &changes);
        let mut cancelled_jobs = HashSet::new();
        let mut dropped: HashSet<(ChangeType, String)> = HashSet::new();

        for (job, change) in pairs {
            info!(
                "[Sync] \"{}\" on target \"{}\" undoes pending job \"{}\", dropping both",
                change, target_name, job.job_id
            );
            self.scheduler.remove_job_if_exists(job.job_type, &job.job_id);
            cancelled_jobs.insert(job.job_id);
            dropped.insert((change.change_type, change.host.name));
        }

        for change in changes {
            if dropped.contains(&(change.change_type, change.host.name.clone())) {
                continue;
            }

            let already_pending = pending.iter().any(|job| {
                !cancelled_jobs.contains(&job.job_id)
                    && job.change_type() == Some(change.change_type)
                    && job.host_name() == Some(change.host.name.as_str())
            });
            if already_pending {
                debug!(
                    "[Sync] \"{}\" is already pending on target \"{}\"",
                    change, target_name
                );
                continue;
            }

            self.schedule_apply(target, change);
        }
    }

    fn schedule_apply(&self, target: &Arc<dyn Target<Meta = M>>, change: HostChange<M>) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let job_id = format!(
            "{}::{}::{}::{}",
            timestamp,
            target.name(),
            change.change_type,
            change.host.name
        );

        let delay = match change.change_type {
            ChangeType::Add => self.add_delay,
            ChangeType::Remove => self.remove_delay,
        };

        let meta = change_meta(&change.host.name, change.change_type, target.name());
        let target = Arc::clone(target);

        self.scheduler.schedule_job(
            JobRequest::new(JobType::ApplyChanges, job_id, delay).with_meta(meta),
            move || async move { target.apply(vec![change]).await },
        );
    }

    /// Schedule creation of `hostname` on every target
    ///
    /// Restarts the settle window: a pending push add for the same hostname
    /// is cancelled first, and so is every pending removal of it, whether it
    /// came from a push event or a sync pass.
    pub fn schedule_add_dns_record(&self, hostname: &str) {
        for target in &self.targets {
            let job_id = push_job_id(target.name(), hostname);

            for job in self.pending_removals(target.name(), hostname) {
                if self.scheduler.remove_job_if_exists(job.job_type, &job.job_id) {
                    info!(
                        "[Push] \"{}\" came back before its removal ran on target \"{}\"",
                        hostname,
                        target.name()
                    );
                }
            }
            self.scheduler.remove_job_if_exists(JobType::AddDnsRecord, &job_id);

            let meta = change_meta(hostname, ChangeType::Add, target.name());
            let change = HostChange::add(Host::new("", hostname));
            let target = Arc::clone(target);

            self.scheduler.schedule_job(
                JobRequest::new(JobType::AddDnsRecord, job_id, self.add_delay).with_meta(meta),
                move || async move { target.apply(vec![change]).await },
            );
        }
    }

    /// Schedule removal of `hostname` from every target
    ///
    /// With no `record_id`, the record is looked up in the target's cached
    /// host set when the job runs. If nothing is found there, the job logs a
    /// warning and ends as [`JobOutcome::Skipped`], so it never reaches
    /// subscribers or the execution history. The next full sync pass catches
    /// any leftover.
    pub fn schedule_delete_dns_record(&self, hostname: &str, record_id: Option<&str>) {
        for target in &self.targets {
            let job_id = push_job_id(target.name(), hostname);

            self.scheduler.remove_job_if_exists(JobType::RemoveDnsRecord, &job_id);

            let meta = change_meta(hostname, ChangeType::Remove, target.name());
            let hostname = hostname.to_string();
            let record_id = record_id.map(str::to_string);
            let target = Arc::clone(target);

            self.scheduler.schedule_job(
                JobRequest::new(JobType::RemoveDnsRecord, job_id, self.remove_delay)
                    .with_meta(meta),
                move || async move {
                    let host = match record_id {
                        Some(id) => Some(Host::new(id, hostname.as_str())),
                        None => target.cached_host(&hostname),
                    };

                    let Some(host) = host else {
                        warn!(
                            "[Push] No record found for \"{}\" on target \"{}\", \
                            leaving it to the next sync",
                            hostname,
                            target.name()
                        );
                        return Ok(JobOutcome::Skipped);
                    };

                    target
                        .apply(vec![HostChange::remove(host)])
                        .await
                        .map(|()| JobOutcome::Completed)
                },
            );
        }
    }

    /// Pending removals of `hostname` on one target, from any job type
    fn pending_removals(&self, target: &str, hostname: &str) -> Vec<JobRecord> {
        self.scheduler
            .get_jobs()
            .into_iter()
            .filter(|job| {
                job.target() == Some(target)
                    && job.change_type() == Some(ChangeType::Remove)
                    && job.host_name() == Some(hostname)
            })
            .collect()
    }

    /// React to a change batch observed by a provider
    ///
    /// In [`EventMode::Sync`] the batch only triggers a full pass. In
    /// [`EventMode::Direct`] each change becomes a push add or delete job.
    pub async fn handle_provider_changes(
        &self,
        mode: EventMode,
        changes: Vec<HostChange>,
    ) -> Result<()> {
        match mode {
            EventMode::Sync => self.sync_resources().await,
            EventMode::Direct => {
                for change in changes {
                    match change.change_type {
                        ChangeType::Add => self.schedule_add_dns_record(&change.host.name),
                        ChangeType::Remove => {
                            self.schedule_delete_dns_record(&change.host.name, None)
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

impl<M: TargetMeta> Operations<M> {
    /// Register the periodic full sync as an interval job
    ///
    /// The first pass runs right away. A failing pass is logged and the next
    /// one runs on schedule.
    pub fn schedule_periodic_sync(self: &Arc<Self>, interval: Duration) -> Result<()> {
        let operations = Arc::clone(self);

        self.scheduler.schedule_interval_job(
            IntervalJobRequest::new(JobType::SyncResources, SYNC_JOB_ID, interval)
                .trigger_on_start(true),
            move || {
                let operations = Arc::clone(&operations);
                async move { operations.sync_resources().await }
            },
        )
    }

    /// Follow every provider's change stream
    ///
    /// Spawns one task per provider. Each task ends when its stream ends;
    /// abort the handles to stop listening earlier.
    pub fn watch_providers(self: &Arc<Self>, mode: EventMode) -> Vec<JoinHandle<()>> {
        self.providers
            .iter()
            .map(|provider| {
                let operations = Arc::clone(self);
                let name = provider.name().to_string();
                let mut stream = provider.subscribe();

                tokio::spawn(async move {
                    while let Some(batch) = stream.next().await {
                        if batch.is_empty() {
                            continue;
                        }

                        info!(
                            "[Provider Events] Provider \"{}\" reported {} change(s)",
                            name,
                            batch.len()
                        );

                        if let Err(e) = operations.handle_provider_changes(mode, batch).await {
                            error!(
                                "[Provider Events] Failed to handle changes from \"{}\": {}",
                                name, e
                            );
                        }
                    }
                    debug!("[Provider Events] Stream of provider \"{}\" ended", name);
                })
            })
            .collect()
    }
}

fn push_job_id(target: &str, hostname: &str) -> String {
    format!("{}::{}", target, hostname)
}

fn change_meta(hostname: &str, change_type: ChangeType, target: &str) -> JobMeta {
    let mut meta = JobMeta::new();
    meta.insert(META_HOST_NAME.to_string(), hostname.to_string());
    meta.insert(META_CHANGE_TYPE.to_string(), change_type.as_str().to_string());
    meta.insert(META_TARGET.to_string(), target.to_string());
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(names: &[&str]) -> Vec<Host> {
        names.iter().map(|name| Host::new("", *name)).collect()
    }

    #[test]
    fn test_diff_adds_and_removes() {
        let provider = hosts(&["a.example", "baz.example"]);
        let target = hosts(&["old.example", "a.example"]);

        let changes = diff(&provider, &target);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], HostChange::add(Host::new("", "baz.example")));
        assert_eq!(changes[1], HostChange::remove(Host::new("", "old.example")));
    }

    #[test]
    fn test_diff_of_identical_sets_is_empty() {
        let set = hosts(&["a.example", "b.example"]);
        assert!(diff(&set, &set).is_empty());
        assert!(diff::<()>(&[], &[]).is_empty());
    }

    #[test]
    fn test_diff_keeps_target_metadata_on_removals() {
        let target = vec![Host::new("rec-9", "gone.example").with_meta("zone-a".to_string())];

        let changes = diff(&[], &target);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Remove);
        assert_eq!(changes[0].host.id, "rec-9");
        assert_eq!(changes[0].host.meta.as_deref(), Some("zone-a"));
    }

    #[test]
    fn test_diff_collapses_duplicate_names() {
        let provider = hosts(&["dup.example", "kept.example", "dup.example"]);
        let target: Vec<Host> = vec![
            Host::new("rec-1", "kept.example"),
            Host::new("rec-2", "stale.example"),
            Host::new("rec-3", "stale.example"),
        ];

        let changes = diff(&provider, &target);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], HostChange::add(Host::new("", "dup.example")));
        assert_eq!(changes[1].change_type, ChangeType::Remove);
        assert_eq!(changes[1].host.id, "rec-2");
    }

    #[test]
    fn test_change_meta_keys() {
        let meta = change_meta("foo.example", ChangeType::Add, "cloudflare-dns");
        assert_eq!(meta.get(META_HOST_NAME).unwrap(), "foo.example");
        assert_eq!(meta.get(META_CHANGE_TYPE).unwrap(), "add");
        assert_eq!(meta.get(META_TARGET).unwrap(), "cloudflare-dns");
    }
}
