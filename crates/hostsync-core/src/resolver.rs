//! Redundant-change resolution
//!
//! A freshly computed change can undo a job that is still waiting out its
//! settle window: a hostname that vanished and came back, or one that was
//! briefly seen and then went away. Both the pending job and the new change
//! are then dropped instead of applying two writes that cancel out.

use crate::host::{ChangeType, HostChange};
use crate::scheduler::JobRecord;

/// Pair pending jobs with incoming changes that cancel them out
///
/// An `add` change pairs with the first pending job recorded as a `remove` of
/// the same hostname; a `remove` change pairs with the first pending `add`.
/// Jobs are matched in `pending` order, which is oldest first when taken from
/// [`Scheduler::get_jobs`](crate::scheduler::Scheduler::get_jobs).
///
/// Each pending job pairs with at most one change. The caller cancels every
/// returned job and drops every returned change.
pub fn resolve_redundant<M: Clone>(
    pending: &[JobRecord],
    changes: &[HostChange<M>],
) -> Vec<(JobRecord, HostChange<M>)> {
    let mut claimed = vec![false; pending.len()];
    let mut pairs = Vec::new();

    for change in changes {
        let wanted = change.change_type.opposite();

        let found = pending.iter().enumerate().find(|(index, job)| {
            !claimed[*index] && cancels(job, wanted, &change.host.name)
        });

        if let Some((index, job)) = found {
            claimed[index] = true;
            pairs.push((job.clone(), change.clone()));
        }
    }

    pairs
}

fn cancels(job: &JobRecord, change_type: ChangeType, host_name: &str) -> bool {
    job.change_type() == Some(change_type) && job.host_name() == Some(host_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::scheduler::{JobKind, JobMeta, JobType, META_CHANGE_TYPE, META_HOST_NAME};
    use chrono::Utc;

    fn pending(id: &str, change_type: &str, host: &str) -> JobRecord {
        let mut meta = JobMeta::new();
        meta.insert(META_HOST_NAME.to_string(), host.to_string());
        meta.insert(META_CHANGE_TYPE.to_string(), change_type.to_string());
        JobRecord {
            job_type: JobType::ApplyChanges,
            job_id: id.to_string(),
            meta,
            kind: JobKind::OneShot,
            scheduled_at: Utc::now(),
            run_at: None,
        }
    }

    #[test]
    fn test_add_cancels_pending_remove() {
        let jobs = vec![pending("j1", "remove", "a.example")];
        let changes: Vec<HostChange> = vec![HostChange::add(Host::new("", "a.example"))];

        let pairs = resolve_redundant(&jobs, &changes);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.job_id, "j1");
        assert_eq!(pairs[0].1.host.name, "a.example");
    }

    #[test]
    fn test_same_direction_is_not_redundant() {
        let jobs = vec![pending("j1", "add", "a.example")];
        let changes: Vec<HostChange> = vec![HostChange::add(Host::new("", "a.example"))];

        assert!(resolve_redundant(&jobs, &changes).is_empty());
    }

    #[test]
    fn test_other_hostnames_do_not_match() {
        let jobs = vec![pending("j1", "remove", "b.example")];
        let changes: Vec<HostChange> = vec![HostChange::add(Host::new("", "a.example"))];

        assert!(resolve_redundant(&jobs, &changes).is_empty());
    }

    #[test]
    fn test_first_match_oldest_first() {
        let jobs = vec![
            pending("older", "add", "old.example"),
            pending("newer", "add", "old.example"),
        ];
        let changes: Vec<HostChange> = vec![HostChange::remove(Host::new("r1", "old.example"))];

        let pairs = resolve_redundant(&jobs, &changes);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.job_id, "older");
    }

    #[test]
    fn test_jobs_without_change_meta_are_ignored() {
        let mut job = pending("sync", "add", "a.example");
        job.job_type = JobType::SyncResources;
        job.meta.clear();
        let changes: Vec<HostChange> = vec![HostChange::remove(Host::new("", "a.example"))];

        assert!(resolve_redundant(&[job], &changes).is_empty());
    }
}
