//! Point-in-time overview of a running instance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operations::Operations;
use crate::scheduler::JobRecord;
use crate::traits::TargetMeta;

/// Crate version reported in summaries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overview of the scheduler and the configured adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSummary {
    /// When the instance started
    pub up_since: DateTime<Utc>,
    /// Library version
    pub version: String,
    /// Jobs waiting to run, oldest first
    pub pending_jobs: Vec<JobRecord>,
    /// Provider names
    pub providers: Vec<String>,
    /// Target names
    pub targets: Vec<String>,
    /// Whether targets only log their writes
    pub dry_run: bool,
}

impl SystemSummary {
    /// Snapshot `operations` and its scheduler
    pub fn collect<M: TargetMeta>(
        operations: &Operations<M>,
        up_since: DateTime<Utc>,
        dry_run: bool,
    ) -> Self {
        Self {
            up_since,
            version: VERSION.to_string(),
            pending_jobs: operations.scheduler().get_jobs(),
            providers: operations.provider_names(),
            targets: operations.target_names(),
            dry_run,
        }
    }
}
