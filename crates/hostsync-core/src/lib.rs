// # hostsync-core
//
// Core library for keeping DNS-style name records in sync with the hostnames
// that container engines and reverse proxies know about.
//
// ## Architecture Overview
//
// - **Provider**: Trait for sources of truth about which hostnames exist
// - **Target**: Trait for systems whose records must match the providers
// - **Scheduler**: Debounced one-shot and interval jobs with cancellation
// - **Operations**: Diff, redundant-change resolution and job scheduling
// - **AdapterRegistry**: Plugin-based registry for providers and targets
// - **ExecutionLog**: Trail of completed host changes
//
// ## Design Principles
//
// 1. **Settle windows**: No change is applied the moment it is seen; a change
//    that is undone within its window never reaches the target
// 2. **Idempotent passes**: A full sync pass re-derives everything, so failed
//    work is simply picked up again
// 3. **Plugin-Based**: Adapters are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod error;
pub mod history;
pub mod host;
pub mod operations;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod summary;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, EventMode, HistoryConfig, ProviderConfig, SyncConfig, TargetConfig};
pub use error::{Error, Result};
pub use history::{FileExecutionLog, MemoryExecutionLog};
pub use host::{ChangeType, Host, HostChange};
pub use operations::{Operations, diff};
pub use registry::AdapterRegistry;
pub use resolver::resolve_redundant;
pub use scheduler::{
    IntervalJobRequest, JobMeta, JobOutcome, JobRecord, JobRequest, JobType, Scheduler,
};
pub use summary::SystemSummary;
pub use traits::{
    AnyMeta, ChangeStream, ExecutionEntry, ExecutionLog, Provider, Target, TargetMeta,
    erase_target,
};
