//! Core traits for hostsync
//!
//! This module defines the abstract interfaces that all adapters must follow.
//!
//! - [`Provider`]: Observe which hostnames should exist
//! - [`Target`]: Hold records that must match the providers
//! - [`ExecutionLog`]: Trail of completed host changes
//! - [`AnyMeta`]: Lets targets with different metadata types run together

pub mod erased;
pub mod execution_log;
pub mod provider;
pub mod target;

pub use erased::{AnyMeta, ErasedFactory, erase_target};
pub use execution_log::{ExecutionEntry, ExecutionLog};
pub use provider::{ChangeStream, Provider, ProviderFactory};
pub use target::{Target, TargetFactory, TargetMeta};
