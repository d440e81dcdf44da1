// # Provider Trait
//
// Defines the interface for sources of truth about which hostnames should
// currently exist.
//
// ## Implementations
//
// - Traefik router table: `hostsync-provider-traefik` crate
// - Docker container labels: `hostsync-provider-docker` crate
//
// ## Usage
//
// ```rust,ignore
// use hostsync_core::Provider;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* Provider implementation */;
//
//     provider.setup().await?;
//
//     // Snapshot of the current host set
//     let hosts = provider.get_hosts().await?;
//
//     // Push notifications
//     let mut changes = provider.subscribe();
//     while let Some(batch) = changes.next().await {
//         println!("{} change(s) observed", batch.len());
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::host::{Host, HostChange};

/// Stream of change batches observed by a provider
pub type ChangeStream = Pin<Box<dyn Stream<Item = Vec<HostChange>> + Send + 'static>>;

/// Trait for provider implementations
///
/// A provider observes which named endpoints currently exist. It has two
/// capabilities:
/// 1. **get_hosts()**: the full current host set (used by every sync pass)
/// 2. **subscribe()**: a stream of change batches as they are observed
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O against its own upstream (HTTP API, container engine)
/// - ✅ Spawn one task per subscription to follow events or poll its upstream
///
/// ## Forbidden Capabilities
/// - ❌ Touch targets or decide when changes are applied (owned by `Operations`)
/// - ❌ Mutate the scheduler registry
/// - ❌ Retry failed fetches internally; return the error and let the pass fail
///
/// Observers, not decision-makers: a change batch from `subscribe()` is only a
/// hint that reconciliation should run.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (for logging and job bookkeeping)
    fn name(&self) -> &str;

    /// Verify connectivity and prime any internal caches
    ///
    /// Called once by the driver before the first sync pass. An error here is
    /// a startup failure.
    async fn setup(&self) -> Result<(), crate::Error>;

    /// Fetch the current host set
    ///
    /// Names must be unique in the returned set; duplicates collapse to one
    /// host according to the provider's own policy.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Host>)`: hosts that should exist in every target
    /// - `Err(Error)`: fatal to the current sync pass
    async fn get_hosts(&self) -> Result<Vec<Host>, crate::Error>;

    /// Watch for host changes
    ///
    /// Returns a stream that yields a batch of changes whenever the provider
    /// observes hosts appearing or disappearing. Dropping the stream stops the
    /// underlying watcher.
    fn subscribe(&self) -> ChangeStream;
}

/// Helper trait for constructing providers from configuration
pub trait ProviderFactory: Send + Sync {
    /// Create a Provider instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this provider type
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<std::sync::Arc<dyn Provider>, crate::Error>;
}
