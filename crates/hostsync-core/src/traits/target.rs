// # Target Trait
//
// Defines the interface for systems whose records must be made to match the
// providers' hostname set.
//
// ## Implementations
//
// - Cloudflare DNS (CNAME records): `hostsync-target-cloudflare` crate
// - Cloudflare Tunnel ingress rules: `hostsync-target-cloudflare-tunnel` crate
//
// ## Usage
//
// ```rust,ignore
// use hostsync_core::{Host, HostChange, Target};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let target = /* Target implementation */;
//
//     target.setup().await?;
//     let existing = target.get_hosts().await?;
//
//     target.apply(vec![HostChange::add(Host::new("", "app.example.com"))]).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::fmt::Debug;

use crate::host::{Host, HostChange};

/// Bounds required of a target's metadata type
pub trait TargetMeta: Clone + Debug + Send + Sync + 'static {}

impl<T: Clone + Debug + Send + Sync + 'static> TargetMeta for T {}

/// Trait for target implementations
///
/// `Meta` is the target's own bookkeeping attached to the hosts it reports
/// (for example the upstream record id). It comes back unchanged in the
/// `remove` changes handed to [`Target::apply`].
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to its own endpoints
/// - ✅ Cache the last fetched record set so removals can be resolved to ids
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff (a failed change waits for the next pass)
/// - ❌ Decide whether a change is needed (owned by `Operations`)
/// - ❌ Access providers or the scheduler
///
/// ## Why No Retry Logic?
///
/// Reconciliation is idempotent: a change that fails to apply is detected
/// again by the next full sync pass and rescheduled with a fresh settle
/// window. Retrying inside the target would stack extra writes on top of that.
#[async_trait]
pub trait Target: Send + Sync {
    /// Adapter-specific metadata carried on this target's hosts
    type Meta: TargetMeta;

    /// Target name (used in job ids and logs)
    fn name(&self) -> &str;

    /// Verify credentials and connectivity
    async fn setup(&self) -> Result<(), crate::Error>;

    /// Fetch the hosts currently present in the target
    ///
    /// Implementations should refresh any cache consulted by
    /// [`Target::cached_host`].
    async fn get_hosts(&self) -> Result<Vec<Host<Self::Meta>>, crate::Error>;

    /// Apply a set of changes
    ///
    /// The reconciler always calls this with exactly one change so that one
    /// failing change does not block the others.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: all changes applied, or skipped for lack of identifying data
    /// - `Err(Error)`: logged by the scheduler, no retry
    async fn apply(&self, changes: Vec<HostChange<Self::Meta>>) -> Result<(), crate::Error>;

    /// Look up a host by name in the target's last fetched record set
    ///
    /// Push-driven deletions use this when no record id was supplied.
    fn cached_host(&self, _name: &str) -> Option<Host<Self::Meta>> {
        None
    }
}

/// Helper trait for constructing targets from configuration
pub trait TargetFactory<M: TargetMeta>: Send + Sync {
    /// Create a Target instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this target type
    fn create(
        &self,
        config: &crate::config::TargetConfig,
    ) -> Result<std::sync::Arc<dyn Target<Meta = M>>, crate::Error>;
}
