//! Type-erased target metadata
//!
//! One [`Operations`](crate::operations::Operations) instance drives targets
//! sharing a single metadata type. Targets with different metadata types run
//! side by side by wrapping each of them with [`erase_target`], which turns
//! `Target<Meta = M>` into `Target<Meta = AnyMeta>`:
//!
//! ```rust,ignore
//! let targets: Vec<Arc<dyn Target<Meta = AnyMeta>>> = vec![
//!     erase_target(dns_target),
//!     erase_target(tunnel_target),
//! ];
//! ```
//!
//! Metadata reported by a wrapped target comes back to the same target in its
//! `remove` changes, so the downcast in `apply` only fails if a host crosses
//! over from another target. Such a host is passed on without metadata.

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::config::TargetConfig;
use crate::error::Result;
use crate::host::{Host, HostChange};
use crate::traits::target::{Target, TargetFactory, TargetMeta};

trait MetaValue: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> MetaValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Metadata of any target, behind a shared pointer
#[derive(Clone)]
pub struct AnyMeta(Arc<dyn MetaValue>);

impl AnyMeta {
    /// Wrap a target's metadata
    pub fn new<M: TargetMeta>(meta: M) -> Self {
        Self(Arc::new(meta))
    }

    /// Borrow the metadata as `M`, if that is what it holds
    pub fn downcast_ref<M: TargetMeta>(&self) -> Option<&M> {
        let value: &dyn MetaValue = &*self.0;
        value.as_any().downcast_ref::<M>()
    }
}

impl fmt::Debug for AnyMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

fn erase_host<M: TargetMeta>(host: Host<M>) -> Host<AnyMeta> {
    Host {
        id: host.id,
        name: host.name,
        meta: host.meta.map(AnyMeta::new),
    }
}

/// Target adapter exposing a typed target with [`AnyMeta`] metadata
struct ErasedTarget<M: TargetMeta> {
    inner: Arc<dyn Target<Meta = M>>,
}

impl<M: TargetMeta> ErasedTarget<M> {
    fn restore(&self, change: HostChange<AnyMeta>) -> HostChange<M> {
        let HostChange { change_type, host } = change;

        let meta = host.meta.and_then(|meta| {
            let restored = meta.downcast_ref::<M>().cloned();
            if restored.is_none() {
                warn!(
                    "[Apply] Dropping foreign metadata {:?} on \"{}\" for target \"{}\"",
                    meta,
                    host.name,
                    self.inner.name()
                );
            }
            restored
        });

        HostChange {
            change_type,
            host: Host {
                id: host.id,
                name: host.name,
                meta,
            },
        }
    }
}

#[async_trait]
impl<M: TargetMeta> Target for ErasedTarget<M> {
    type Meta = AnyMeta;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn setup(&self) -> Result<()> {
        self.inner.setup().await
    }

    async fn get_hosts(&self) -> Result<Vec<Host<AnyMeta>>> {
        let hosts = self.inner.get_hosts().await?;
        Ok(hosts.into_iter().map(erase_host).collect())
    }

    async fn apply(&self, changes: Vec<HostChange<AnyMeta>>) -> Result<()> {
        let changes = changes
            .into_iter()
            .map(|change| self.restore(change))
            .collect();
        self.inner.apply(changes).await
    }

    fn cached_host(&self, name: &str) -> Option<Host<AnyMeta>> {
        self.inner.cached_host(name).map(erase_host)
    }
}

/// Wrap a typed target so it can share an `Operations<AnyMeta>` with others
pub fn erase_target<M: TargetMeta>(
    target: Arc<dyn Target<Meta = M>>,
) -> Arc<dyn Target<Meta = AnyMeta>> {
    Arc::new(ErasedTarget { inner: target })
}

/// Factory adapter whose targets come out wrapped by [`erase_target`]
pub struct ErasedFactory<M: TargetMeta> {
    inner: Box<dyn TargetFactory<M>>,
}

impl<M: TargetMeta> ErasedFactory<M> {
    /// Wrap a typed factory
    pub fn new(inner: Box<dyn TargetFactory<M>>) -> Self {
        Self { inner }
    }
}

impl<M: TargetMeta> TargetFactory<AnyMeta> for ErasedFactory<M> {
    fn create(&self, config: &TargetConfig) -> Result<Arc<dyn Target<Meta = AnyMeta>>> {
        self.inner.create(config).map(erase_target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ChangeType;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct RecordId(u32);

    struct RecordingTarget {
        applied: Mutex<Vec<HostChange<RecordId>>>,
    }

    #[async_trait]
    impl Target for RecordingTarget {
        type Meta = RecordId;

        fn name(&self) -> &str {
            "recording"
        }

        async fn setup(&self) -> Result<()> {
            Ok(())
        }

        async fn get_hosts(&self) -> Result<Vec<Host<RecordId>>> {
            Ok(vec![Host::new("r7", "app.example").with_meta(RecordId(7))])
        }

        async fn apply(&self, changes: Vec<HostChange<RecordId>>) -> Result<()> {
            self.applied.lock().unwrap().extend(changes);
            Ok(())
        }

        fn cached_host(&self, name: &str) -> Option<Host<RecordId>> {
            (name == "app.example").then(|| Host::new("r7", name).with_meta(RecordId(7)))
        }
    }

    #[test]
    fn test_any_meta_downcast() {
        let meta = AnyMeta::new(RecordId(3));

        assert_eq!(meta.downcast_ref::<RecordId>(), Some(&RecordId(3)));
        assert_eq!(meta.downcast_ref::<String>(), None);
        assert_eq!(format!("{:?}", meta), "RecordId(3)");
    }

    #[tokio::test]
    async fn test_erased_target_round_trips_metadata() {
        let typed = Arc::new(RecordingTarget {
            applied: Mutex::new(Vec::new()),
        });
        let erased = erase_target(typed.clone() as Arc<dyn Target<Meta = RecordId>>);

        assert_eq!(erased.name(), "recording");

        let hosts = erased.get_hosts().await.unwrap();
        let removal = HostChange::remove(hosts[0].clone());
        let foreign =
            HostChange::remove(Host::new("x", "other.example").with_meta(AnyMeta::new(1u8)));
        erased.apply(vec![removal, foreign]).await.unwrap();

        let applied = typed.applied.lock().unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].change_type, ChangeType::Remove);
        assert_eq!(applied[0].host.meta, Some(RecordId(7)));
        assert_eq!(applied[1].host.meta, None);

        let cached = erased.cached_host("app.example").unwrap();
        assert_eq!(cached.meta.unwrap().downcast_ref::<RecordId>(), Some(&RecordId(7)));
        assert!(erased.cached_host("missing.example").is_none());
    }
}
