//! Minimal embedding example for hostsync-core
//!
//! This example drives the reconciler with in-memory adapters: a provider whose
//! host set the application edits directly, and a target that keeps its
//! records in a map. The scheduler, history and lifecycle are fully managed by
//! the application.

use hostsync_core::config::{EngineConfig, EventMode};
use hostsync_core::traits::ChangeStream;
use hostsync_core::{
    ExecutionLog, Host, HostChange, MemoryExecutionLog, Operations, Provider, Result, Scheduler,
    SystemSummary, Target, history,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Provider whose hosts are set by the application
struct EmbeddedProvider {
    hosts: Mutex<Vec<Host>>,
    events: Mutex<Option<UnboundedReceiver<Vec<HostChange>>>>,
}

impl EmbeddedProvider {
    fn new(names: &[&str]) -> (Self, UnboundedSender<Vec<HostChange>>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let provider = Self {
            hosts: Mutex::new(names.iter().map(|n| Host::new(*n, *n)).collect()),
            events: Mutex::new(Some(rx)),
        };
        (provider, tx)
    }

    fn set_hosts(&self, names: &[&str]) {
        *self.hosts.lock().unwrap() = names.iter().map(|n| Host::new(*n, *n)).collect();
    }
}

#[async_trait::async_trait]
impl Provider for EmbeddedProvider {
    fn name(&self) -> &str {
        "embedded-provider"
    }

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn get_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.hosts.lock().unwrap().clone())
    }

    fn subscribe(&self) -> ChangeStream {
        match self.events.lock().unwrap().take() {
            Some(rx) => Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::empty()),
        }
    }
}

/// Target keeping records in a map keyed by hostname
struct EmbeddedTarget {
    records: Mutex<BTreeMap<String, String>>,
    next_id: AtomicUsize,
}

impl EmbeddedTarget {
    fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    fn names(&self) -> Vec<String> {
        self.records.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Target for EmbeddedTarget {
    type Meta = ();

    fn name(&self) -> &str {
        "embedded-target"
    }

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn get_hosts(&self) -> Result<Vec<Host>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(name, id)| Host::new(id.as_str(), name.as_str()))
            .collect())
    }

    async fn apply(&self, changes: Vec<HostChange>) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        for change in changes {
            println!("[Embedded] Applying {}", change);
            match change.change_type {
                hostsync_core::ChangeType::Add => {
                    let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                    records.insert(change.host.name, id);
                }
                hostsync_core::ChangeType::Remove => {
                    records.remove(&change.host.name);
                }
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Embedded hostsync-core Example ===\n");

    let (provider, events) = EmbeddedProvider::new(&["app.example", "api.example"]);
    let provider = Arc::new(provider);
    let target = Arc::new(EmbeddedTarget::new());

    let engine = EngineConfig {
        add_delay_secs: 1,
        remove_delay_secs: 2,
        sync_interval_secs: 3600,
        event_channel_capacity: 100,
        dry_run: false,
        event_mode: EventMode::Direct,
    };

    println!("1. Creating reconciler...");
    let scheduler = Scheduler::with_subscriber_capacity(engine.event_channel_capacity);
    let operations = Arc::new(Operations::new(
        scheduler.clone(),
        vec![provider.clone() as Arc<dyn Provider>],
        vec![target.clone() as Arc<dyn Target<Meta = ()>>],
        &engine,
    ));
    operations.setup().await?;

    let log = Arc::new(MemoryExecutionLog::new());
    let recorder = history::spawn_recorder(&scheduler, log.clone(), engine.dry_run);

    println!("2. Starting periodic sync and provider listener...");
    let listeners = operations.watch_providers(engine.event_mode);
    operations.schedule_periodic_sync(engine.sync_interval())?;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    println!("   Target now holds: {:?}", target.names());

    println!("\n3. Provider drops api.example and announces web.example...");
    provider.set_hosts(&["app.example", "web.example"]);
    let _ = events.send(vec![
        HostChange::add(Host::new("web.example", "web.example")),
        HostChange::remove(Host::new("api.example", "api.example")),
    ]);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    println!("   Target now holds: {:?}", target.names());

    println!("\n4. Execution history (newest first):");
    for entry in log.list(0, 10).await? {
        println!(
            "   {} {} {} on {}",
            entry.timestamp.to_rfc3339(),
            entry.operation_type,
            entry.hostname,
            entry.target.as_deref().unwrap_or("-")
        );
    }

    let summary = SystemSummary::collect(&*operations, chrono::Utc::now(), engine.dry_run);
    println!("\n5. Summary: {}", serde_json::to_string_pretty(&summary)?);

    println!("\n6. Shutting down...");
    for listener in listeners {
        listener.abort();
    }
    println!("   Cancelled {} pending job(s)", scheduler.cancel_all());
    recorder.abort();

    println!("\n=== Embedding Successful ===");
    Ok(())
}
