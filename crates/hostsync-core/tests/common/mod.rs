//! Test doubles and common utilities for reconciliation contract tests
//!
//! The doubles keep their state behind shared handles so a test can hand one
//! clone to `Operations` and keep another to drive and inspect it.

#![allow(dead_code)]

use hostsync_core::error::{Error, Result};
use hostsync_core::host::{Host, HostChange};
use hostsync_core::traits::{ChangeStream, Provider, Target};
use hostsync_core::{EngineConfig, Operations, Scheduler};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Target metadata used by the doubles: the zone a record lives in
pub type ZoneMeta = String;

/// Settle windows used by every contract test
pub const ADD_DELAY: Duration = Duration::from_secs(10);
pub const REMOVE_DELAY: Duration = Duration::from_secs(300);

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        add_delay_secs: ADD_DELAY.as_secs(),
        remove_delay_secs: REMOVE_DELAY.as_secs(),
        ..EngineConfig::default()
    }
}

pub fn names(hosts: &[&str]) -> Vec<Host> {
    hosts.iter().map(|name| Host::new(*name, *name)).collect()
}

/// A provider whose host set and change stream are driven by the test
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    hosts: Arc<Mutex<Vec<Host>>>,
    fail: Arc<AtomicBool>,
    get_hosts_calls: Arc<AtomicUsize>,
    events_tx: mpsc::UnboundedSender<Vec<HostChange>>,
    events_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Vec<HostChange>>>>>,
}

impl MockProvider {
    pub fn new(name: &str, hosts: &[&str]) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            hosts: Arc::new(Mutex::new(names(hosts))),
            fail: Arc::new(AtomicBool::new(false)),
            get_hosts_calls: Arc::new(AtomicUsize::new(0)),
            events_tx,
            events_rx: Arc::new(Mutex::new(Some(events_rx))),
        }
    }

    pub fn set_hosts(&self, hosts: &[&str]) {
        *self.hosts.lock().unwrap() = names(hosts);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn get_hosts_calls(&self) -> usize {
        self.get_hosts_calls.load(Ordering::SeqCst)
    }

    /// Push a change batch to whoever subscribed
    pub fn emit(&self, changes: Vec<HostChange>) {
        let _ = self.events_tx.send(changes);
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn get_hosts(&self) -> Result<Vec<Host>> {
        self.get_hosts_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::provider(&self.name, "upstream unavailable"));
        }
        Ok(self.hosts.lock().unwrap().clone())
    }

    fn subscribe(&self) -> ChangeStream {
        let rx = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once");

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

/// A target that records every `apply()` call
#[derive(Clone)]
pub struct MockTarget {
    name: String,
    hosts: Arc<Mutex<Vec<Host<ZoneMeta>>>>,
    applied: Arc<Mutex<Vec<Vec<HostChange<ZoneMeta>>>>>,
    fail_apply: Arc<AtomicBool>,
    fail_fetch: Arc<AtomicBool>,
    apply_attempts: Arc<AtomicUsize>,
}

impl MockTarget {
    pub fn new(name: &str, hosts: &[&str]) -> Self {
        let target = Self {
            name: name.to_string(),
            hosts: Arc::new(Mutex::new(Vec::new())),
            applied: Arc::new(Mutex::new(Vec::new())),
            fail_apply: Arc::new(AtomicBool::new(false)),
            fail_fetch: Arc::new(AtomicBool::new(false)),
            apply_attempts: Arc::new(AtomicUsize::new(0)),
        };
        target.set_hosts(hosts);
        target
    }

    /// Replace the record set; record ids are `rec-<hostname>`
    pub fn set_hosts(&self, hosts: &[&str]) {
        *self.hosts.lock().unwrap() = hosts
            .iter()
            .map(|name| Host::new(format!("rec-{}", name), *name).with_meta("zone-1".to_string()))
            .collect();
    }

    pub fn set_failing_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::SeqCst);
    }

    pub fn set_failing_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Every successful `apply()` call, in order
    pub fn applied(&self) -> Vec<Vec<HostChange<ZoneMeta>>> {
        self.applied.lock().unwrap().clone()
    }

    pub fn apply_attempts(&self) -> usize {
        self.apply_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Target for MockTarget {
    type Meta = ZoneMeta;

    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    async fn get_hosts(&self) -> Result<Vec<Host<ZoneMeta>>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::target(&self.name, "zone unavailable"));
        }
        Ok(self.hosts.lock().unwrap().clone())
    }

    async fn apply(&self, changes: Vec<HostChange<ZoneMeta>>) -> Result<()> {
        self.apply_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(Error::target(&self.name, "write rejected"));
        }
        self.applied.lock().unwrap().push(changes);
        Ok(())
    }

    fn cached_host(&self, name: &str) -> Option<Host<ZoneMeta>> {
        self.hosts
            .lock()
            .unwrap()
            .iter()
            .find(|host| host.name == name)
            .cloned()
    }
}

/// Wire one provider and one target into a fresh scheduler
pub fn operations(
    provider: &MockProvider,
    target: &MockTarget,
) -> (Arc<Operations<ZoneMeta>>, Scheduler) {
    let scheduler = Scheduler::new();
    let operations = Operations::new(
        scheduler.clone(),
        vec![Arc::new(provider.clone()) as Arc<dyn Provider>],
        vec![Arc::new(target.clone()) as Arc<dyn Target<Meta = ZoneMeta>>],
        &engine_config(),
    );
    (Arc::new(operations), scheduler)
}
