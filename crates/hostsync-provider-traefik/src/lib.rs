// # Traefik Provider
//
// This crate provides a Traefik-backed host provider for hostsync.
//
// ## Architecture
//
// Traefik has no push API, so the provider polls the router table
// (`GET {api}/http/routers`) and derives hosts from `Host(...)` matchers in
// router rules. Each poll is diffed against the previous one and the
// differences are emitted as one change batch.
//
// ## Filtering
//
// - Only routers with status `enabled`
// - Routers of Traefik's own `internal` provider are skipped
// - Routers without a rule or without a `Host(...)` matcher yield nothing
// - A hostname claimed by several routers is reported once (first wins)

use hostsync_core::config::ProviderConfig;
use hostsync_core::host::{Host, HostChange};
use hostsync_core::registry::AdapterRegistry;
use hostsync_core::traits::{ChangeStream, Provider, ProviderFactory, TargetMeta};
use hostsync_core::{Error, Result};

use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Provider name used in logs and the registry
pub const PROVIDER_NAME: &str = "traefik";

/// HTTP timeout for Traefik API requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Router entry from `GET /api/http/routers`
#[derive(Debug, Clone, Deserialize)]
struct Router {
    #[serde(default)]
    service: String,
    #[serde(default)]
    rule: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    provider: String,
}

/// Extract the hostnames of every `Host(...)` matcher in a router rule
///
/// ```text
/// Host(`a.example`, `b.example`) && PathPrefix(`/api`)  ->  [a.example, b.example]
/// ```
fn parse_host_rule(rule: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = rule;

    while let Some(start) = rest.find("Host(") {
        let args = &rest[start + "Host(".len()..];
        let Some(end) = args.find(')') else {
            break;
        };

        names.extend(
            args[..end]
                .split(',')
                .map(|name| name.trim().trim_matches(|c| c == '`' || c == '"').trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        );

        rest = &args[end..];
    }

    names
}

/// Turn a router table into hosts
fn routers_to_hosts(routers: &[Router]) -> Vec<Host> {
    let mut seen = HashSet::new();
    let mut hosts = Vec::new();

    for router in routers {
        if router.status != "enabled" || router.rule.is_empty() || router.provider == "internal" {
            continue;
        }

        for name in parse_host_rule(&router.rule) {
            if seen.insert(name.clone()) {
                hosts.push(Host::new(router.service.as_str(), name));
            } else {
                tracing::debug!("[Get Traefik Hosts] Duplicate host {} found, skipping", name);
            }
        }
    }

    hosts
}

/// Changes that turn `previous` into `current`, keyed by hostname
fn poll_changes(previous: &[Host], current: &[Host]) -> Vec<HostChange> {
    let before: HashSet<&str> = previous.iter().map(|h| h.name.as_str()).collect();
    let after: HashSet<&str> = current.iter().map(|h| h.name.as_str()).collect();

    let added = current
        .iter()
        .filter(|h| !before.contains(h.name.as_str()))
        .cloned()
        .map(HostChange::add);
    let removed = previous
        .iter()
        .filter(|h| !after.contains(h.name.as_str()))
        .cloned()
        .map(HostChange::remove);

    added.chain(removed).collect()
}

async fn fetch_hosts(client: &reqwest::Client, api_url: &str) -> Result<Vec<Host>> {
    let response = client
        .get(format!("{}/http/routers", api_url))
        .send()
        .await
        .map_err(|e| Error::provider(PROVIDER_NAME, format!("Request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::provider(
            PROVIDER_NAME,
            format!("HTTP error: {}", response.status()),
        ));
    }

    let routers: Vec<Router> = response
        .json()
        .await
        .map_err(|e| Error::provider(PROVIDER_NAME, format!("Invalid router list: {}", e)))?;

    let hosts = routers_to_hosts(&routers);
    tracing::debug!(
        "[Get Traefik Hosts] {}",
        hosts.iter().map(|h| h.name.as_str()).collect::<Vec<_>>().join(", ")
    );

    Ok(hosts)
}

/// Traefik router provider
pub struct TraefikProvider {
    /// Traefik API base URL, without trailing slash
    api_url: String,

    /// Interval between router polls
    poll_interval: Duration,

    /// Hosts seen by the last poll
    previous: Arc<Mutex<Vec<Host>>>,

    /// HTTP client
    client: reqwest::Client,
}

impl TraefikProvider {
    /// Create a new Traefik provider
    pub fn new(api_url: impl Into<String>, poll_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            poll_interval,
            previous: Arc::new(Mutex::new(Vec::new())),
            client,
        })
    }
}

#[async_trait::async_trait]
impl Provider for TraefikProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn setup(&self) -> Result<()> {
        tracing::info!("Traefik Api Url={}", self.api_url);
        tracing::info!("Traefik Poll Interval={:?}", self.poll_interval);

        let response = self
            .client
            .get(format!("{}/version", self.api_url))
            .send()
            .await
            .map_err(|e| {
                Error::provider(PROVIDER_NAME, format!("Error verifying connection: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("Error verifying connection: {}", response.status()),
            ));
        }

        *self.previous.lock().await = self.get_hosts().await?;

        tracing::info!("[Traefik Test Connection] Connection verified");
        Ok(())
    }

    async fn get_hosts(&self) -> Result<Vec<Host>> {
        fetch_hosts(&self.client, &self.api_url).await
    }

    fn subscribe(&self) -> ChangeStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let api_url = self.api_url.clone();
        let poll_interval = self.poll_interval;
        let previous = self.previous.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            tracing::info!(
                "[Traefik] Traefik has no live events, polling every {:?}",
                poll_interval
            );

            let first_poll = Instant::now() + poll_interval;
            let mut ticker = tokio::time::interval_at(first_poll, poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                if tx.is_closed() {
                    tracing::debug!("[Traefik Events] Receiver dropped, stopping poll");
                    break;
                }

                tracing::debug!("[Traefik Events] Polling...");

                let current = match fetch_hosts(&client, &api_url).await {
                    Ok(hosts) => hosts,
                    Err(e) => {
                        tracing::warn!("[Traefik Events] Poll failed: {}", e);
                        continue;
                    }
                };

                let changes = {
                    let mut previous = previous.lock().await;
                    let changes = poll_changes(&previous, &current);
                    *previous = current;
                    changes
                };

                if changes.is_empty() {
                    continue;
                }

                tracing::info!(
                    "[Traefik Events] {} change(s) found: {}",
                    changes.len(),
                    changes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                );

                if tx.send(changes).is_err() {
                    break;
                }
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

/// Factory for creating Traefik providers
pub struct TraefikFactory;

impl ProviderFactory for TraefikFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        match config {
            ProviderConfig::Traefik {
                api_url,
                poll_interval_secs,
            } => Ok(Arc::new(TraefikProvider::new(
                api_url.clone(),
                Duration::from_secs(*poll_interval_secs),
            )?)),
            _ => Err(Error::config("Invalid config for Traefik provider")),
        }
    }
}

/// Register the Traefik provider with a registry
pub fn register<M: TargetMeta>(registry: &AdapterRegistry<M>) {
    registry.register_provider(PROVIDER_NAME, Box::new(TraefikFactory));
}
