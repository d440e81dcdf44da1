// # Docker Provider
//
// This crate provides a Docker-backed host provider for hostsync.
//
// Containers opt in through labels:
//
// ```text
// hostsync.hostname=app.example.com   # required, the published hostname
// hostsync.enable=true                # only when an enable label is configured
// ```
//
// ## Architecture
//
// - `get_hosts()` lists running containers (`GET {api}/containers/json`)
// - `subscribe()` follows the Engine event stream (`GET {api}/events`), a
//   never-ending sequence of JSON objects separated by newlines. `start`
//   becomes an add; `stop`, `kill` and `die` become removes.
// - When the event stream ends or fails it is reopened after a short pause
//
// The Engine API must be reachable over HTTP (TCP listener or a socket proxy).

use hostsync_core::config::ProviderConfig;
use hostsync_core::host::{Host, HostChange};
use hostsync_core::registry::AdapterRegistry;
use hostsync_core::traits::{ChangeStream, Provider, ProviderFactory, TargetMeta};
use hostsync_core::{Error, Result};

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Provider name used in logs and the registry
pub const PROVIDER_NAME: &str = "docker";

/// Container events that change the host set
const WATCHED_EVENTS: &[&str] = &["start", "stop", "kill", "die"];

/// Pause before reopening a dropped event stream
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Timeout for one-shot requests (the event stream has none)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Container entry from `GET /containers/json`
#[derive(Debug, Clone, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Labels", default)]
    labels: HashMap<String, String>,
}

/// Event from `GET /events`
#[derive(Debug, Clone, Deserialize)]
struct DockerEvent {
    #[serde(rename = "Type", default)]
    event_type: String,
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: Actor,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Actor {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

/// Label selection rules
#[derive(Debug, Clone)]
struct LabelFilter {
    hostname: String,
    enable: Option<String>,
}

impl LabelFilter {
    /// Hostname published by a label set, if the container opted in
    fn hostname<'a>(&self, labels: &'a HashMap<String, String>) -> Option<&'a str> {
        if let Some(enable) = &self.enable
            && labels.get(enable).map(String::as_str) != Some("true")
        {
            return None;
        }

        labels
            .get(&self.hostname)
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
    }

    /// One host per published hostname, the first container listed wins
    fn hosts(&self, containers: &[ContainerSummary]) -> Vec<Host> {
        let mut seen = HashSet::new();
        let mut hosts = Vec::new();

        for container in containers {
            let Some(name) = self.hostname(&container.labels) else {
                continue;
            };
            if !seen.insert(name) {
                tracing::debug!(
                    "[Get Docker Containers] \"{}\" also published by {}, ignoring",
                    name,
                    container.id
                );
                continue;
            }
            hosts.push(Host::new(container.id.as_str(), name));
        }

        hosts
    }

    /// Turn an event into a change, when it concerns an opted-in container
    fn change_for(&self, event: &DockerEvent) -> Option<HostChange> {
        if event.event_type != "container" || !WATCHED_EVENTS.contains(&event.action.as_str()) {
            return None;
        }

        let name = self.hostname(&event.actor.attributes)?;
        let host = Host::new(event.actor.id.as_str(), name);

        Some(if event.action == "start" {
            HostChange::add(host)
        } else {
            HostChange::remove(host)
        })
    }
}

/// Splits a chunked byte stream into newline-terminated JSON events
#[derive(Debug, Default)]
struct EventDecoder {
    buffer: Vec<u8>,
}

impl EventDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<DockerEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_slice::<DockerEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!("[Docker Event] Unparseable event skipped: {}", e),
            }
        }

        events
    }
}

/// Docker container label provider
pub struct DockerProvider {
    /// Engine API base URL, without trailing slash
    api_url: String,

    /// Label selection rules
    labels: LabelFilter,

    /// Client for one-shot requests
    client: reqwest::Client,

    /// Client for the long-lived event stream (no overall timeout)
    stream_client: reqwest::Client,
}

impl DockerProvider {
    /// Create a new Docker provider
    pub fn new(
        api_url: impl Into<String>,
        label_hostname: impl Into<String>,
        label_enable: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let stream_client = reqwest::Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            labels: LabelFilter {
                hostname: label_hostname.into(),
                enable: label_enable.filter(|label| !label.is_empty()),
            },
            client,
            stream_client,
        })
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let response = self
            .client
            .get(format!("{}/containers/json", self.api_url))
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("HTTP error: {}", response.status()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Invalid container list: {}", e)))
    }

    fn events_filter() -> String {
        serde_json::json!({
            "type": ["container"],
            "event": WATCHED_EVENTS,
        })
        .to_string()
    }
}

/// Follow one event stream connection until it ends or the receiver is gone
///
/// Returns `false` once the receiver has been dropped.
async fn follow_events(
    client: &reqwest::Client,
    api_url: &str,
    labels: &LabelFilter,
    tx: &UnboundedSender<Vec<HostChange>>,
) -> Result<bool> {
    let response = client
        .get(format!("{}/events", api_url))
        .query(&[("filters", DockerProvider::events_filter())])
        .send()
        .await
        .map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("Event stream request failed: {}", e))
        })?;

    if !response.status().is_success() {
        return Err(Error::provider(
            PROVIDER_NAME,
            format!("Event stream HTTP error: {}", response.status()),
        ));
    }

    let mut decoder = EventDecoder::default();
    let body = response.bytes_stream();
    tokio::pin!(body);

    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Event stream failed: {}", e)))?;

        for event in decoder.push(&chunk) {
            let Some(change) = labels.change_for(&event) else {
                tracing::trace!("[Docker Event] Ignored {} {}", event.action, event.actor.id);
                continue;
            };

            tracing::info!("[Docker Event] {} {}", event.action, change.host.name);

            if tx.send(vec![change]).is_err() {
                return Ok(false);
            }
        }
    }

    Ok(!tx.is_closed())
}

#[async_trait::async_trait]
impl Provider for DockerProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn setup(&self) -> Result<()> {
        tracing::info!("Docker Api Url={}", self.api_url);
        tracing::info!("Docker Label Hostname={}", self.labels.hostname);
        tracing::info!(
            "Docker Label Enable={}",
            self.labels.enable.as_deref().unwrap_or("<none>")
        );

        self.list_containers().await?;

        tracing::info!("[Docker Connection] Connection verified");
        Ok(())
    }

    async fn get_hosts(&self) -> Result<Vec<Host>> {
        let containers = self.list_containers().await?;

        let hosts = self.labels.hosts(&containers);

        tracing::debug!(
            "[Get Docker Containers] {}",
            hosts
                .iter()
                .map(|h| format!("{}={}", h.id, h.name))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(hosts)
    }

    fn subscribe(&self) -> ChangeStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let api_url = self.api_url.clone();
        let labels = self.labels.clone();
        let client = self.stream_client.clone();

        tokio::spawn(async move {
            loop {
                match follow_events(&client, &api_url, &labels, &tx).await {
                    Ok(false) => break,
                    Ok(true) => tracing::warn!("[Docker Event] Event stream ended, reconnecting"),
                    Err(e) => tracing::error!("[Docker Event Error] {}", e),
                }

                tokio::time::sleep(RECONNECT_DELAY).await;
                if tx.is_closed() {
                    break;
                }
            }

            tracing::debug!("[Docker Event] Receiver dropped, stopping event stream");
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

/// Factory for creating Docker providers
pub struct DockerFactory;

impl ProviderFactory for DockerFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        match config {
            ProviderConfig::Docker {
                api_url,
                label_hostname,
                label_enable,
            } => Ok(Arc::new(DockerProvider::new(
                api_url.clone(),
                label_hostname.clone(),
                label_enable.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for Docker provider")),
        }
    }
}

/// Register the Docker provider with a registry
pub fn register<M: TargetMeta>(registry: &AdapterRegistry<M>) {
    registry.register_provider(PROVIDER_NAME, Box::new(DockerFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostsync_core::host::ChangeType;

    fn filter(enable: Option<&str>) -> LabelFilter {
        LabelFilter {
            hostname: "hostsync.hostname".to_string(),
            enable: enable.map(str::to_string),
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn event(action: &str, attributes: &[(&str, &str)]) -> DockerEvent {
        DockerEvent {
            event_type: "container".to_string(),
            action: action.to_string(),
            actor: Actor {
                id: "abc123".to_string(),
                attributes: labels(attributes),
            },
        }
    }

    #[test]
    fn test_factory_creation() {
        let config = ProviderConfig::Docker {
            api_url: "http://localhost:2375".to_string(),
            label_hostname: "hostsync.hostname".to_string(),
            label_enable: None,
        };

        let provider = DockerFactory.create(&config).unwrap();
        assert_eq!(provider.name(), "docker");
    }

    #[test]
    fn test_hostname_label() {
        let f = filter(None);
        assert_eq!(
            f.hostname(&labels(&[("hostsync.hostname", "app.example")])),
            Some("app.example")
        );
        assert_eq!(f.hostname(&labels(&[("other", "x")])), None);
        assert_eq!(f.hostname(&labels(&[("hostsync.hostname", " ")])), None);
    }

    #[test]
    fn test_enable_label_must_be_true() {
        let f = filter(Some("hostsync.enable"));
        let name = ("hostsync.hostname", "app.example");

        assert_eq!(f.hostname(&labels(&[name])), None);
        assert_eq!(f.hostname(&labels(&[name, ("hostsync.enable", "false")])), None);
        assert_eq!(
            f.hostname(&labels(&[name, ("hostsync.enable", "true")])),
            Some("app.example")
        );
    }

    #[test]
    fn test_event_mapping() {
        let f = filter(None);
        let attrs = [("hostsync.hostname", "app.example"), ("name", "web")];

        let add = f.change_for(&event("start", &attrs)).unwrap();
        assert_eq!(add.change_type, ChangeType::Add);
        assert_eq!(add.host, Host::new("abc123", "app.example"));

        for action in ["stop", "kill", "die"] {
            let remove = f.change_for(&event(action, &attrs)).unwrap();
            assert_eq!(remove.change_type, ChangeType::Remove);
        }

        assert!(f.change_for(&event("pause", &attrs)).is_none());
        assert!(f.change_for(&event("start", &[("name", "web")])).is_none());
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = EventDecoder::default();
        let line = r#"{"status":"start","id":"abc123","Type":"container","Action":"start","Actor":{"ID":"abc123","Attributes":{"hostsync.hostname":"app.example"}},"time":1700000000}"#;
        let (head, tail) = line.split_at(40);

        assert!(decoder.push(head.as_bytes()).is_empty());
        let events = decoder.push(format!("{}\n", tail).as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "start");
        assert_eq!(events[0].actor.attributes["hostsync.hostname"], "app.example");
    }

    #[test]
    fn test_decoder_skips_garbage() {
        let mut decoder = EventDecoder::default();
        let events = decoder.push(b"not json\n\n{\"Type\":\"container\",\"Action\":\"die\"}\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "die");
    }

    #[test]
    fn test_container_list_parsing() {
        let json = r#"[
            {"Id": "c1", "Names": ["/web"], "Labels": {"hostsync.hostname": "web.example"}},
            {"Id": "c2", "Names": ["/db"], "Labels": {}}
        ]"#;

        let containers: Vec<ContainerSummary> = serde_json::from_str(json).unwrap();
        let f = filter(None);
        let named: Vec<&str> = containers.iter().filter_map(|c| f.hostname(&c.labels)).collect();
        assert_eq!(named, vec!["web.example"]);
    }

    #[test]
    fn test_shared_hostname_reported_once() {
        let json = r#"[
            {"Id": "c1", "Labels": {"hostsync.hostname": "web.example"}},
            {"Id": "c2", "Labels": {"hostsync.hostname": " web.example "}},
            {"Id": "c3", "Labels": {"hostsync.hostname": "api.example"}}
        ]"#;

        let containers: Vec<ContainerSummary> = serde_json::from_str(json).unwrap();
        let hosts = filter(None).hosts(&containers);

        let pairs: Vec<(&str, &str)> = hosts
            .iter()
            .map(|h| (h.id.as_str(), h.name.as_str()))
            .collect();
        assert_eq!(pairs, vec![("c1", "web.example"), ("c3", "api.example")]);
    }
}
