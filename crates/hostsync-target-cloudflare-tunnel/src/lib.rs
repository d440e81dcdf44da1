// # Cloudflare Tunnel Target
//
// This crate provides a target that routes hostnames through a remotely
// managed Cloudflare Tunnel. Every managed hostname is one ingress rule of the
// tunnel configuration:
//
// ```yaml
// ingress:
//   - hostname: app.example.com
//     service: http://traefik:80
//   - service: http_status:404      # catch-all, always last
// ```
//
// ## Behavior
//
// - `get_hosts()` reads the tunnel configuration and reports one host per
//   ingress hostname. The catch-all rule has no hostname and is never
//   reported.
// - `apply()` re-reads the configuration, inserts a rule for each `add` just
//   before the catch-all, drops the rule for each `remove`, and writes the
//   whole configuration back. Unknown fields of the configuration survive the
//   round trip.
// - DNS records are left alone; run `hostsync-target-cloudflare` next to this
//   target for the CNAMEs.
// - Dry-run mode performs all reads and logs the configuration it would write.
//
// ## API Reference
//
// - Verify Token: GET `/user/tokens/verify`
// - Tunnel Details: GET `/accounts/:account_id/cfd_tunnel/:tunnel_id`
// - Get Configuration: GET `/accounts/:account_id/cfd_tunnel/:tunnel_id/configurations`
// - Put Configuration: PUT `/accounts/:account_id/cfd_tunnel/:tunnel_id/configurations`

use async_trait::async_trait;
use hostsync_core::config::TargetConfig;
use hostsync_core::host::{ChangeType, Host, HostChange};
use hostsync_core::registry::AdapterRegistry;
use hostsync_core::traits::{AnyMeta, ErasedFactory, Target, TargetFactory};
use hostsync_core::{Error, Result};
use hostsync_target_cloudflare::api::{self, ApiResponse, CLOUDFLARE_API_BASE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Target name used in job ids and logs
pub const TARGET_NAME: &str = "cloudflare-tunnel";

/// Service of the catch-all rule added when a configuration has none
const CATCH_ALL_SERVICE: &str = "http_status:404";

/// Metadata the tunnel target attaches to the hosts it reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRuleMeta {
    /// Tunnel holding the rule
    pub tunnel_id: String,
    /// Origin service the hostname routes to
    pub service: String,
}

/// One ingress rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IngressRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,
    service: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl IngressRule {
    fn route(hostname: &str, service: &str) -> Self {
        Self {
            hostname: Some(hostname.to_string()),
            service: service.to_string(),
            extra: Map::new(),
        }
    }

    fn catch_all() -> Self {
        Self {
            hostname: None,
            service: CATCH_ALL_SERVICE.to_string(),
            extra: Map::new(),
        }
    }
}

/// The `config` object of a tunnel configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TunnelConfig {
    #[serde(default)]
    ingress: Vec<IngressRule>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Result of `GET .../configurations`
#[derive(Debug, Deserialize)]
struct TunnelConfiguration {
    #[serde(default)]
    config: Option<TunnelConfig>,
    #[serde(default)]
    version: u64,
}

/// Hosts routed by `config`, one per hostname, the first rule winning
fn routed_hosts(config: &TunnelConfig, tunnel_id: &str) -> Vec<Host<IngressRuleMeta>> {
    let mut seen = HashSet::new();

    config
        .ingress
        .iter()
        .filter_map(|rule| {
            let hostname = rule.hostname.as_deref()?;
            seen.insert(hostname).then(|| {
                Host::new(rule.service.as_str(), hostname).with_meta(IngressRuleMeta {
                    tunnel_id: tunnel_id.to_string(),
                    service: rule.service.clone(),
                })
            })
        })
        .collect()
}

/// `config` with a rule routing `hostname` to `service`
///
/// The rule goes right before the first rule without a hostname, which
/// cloudflared treats as the catch-all. A configuration without a catch-all
/// gets one. Returns `None` when `hostname` is already routed.
fn with_route(config: &TunnelConfig, hostname: &str, service: &str) -> Option<TunnelConfig> {
    if config
        .ingress
        .iter()
        .any(|rule| rule.hostname.as_deref() == Some(hostname))
    {
        return None;
    }

    let mut updated = config.clone();
    let rule = IngressRule::route(hostname, service);

    match updated.ingress.iter().position(|rule| rule.hostname.is_none()) {
        Some(index) => updated.ingress.insert(index, rule),
        None => {
            updated.ingress.push(rule);
            updated.ingress.push(IngressRule::catch_all());
        }
    }

    Some(updated)
}

/// `config` without the rules for `hostname`, or `None` when it has none
fn without_route(config: &TunnelConfig, hostname: &str) -> Option<TunnelConfig> {
    let mut updated = config.clone();
    updated
        .ingress
        .retain(|rule| rule.hostname.as_deref() != Some(hostname));

    (updated.ingress.len() != config.ingress.len()).then_some(updated)
}

/// Cloudflare Tunnel ingress target
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the target will:
/// - Perform all GET requests (token, tunnel and configuration checks)
/// - Log the configuration it would PUT
/// - **NOT** modify the tunnel
pub struct CloudflareTunnelTarget {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Account owning the tunnel
    account_id: String,

    /// Tunnel whose ingress rules are managed
    tunnel_id: String,

    /// Origin service new rules route to
    service: String,

    /// API base URL (overridable for tests and proxies)
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: read but never write
    dry_run: bool,

    /// Configuration seen by the last read or write
    cache: Mutex<TunnelConfig>,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareTunnelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareTunnelTarget")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("tunnel_id", &self.tunnel_id)
            .field("service", &self.service)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareTunnelTarget {
    /// Create a new Cloudflare Tunnel target
    ///
    /// # Errors
    ///
    /// Returns a configuration error when any parameter is empty or the HTTP
    /// client cannot be built.
    pub fn new(
        api_token: impl Into<String>,
        account_id: impl Into<String>,
        tunnel_id: impl Into<String>,
        service: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        let account_id = account_id.into();
        let tunnel_id = tunnel_id.into();
        let service = service.into();

        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        if account_id.is_empty() {
            return Err(Error::config("Cloudflare account ID cannot be empty"));
        }
        if tunnel_id.is_empty() {
            return Err(Error::config("Cloudflare tunnel ID cannot be empty"));
        }
        if service.is_empty() {
            return Err(Error::config("Tunnel ingress service cannot be empty"));
        }

        Ok(Self {
            api_token,
            account_id,
            tunnel_id,
            service,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client: api::build_client()?,
            dry_run,
            cache: Mutex::new(TunnelConfig::default()),
        })
    }

    /// Use a different API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn tunnel_url(&self) -> String {
        format!(
            "{}/accounts/{}/cfd_tunnel/{}",
            self.base_url, self.account_id, self.tunnel_id
        )
    }

    fn configurations_url(&self) -> String {
        format!("{}/configurations", self.tunnel_url())
    }

    fn lock_cache(&self) -> MutexGuard<'_, TunnelConfig> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_configuration(&self) -> Result<TunnelConfig> {
        let response = self
            .client
            .get(self.configurations_url())
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(api::request_error)?;

        let body: ApiResponse<TunnelConfiguration> =
            api::decode(response, TARGET_NAME, "Get tunnel configuration").await?;

        let configuration = body.result.ok_or_else(|| {
            Error::target(TARGET_NAME, "Get tunnel configuration returned no result")
        })?;

        tracing::debug!(
            "[Get Tunnel Configuration] Version {} with {} ingress rule(s)",
            configuration.version,
            configuration.config.as_ref().map_or(0, |c| c.ingress.len())
        );

        let config = configuration.config.unwrap_or_default();
        *self.lock_cache() = config.clone();
        Ok(config)
    }

    async fn put_configuration(&self, config: TunnelConfig) -> Result<()> {
        let payload = serde_json::json!({ "config": config });

        if self.dry_run {
            tracing::info!(
                "[Tunnel Configuration Update] [DRY-RUN] Would send PUT request to {} \
                with payload: {}",
                self.configurations_url(),
                payload
            );
            return Ok(());
        }

        let response = self
            .client
            .put(self.configurations_url())
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(api::request_error)?;

        api::decode::<Value>(response, TARGET_NAME, "Update tunnel configuration").await?;

        *self.lock_cache() = config;
        Ok(())
    }

    async fn apply_change(&self, change: &HostChange<IngressRuleMeta>) -> Result<()> {
        let current = self.fetch_configuration().await?;
        let hostname = change.host.name.as_str();

        let updated = match change.change_type {
            ChangeType::Add => with_route(&current, hostname, &self.service),
            ChangeType::Remove => without_route(&current, hostname),
        };

        let Some(updated) = updated else {
            tracing::info!(
                "[Tunnel Configuration Update] Nothing to {} for {} on tunnel {}",
                change.change_type,
                hostname,
                self.tunnel_id
            );
            return Ok(());
        };

        self.put_configuration(updated).await?;

        match change.change_type {
            ChangeType::Add => tracing::info!(
                "[Tunnel Configuration Update] Tunnel configuration was updated to route {} to {}",
                hostname,
                self.service
            ),
            ChangeType::Remove => tracing::info!(
                "[Tunnel Configuration Update] Tunnel configuration was updated to remove host {}",
                hostname
            ),
        }
        Ok(())
    }
}

#[async_trait]
impl Target for CloudflareTunnelTarget {
    type Meta = IngressRuleMeta;

    fn name(&self) -> &str {
        TARGET_NAME
    }

    async fn setup(&self) -> Result<()> {
        api::verify_token(&self.client, &self.base_url, &self.api_token, TARGET_NAME).await?;

        let response = self
            .client
            .get(self.tunnel_url())
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(api::request_error)?;
        api::decode::<Value>(response, TARGET_NAME, "Verify tunnel").await?;

        tracing::info!("[Cloudflare Tunnel Verify] Connection verified");

        // Prime the configuration cache
        self.get_hosts().await?;
        Ok(())
    }

    async fn get_hosts(&self) -> Result<Vec<Host<IngressRuleMeta>>> {
        let config = self.fetch_configuration().await?;
        let hosts = routed_hosts(&config, &self.tunnel_id);

        tracing::debug!(
            "[Fetch Ingress Rules] Hostnames routed by tunnel {}: {}",
            self.tunnel_id,
            hosts
                .iter()
                .map(|h| h.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(hosts)
    }

    async fn apply(&self, changes: Vec<HostChange<IngressRuleMeta>>) -> Result<()> {
        for change in &changes {
            self.apply_change(change).await?;
        }
        Ok(())
    }

    fn cached_host(&self, name: &str) -> Option<Host<IngressRuleMeta>> {
        routed_hosts(&self.lock_cache(), &self.tunnel_id)
            .into_iter()
            .find(|host| host.name == name)
    }
}

/// Factory for creating Cloudflare Tunnel targets
pub struct CloudflareTunnelFactory {
    dry_run: bool,
}

impl CloudflareTunnelFactory {
    /// Create a factory; `dry_run` applies to every target it creates
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl TargetFactory<IngressRuleMeta> for CloudflareTunnelFactory {
    fn create(&self, config: &TargetConfig) -> Result<Arc<dyn Target<Meta = IngressRuleMeta>>> {
        match config {
            TargetConfig::CloudflareTunnel {
                api_token,
                account_id,
                tunnel_id,
                service,
            } => {
                if self.dry_run {
                    tracing::warn!(
                        "Cloudflare Tunnel target running in DRY-RUN mode - \
                        no ingress rule will be changed"
                    );
                }

                Ok(Arc::new(CloudflareTunnelTarget::new(
                    api_token.clone(),
                    account_id.clone(),
                    tunnel_id.clone(),
                    service.clone(),
                    self.dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare Tunnel target")),
        }
    }
}

/// Register the Cloudflare Tunnel target with a registry
///
/// # Example
///
/// ```rust
/// use hostsync_core::{AdapterRegistry, AnyMeta};
///
/// let registry: AdapterRegistry<AnyMeta> = AdapterRegistry::new();
/// hostsync_target_cloudflare_tunnel::register(&registry, false);
/// assert!(registry.has_target("cloudflare-tunnel"));
/// ```
pub fn register(registry: &AdapterRegistry<AnyMeta>, dry_run: bool) {
    let factory = ErasedFactory::new(Box::new(CloudflareTunnelFactory::new(dry_run)));
    registry.register_target(TARGET_NAME, Box::new(factory));
}
