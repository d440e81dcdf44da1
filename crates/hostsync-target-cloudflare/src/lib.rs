// # Cloudflare DNS Target
//
// This crate provides a Cloudflare DNS target for hostsync. Every managed
// hostname is a proxied CNAME record pointing at a Cloudflare Tunnel:
//
// ```text
// app.example.com.  CNAME  <tunnel_id>.cfargotunnel.com.  (proxied)
// ```
//
// ## Behavior
//
// - `get_hosts()` lists the zone's CNAME records that point at the tunnel and
//   refreshes the record cache. Records pointing elsewhere are never reported,
//   so they are never scheduled for removal.
// - `apply()` creates a CNAME for each `add` and deletes every cached record
//   with the change's name for each `remove`.
// - Dry-run mode performs all reads and logs the writes it would make.
// - ❌ NO retry logic (a failed change is re-detected by the next sync pass)
//
// ## Security Requirements
//
// - API token NEVER appears in logs
// - Target MUST fail fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - Verify Token: GET `/user/tokens/verify`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=CNAME`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

pub mod api;

use api::{ApiResponse, CLOUDFLARE_API_BASE};
use async_trait::async_trait;
use hostsync_core::config::TargetConfig;
use hostsync_core::host::{ChangeType, Host, HostChange};
use hostsync_core::registry::AdapterRegistry;
use hostsync_core::traits::{AnyMeta, ErasedFactory, Target, TargetFactory};
use hostsync_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Records requested per page when listing
const PAGE_SIZE: u32 = 100;

/// Target name used in job ids and logs
pub const TARGET_NAME: &str = "cloudflare-dns";

/// Metadata the Cloudflare target attaches to the hosts it reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudflareRecordMeta {
    /// Zone the record lives in
    pub zone_id: String,
    /// CNAME content (the tunnel hostname)
    pub content: String,
    /// Whether traffic is proxied through Cloudflare
    pub proxied: bool,
}

/// A DNS record as returned by the Cloudflare API
#[derive(Debug, Clone, Deserialize)]
struct DnsRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    #[serde(default)]
    proxied: bool,
}

/// Cloudflare DNS target
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the target will:
/// - Perform all GET requests (token check, record listing)
/// - Log the intended POST and DELETE requests
/// - **NOT** modify any DNS record
pub struct CloudflareDnsTarget {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone holding the CNAME records
    zone_id: String,

    /// Tunnel every CNAME points at
    tunnel_id: String,

    /// API base URL (overridable for tests and proxies)
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: read but never write
    dry_run: bool,

    /// Tunnel CNAMEs seen by the last `get_hosts()`
    cache: Mutex<Vec<DnsRecord>>,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareDnsTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareDnsTarget")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("tunnel_id", &self.tunnel_id)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareDnsTarget {
    /// Create a new Cloudflare DNS target
    ///
    /// # Errors
    ///
    /// Returns a configuration error when any identifier is empty or the HTTP
    /// client cannot be built.
    pub fn new(
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
        tunnel_id: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        let zone_id = zone_id.into();
        let tunnel_id = tunnel_id.into();

        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        if zone_id.is_empty() {
            return Err(Error::config("Cloudflare zone ID cannot be empty"));
        }
        if tunnel_id.is_empty() {
            return Err(Error::config("Cloudflare tunnel ID cannot be empty"));
        }

        let client = api::build_client()?;

        Ok(Self {
            api_token,
            zone_id,
            tunnel_id,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
            cache: Mutex::new(Vec::new()),
        })
    }

    /// Use a different API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Content every managed CNAME points at
    pub fn tunnel_hostname(&self) -> String {
        format!("{}.cfargotunnel.com", self.tunnel_id)
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Vec<DnsRecord>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch every CNAME page of the zone
    async fn fetch_cname_records(&self) -> Result<Vec<DnsRecord>> {
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let response = self
                .client
                .get(self.records_url())
                .bearer_auth(&self.api_token)
                .query(&[("type", "CNAME")])
                .query(&[("per_page", PAGE_SIZE), ("page", page)])
                .send()
                .await
                .map_err(api::request_error)?;

            let body: ApiResponse<Vec<DnsRecord>> =
                api::decode(response, TARGET_NAME, "List DNS records").await?;

            let total_pages = body.result_info.as_ref().map_or(1, |info| info.total_pages);
            records.extend(body.result.unwrap_or_default());

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(records)
    }

    async fn create_record(&self, hostname: &str) -> Result<()> {
        let payload = serde_json::json!({
            "type": "CNAME",
            "name": hostname,
            "content": self.tunnel_hostname(),
            "ttl": 1,
            "proxied": true,
        });

        if self.dry_run {
            tracing::info!(
                "[DNS Record Create] [DRY-RUN] Would send POST request to {} with payload: {}",
                self.records_url(),
                payload
            );
            return Ok(());
        }

        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(api::request_error)?;

        api::decode::<serde_json::Value>(response, TARGET_NAME, "Create DNS record").await?;

        tracing::info!(
            "[DNS Record Create] CNAME record {} was created in zone {}",
            hostname,
            self.zone_id
        );
        Ok(())
    }

    async fn delete_records(&self, host: &Host<CloudflareRecordMeta>) -> Result<()> {
        let mut ids: Vec<String> = self
            .lock_cache()
            .iter()
            .filter(|record| record.name == host.name)
            .map(|record| record.id.clone())
            .collect();

        if ids.is_empty() && !host.id.is_empty() {
            ids.push(host.id.clone());
        }

        if ids.is_empty() {
            tracing::warn!(
                "[DNS Record Delete] CNAME record {} was not found in zone {}",
                host.name,
                self.zone_id
            );
            return Ok(());
        }

        if self.dry_run {
            tracing::info!(
                "[DNS Record Delete] [DRY-RUN] Would delete {} with record id(s): {}",
                host.name,
                ids.join(", ")
            );
            return Ok(());
        }

        for id in &ids {
            let response = self
                .client
                .delete(format!("{}/{}", self.records_url(), id))
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(api::request_error)?;

            api::decode::<serde_json::Value>(response, TARGET_NAME, "Delete DNS record").await?;
        }

        self.lock_cache().retain(|record| !ids.contains(&record.id));

        tracing::info!(
            "[DNS Record Delete] CNAME record {} ({}) was deleted in zone {}",
            host.name,
            ids.join(", "),
            self.zone_id
        );
        Ok(())
    }

    fn to_host(&self, record: &DnsRecord) -> Host<CloudflareRecordMeta> {
        Host::new(record.id.as_str(), record.name.as_str()).with_meta(CloudflareRecordMeta {
            zone_id: self.zone_id.clone(),
            content: record.content.clone(),
            proxied: record.proxied,
        })
    }

    /// One host per record name, the first record winning
    ///
    /// Extra records with the same name stay in the cache, so a removal still
    /// deletes all of them.
    fn unique_hosts(&self, records: &[DnsRecord]) -> Vec<Host<CloudflareRecordMeta>> {
        let mut seen = HashSet::new();
        records
            .iter()
            .filter(|record| seen.insert(record.name.as_str()))
            .map(|record| self.to_host(record))
            .collect()
    }
}

#[async_trait]
impl Target for CloudflareDnsTarget {
    type Meta = CloudflareRecordMeta;

    fn name(&self) -> &str {
        TARGET_NAME
    }

    async fn setup(&self) -> Result<()> {
        api::verify_token(&self.client, &self.base_url, &self.api_token, TARGET_NAME).await?;

        tracing::info!("[Cloudflare Token Verify] Connection verified");

        // Prime the record cache
        self.get_hosts().await?;
        Ok(())
    }

    async fn get_hosts(&self) -> Result<Vec<Host<CloudflareRecordMeta>>> {
        let tunnel = self.tunnel_hostname();
        let records: Vec<DnsRecord> = self
            .fetch_cname_records()
            .await?
            .into_iter()
            .filter(|record| record.record_type == "CNAME" && record.content == tunnel)
            .collect();

        tracing::debug!(
            "[Fetch DNS Records] Tunnel records fetched from Cloudflare: {}",
            records
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let hosts = self.unique_hosts(&records);
        *self.lock_cache() = records;

        Ok(hosts)
    }

    async fn apply(&self, changes: Vec<HostChange<CloudflareRecordMeta>>) -> Result<()> {
        for change in changes {
            match change.change_type {
                ChangeType::Add => self.create_record(&change.host.name).await?,
                ChangeType::Remove => self.delete_records(&change.host).await?,
            }
        }
        Ok(())
    }

    fn cached_host(&self, name: &str) -> Option<Host<CloudflareRecordMeta>> {
        self.lock_cache()
            .iter()
            .find(|record| record.name == name)
            .map(|record| self.to_host(record))
    }
}

/// Factory for creating Cloudflare DNS targets
pub struct CloudflareDnsFactory {
    dry_run: bool,
}

impl CloudflareDnsFactory {
    /// Create a factory; `dry_run` applies to every target it creates
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl TargetFactory<CloudflareRecordMeta> for CloudflareDnsFactory {
    fn create(
        &self,
        config: &TargetConfig,
    ) -> Result<Arc<dyn Target<Meta = CloudflareRecordMeta>>> {
        match config {
            TargetConfig::CloudflareDns {
                api_token,
                zone_id,
                tunnel_id,
            } => {
                if self.dry_run {
                    tracing::warn!(
                        "Cloudflare target running in DRY-RUN mode - no records will be changed"
                    );
                }

                Ok(Arc::new(CloudflareDnsTarget::new(
                    api_token.clone(),
                    zone_id.clone(),
                    tunnel_id.clone(),
                    self.dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare DNS target")),
        }
    }
}

/// Register the Cloudflare DNS target with a registry
///
/// The target is registered behind [`ErasedFactory`] so it can run next to
/// targets with other metadata types.
///
/// # Example
///
/// ```rust
/// use hostsync_core::{AdapterRegistry, AnyMeta};
///
/// let registry: AdapterRegistry<AnyMeta> = AdapterRegistry::new();
/// hostsync_target_cloudflare::register(&registry, false);
/// assert!(registry.has_target("cloudflare-dns"));
/// ```
pub fn register(registry: &AdapterRegistry<AnyMeta>, dry_run: bool) {
    let factory = ErasedFactory::new(Box::new(CloudflareDnsFactory::new(dry_run)));
    registry.register_target(TARGET_NAME, Box::new(factory));
}
