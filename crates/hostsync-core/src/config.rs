//! Configuration types for hostsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main hostsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sources of truth for which hostnames should exist
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Systems whose records are kept in sync with the providers
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Reconciliation timing
    #[serde(default)]
    pub engine: EngineConfig,

    /// Execution history storage
    #[serde(default)]
    pub history: HistoryConfig,
}

impl SyncConfig {
    /// Create an empty configuration with default engine settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider
    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    /// Add a target
    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.targets.push(target);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.providers.is_empty() {
            return Err(crate::Error::config("No providers configured"));
        }
        if self.targets.is_empty() {
            return Err(crate::Error::config("No targets configured"));
        }

        for provider in &self.providers {
            provider.validate()?;
        }
        for target in &self.targets {
            target.validate()?;
        }

        self.engine.validate()?;
        self.history.validate()?;

        Ok(())
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Traefik router table, read through the Traefik API
    Traefik {
        /// Base URL of the Traefik API (e.g., `http://traefik:8080/api`)
        api_url: String,
        /// How often the router table is polled for changes (in seconds)
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
    },

    /// Docker container labels, read through the Engine API
    Docker {
        /// Base URL of the Docker Engine API (e.g., `http://localhost:2375`)
        api_url: String,
        /// Label holding a container's hostname
        #[serde(default = "default_label_hostname")]
        label_hostname: String,
        /// Label that must be `"true"` for a container to be considered
        #[serde(default)]
        label_enable: Option<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Traefik {
                api_url,
                poll_interval_secs,
            } => {
                if api_url.is_empty() {
                    return Err(crate::Error::config("Traefik API URL cannot be empty"));
                }
                if *poll_interval_secs == 0 {
                    return Err(crate::Error::config("Traefik poll interval must be > 0"));
                }
                Ok(())
            }
            ProviderConfig::Docker {
                api_url,
                label_hostname,
                ..
            } => {
                if api_url.is_empty() {
                    return Err(crate::Error::config("Docker API URL cannot be empty"));
                }
                if label_hostname.is_empty() {
                    return Err(crate::Error::config("Docker hostname label cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider factory name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Traefik { .. } => "traefik",
            ProviderConfig::Docker { .. } => "docker",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetConfig {
    /// Cloudflare DNS zone, with CNAMEs pointing at a Cloudflare Tunnel
    CloudflareDns {
        /// Cloudflare API token (needs DNS edit on the zone)
        api_token: String,
        /// Zone ID
        zone_id: String,
        /// Tunnel ID that every CNAME points at
        tunnel_id: String,
    },

    /// Ingress rules of a remotely managed Cloudflare Tunnel
    CloudflareTunnel {
        /// Cloudflare API token (needs tunnel edit on the account)
        api_token: String,
        /// Account owning the tunnel
        account_id: String,
        /// Tunnel whose ingress rules are managed
        tunnel_id: String,
        /// Origin service every managed hostname routes to
        service: String,
    },

    /// Custom target
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl TargetConfig {
    /// Validate the target configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            TargetConfig::CloudflareDns {
                api_token,
                zone_id,
                tunnel_id,
            } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if zone_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare zone ID cannot be empty"));
                }
                if tunnel_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare tunnel ID cannot be empty"));
                }
                Ok(())
            }
            TargetConfig::CloudflareTunnel {
                api_token,
                account_id,
                tunnel_id,
                service,
            } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if account_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare account ID cannot be empty"));
                }
                if tunnel_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare tunnel ID cannot be empty"));
                }
                if service.is_empty() {
                    return Err(crate::Error::config("Tunnel ingress service cannot be empty"));
                }
                Ok(())
            }
            TargetConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom target factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom target config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the target factory name
    pub fn type_name(&self) -> &str {
        match self {
            TargetConfig::CloudflareDns { .. } => "cloudflare-dns",
            TargetConfig::CloudflareTunnel { .. } => "cloudflare-tunnel",
            TargetConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Execution history configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryConfig {
    /// In-memory history (lost on restart)
    #[default]
    Memory,

    /// JSON file history
    File {
        /// Path to the history file
        path: String,
    },

    /// No history kept
    Disabled,
}

impl HistoryConfig {
    /// Validate the history configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            HistoryConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("History file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// How provider push notifications are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventMode {
    /// Every notification batch triggers a full sync pass
    #[default]
    Sync,
    /// Each change is scheduled directly as a push add/delete job
    Direct,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Settle window before an added hostname is written (in seconds)
    #[serde(default = "default_add_delay_secs")]
    pub add_delay_secs: u64,

    /// Settle window before a removed hostname is deleted (in seconds)
    ///
    /// Longer than the add delay so that a container restart does not take
    /// its record down.
    #[serde(default = "default_remove_delay_secs")]
    pub remove_delay_secs: u64,

    /// Interval between full sync passes (in seconds)
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Capacity of each job completion channel
    ///
    /// When full, completion notifications are dropped (with a warning log).
    ///
    /// Default: 1000 records
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Log target writes instead of performing them
    #[serde(default)]
    pub dry_run: bool,

    /// How provider notifications are handled
    #[serde(default)]
    pub event_mode: EventMode,
}

impl EngineConfig {
    /// Add delay as a [`Duration`]
    pub fn add_delay(&self) -> Duration {
        Duration::from_secs(self.add_delay_secs)
    }

    /// Remove delay as a [`Duration`]
    pub fn remove_delay(&self) -> Duration {
        Duration::from_secs(self.remove_delay_secs)
    }

    /// Sync interval as a [`Duration`]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sync_interval_secs == 0 {
            return Err(crate::Error::config("Sync interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            add_delay_secs: default_add_delay_secs(),
            remove_delay_secs: default_remove_delay_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            dry_run: false,
            event_mode: EventMode::default(),
        }
    }
}

fn default_add_delay_secs() -> u64 {
    10
}

fn default_remove_delay_secs() -> u64 {
    300
}

fn default_sync_interval_secs() -> u64 {
    3600
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_label_hostname() -> String {
    "hostsync.hostname".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SyncConfig {
        SyncConfig::new()
            .with_provider(ProviderConfig::Traefik {
                api_url: "http://traefik:8080/api".to_string(),
                poll_interval_secs: 5,
            })
            .with_target(TargetConfig::CloudflareDns {
                api_token: "token".to_string(),
                zone_id: "zone".to_string(),
                tunnel_id: "tunnel".to_string(),
            })
    }

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.add_delay(), Duration::from_secs(10));
        assert_eq!(engine.remove_delay(), Duration::from_secs(300));
        assert_eq!(engine.sync_interval(), Duration::from_secs(3600));
        assert_eq!(engine.event_mode, EventMode::Sync);
        assert!(!engine.dry_run);
    }

    #[test]
    fn test_validate_requires_providers_and_targets() {
        assert!(SyncConfig::new().validate().is_err());
        assert!(valid_config().validate().is_ok());

        let mut no_targets = valid_config();
        no_targets.targets.clear();
        assert!(no_targets.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_credentials() {
        let config = valid_config().with_target(TargetConfig::CloudflareDns {
            api_token: String::new(),
            zone_id: "zone".to_string(),
            tunnel_id: "tunnel".to_string(),
        });
        assert!(config.validate().is_err());

        let tunnel = TargetConfig::CloudflareTunnel {
            api_token: "t".to_string(),
            account_id: "acc".to_string(),
            tunnel_id: "tun".to_string(),
            service: String::new(),
        };
        assert!(tunnel.validate().is_err());
        assert_eq!(tunnel.type_name(), "cloudflare-tunnel");

        let mut zero_interval = valid_config();
        zero_interval.engine.sync_interval_secs = 0;
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_deserialize_tagged_adapters() {
        let json = r#"{
            "providers": [{ "type": "docker", "api_url": "http://localhost:2375" }],
            "targets": [{
                "type": "cloudflare_dns", "api_token": "t", "zone_id": "z", "tunnel_id": "x"
            }],
            "engine": { "add_delay_secs": 1, "event_mode": "direct" }
        }"#;

        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.providers[0].type_name(), "docker");
        assert_eq!(config.targets[0].type_name(), "cloudflare-dns");
        assert_eq!(config.engine.add_delay_secs, 1);
        assert_eq!(config.engine.remove_delay_secs, 300);
        assert_eq!(config.engine.event_mode, EventMode::Direct);

        match &config.providers[0] {
            ProviderConfig::Docker { label_hostname, .. } => {
                assert_eq!(label_hostname, "hostsync.hostname")
            }
            other => panic!("unexpected provider config: {:?}", other),
        }
    }
}
