// # hostsyncd - Hostname Sync Daemon
//
// This daemon is a THIN integration layer: all reconciliation logic lives in
// hostsync-core. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering providers and targets
// 4. Wiring provider notifications, the periodic sync and the history log
// 5. Shutting down cleanly on SIGINT/SIGTERM
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Providers (at least one)
// - `TRAEFIK_API_URL`: Traefik API base URL (enables the Traefik provider)
// - `TRAEFIK_POLL_INTERVAL`: Router poll interval in seconds (default: 5)
// - `DOCKER_API_URL`: Docker Engine API base URL (enables the Docker provider)
// - `DOCKER_LABEL_HOSTNAME`: Label holding the hostname (default: hostsync.hostname)
// - `DOCKER_LABEL_ENABLE`: Label that must be "true" to opt in (optional)
//
// ### Targets
// - `CLOUDFLARE_API_TOKEN`: API token with DNS edit permission
// - `CLOUDFLARE_ZONE_ID`: Zone holding the records
// - `CLOUDFLARE_TUNNEL_ID`: Tunnel every record points at
// - `CLOUDFLARE_ACCOUNT_ID`: Account owning the tunnel (enables the tunnel ingress target)
// - `CLOUDFLARE_TUNNEL_SERVICE`: Origin service new ingress rules route to
//   (required with `CLOUDFLARE_ACCOUNT_ID`)
//
// ### Engine
// - `HOSTSYNC_ADD_DELAY`: Seconds before an added host is written (default: 10)
// - `HOSTSYNC_REMOVE_DELAY`: Seconds before a removed host is deleted (default: 300)
// - `HOSTSYNC_SYNC_INTERVAL`: Seconds between full sync passes (default: 3600)
// - `HOSTSYNC_EVENT_CHANNEL_CAPACITY`: Job completion buffer (default: 1000)
// - `HOSTSYNC_EVENT_MODE`: `sync` (full pass per event) or `direct` (default: sync)
// - `HOSTSYNC_DRY_RUN`: Log target writes instead of performing them (default: false)
//
// ### History
// - `HOSTSYNC_HISTORY`: `memory`, `file` or `disabled` (default: memory)
// - `HOSTSYNC_HISTORY_PATH`: History file (required for `file`)
//
// ### Logging
// - `HOSTSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export TRAEFIK_API_URL=http://traefik:8080/api
// export CLOUDFLARE_API_TOKEN=your_token
// export CLOUDFLARE_ZONE_ID=your_zone
// export CLOUDFLARE_TUNNEL_ID=your_tunnel
// export HOSTSYNC_HISTORY=file
// export HOSTSYNC_HISTORY_PATH=/var/lib/hostsync/history.json
//
// hostsyncd
// ```

use anyhow::{Context, Result};
use chrono::Utc;
use hostsync_core::config::{
    EngineConfig, EventMode, HistoryConfig, ProviderConfig, SyncConfig, TargetConfig,
};
use hostsync_core::{
    AdapterRegistry, AnyMeta, Operations, Provider, Scheduler, SystemSummary, Target, history,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound for flushing history at shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum HostsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<HostsyncExitCode> for ExitCode {
    fn from(code: HostsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration read from the environment
struct DaemonConfig {
    sync: SyncConfig,
    log_level: Level,
}

impl DaemonConfig {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut sync = SyncConfig::new();

        if let Some(api_url) = get("TRAEFIK_API_URL") {
            sync = sync.with_provider(ProviderConfig::Traefik {
                api_url,
                poll_interval_secs: parse_number(&get, "TRAEFIK_POLL_INTERVAL", 5)?,
            });
        }

        if let Some(api_url) = get("DOCKER_API_URL") {
            sync = sync.with_provider(ProviderConfig::Docker {
                api_url,
                label_hostname: get("DOCKER_LABEL_HOSTNAME")
                    .unwrap_or_else(|| "hostsync.hostname".to_string()),
                label_enable: get("DOCKER_LABEL_ENABLE"),
            });
        }

        let api_token = get("CLOUDFLARE_API_TOKEN").context("CLOUDFLARE_API_TOKEN is required")?;
        let tunnel_id = get("CLOUDFLARE_TUNNEL_ID").context("CLOUDFLARE_TUNNEL_ID is required")?;

        sync = sync.with_target(TargetConfig::CloudflareDns {
            api_token: api_token.clone(),
            zone_id: get("CLOUDFLARE_ZONE_ID").context("CLOUDFLARE_ZONE_ID is required")?,
            tunnel_id: tunnel_id.clone(),
        });

        if let Some(account_id) = get("CLOUDFLARE_ACCOUNT_ID") {
            sync = sync.with_target(TargetConfig::CloudflareTunnel {
                api_token,
                account_id,
                tunnel_id,
                service: get("CLOUDFLARE_TUNNEL_SERVICE").context(
                    "CLOUDFLARE_TUNNEL_SERVICE is required when CLOUDFLARE_ACCOUNT_ID is set",
                )?,
            });
        }

        let defaults = EngineConfig::default();
        sync.engine = EngineConfig {
            add_delay_secs: parse_number(&get, "HOSTSYNC_ADD_DELAY", defaults.add_delay_secs)?,
            remove_delay_secs: parse_number(
                &get,
                "HOSTSYNC_REMOVE_DELAY",
                defaults.remove_delay_secs,
            )?,
            sync_interval_secs: parse_number(
                &get,
                "HOSTSYNC_SYNC_INTERVAL",
                defaults.sync_interval_secs,
            )?,
            event_channel_capacity: parse_number(
                &get,
                "HOSTSYNC_EVENT_CHANNEL_CAPACITY",
                defaults.event_channel_capacity,
            )?,
            dry_run: parse_bool(get("HOSTSYNC_DRY_RUN"))?,
            event_mode: match get("HOSTSYNC_EVENT_MODE").as_deref().map(str::to_lowercase) {
                None => EventMode::default(),
                Some(mode) if mode == "sync" => EventMode::Sync,
                Some(mode) if mode == "direct" => EventMode::Direct,
                Some(mode) => anyhow::bail!(
                    "HOSTSYNC_EVENT_MODE '{}' is not valid. Valid modes: sync, direct",
                    mode
                ),
            },
        };

        sync.history = match get("HOSTSYNC_HISTORY").as_deref().map(str::to_lowercase) {
            None => HistoryConfig::Memory,
            Some(kind) if kind == "memory" => HistoryConfig::Memory,
            Some(kind) if kind == "disabled" => HistoryConfig::Disabled,
            Some(kind) if kind == "file" => HistoryConfig::File {
                path: get("HOSTSYNC_HISTORY_PATH").context(
                    "HOSTSYNC_HISTORY_PATH is required when HOSTSYNC_HISTORY=file",
                )?,
            },
            Some(kind) => anyhow::bail!(
                "HOSTSYNC_HISTORY '{}' is not supported. Supported: memory, file, disabled",
                kind
            ),
        };

        let log_level = match get("HOSTSYNC_LOG_LEVEL")
            .unwrap_or_else(|| "info".to_string())
            .to_lowercase()
            .as_str()
        {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            other => anyhow::bail!(
                "HOSTSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        };

        Ok(Self { sync, log_level })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.sync.providers.is_empty() {
            anyhow::bail!("No provider configured. Set TRAEFIK_API_URL and/or DOCKER_API_URL");
        }

        self.sync.validate()?;

        if let HistoryConfig::File { path } = &self.sync.history
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "HOSTSYNC_HISTORY_PATH parent directory does not exist: {}. \
                Create it first: mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer. Got: {}", key, raw)),
    }
}

fn parse_bool(raw: Option<String>) -> Result<bool> {
    match raw.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("false") | Some("0") | Some("no") => Ok(false),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some(other) => anyhow::bail!("HOSTSYNC_DRY_RUN must be true or false. Got: {}", other),
    }
}

/// Adapters created from the configuration
struct Adapters {
    providers: Vec<Arc<dyn Provider>>,
    targets: Vec<Arc<dyn Target<Meta = AnyMeta>>>,
}

/// Register the compiled-in adapters and create the configured ones
fn build_adapters(config: &SyncConfig) -> Result<Adapters> {
    let registry: AdapterRegistry<AnyMeta> = AdapterRegistry::new();

    hostsync_target_cloudflare::register(&registry, config.engine.dry_run);
    hostsync_target_cloudflare_tunnel::register(&registry, config.engine.dry_run);

    #[cfg(feature = "traefik")]
    hostsync_provider_traefik::register(&registry);

    #[cfg(feature = "docker")]
    hostsync_provider_docker::register(&registry);

    info!(
        "Registered providers: {}; targets: {}",
        registry.list_providers().join(", "),
        registry.list_targets().join(", ")
    );

    let providers = config
        .providers
        .iter()
        .map(|p| registry.create_provider(p))
        .collect::<Result<Vec<_>, _>>()?;

    let targets = config
        .targets
        .iter()
        .map(|t| registry.create_target(t))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Adapters { providers, targets })
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match DaemonConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return HostsyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return HostsyncExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HostsyncExitCode::ConfigError.into();
    }

    info!("Starting hostsyncd daemon");
    info!(
        "Configuration loaded: {} provider(s), {} target(s), event mode {:?}",
        config.sync.providers.len(),
        config.sync.targets.len(),
        config.sync.engine.event_mode
    );

    if config.sync.engine.dry_run {
        warn!("DRY-RUN mode: no DNS record will be changed");
    }

    let adapters = match build_adapters(&config.sync) {
        Ok(adapters) => adapters,
        Err(e) => {
            error!("Failed to create adapters: {:#}", e);
            return HostsyncExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HostsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config.sync, adapters).await {
            error!("Daemon error: {:#}", e);
            HostsyncExitCode::RuntimeError
        } else {
            HostsyncExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: SyncConfig, adapters: Adapters) -> Result<()> {
    let up_since = Utc::now();
    let dry_run = config.engine.dry_run;

    let scheduler = Scheduler::with_subscriber_capacity(config.engine.event_channel_capacity);
    let operations = Arc::new(Operations::new(
        scheduler.clone(),
        adapters.providers,
        adapters.targets,
        &config.engine,
    ));

    operations.setup().await.context("Adapter setup failed")?;

    let history_log = history::open(&config.history)
        .await
        .context("Failed to open execution history")?;
    let recorder = history_log
        .as_ref()
        .map(|log| history::spawn_recorder(&scheduler, log.clone(), dry_run));

    let listeners = operations.watch_providers(config.engine.event_mode);
    operations.schedule_periodic_sync(config.engine.sync_interval())?;

    log_summary("Started", &SystemSummary::collect(&*operations, up_since, dry_run));
    info!("Ready to sync hostnames");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);

    for listener in &listeners {
        listener.abort();
    }
    let cancelled = scheduler.cancel_all();
    info!("Cancelled {} pending job(s)", cancelled);

    // Let the recorder drain completions that are already queued
    tokio::task::yield_now().await;
    if let Some(recorder) = recorder {
        recorder.abort();
    }

    if let Some(log) = &history_log {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, log.flush()).await {
            Ok(Ok(())) => {
                let entries = log.count().await.unwrap_or_default();
                info!("[History] Flushed {} entries", entries);
            }
            Ok(Err(e)) => error!("[History] Flush failed: {}", e),
            Err(_) => error!("[History] Flush timed out after {:?}", SHUTDOWN_TIMEOUT),
        }
    }

    log_summary("Stopped", &SystemSummary::collect(&*operations, up_since, dry_run));
    info!("Shutting down daemon");

    Ok(())
}

fn log_summary(label: &str, summary: &SystemSummary) {
    match serde_json::to_string(summary) {
        Ok(json) => info!("[Summary] {}: {}", label, json),
        Err(e) => warn!("[Summary] Unable to serialize summary: {}", e),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
