// # autoupdated - Auto-Update Daemon
//
// Thin integration layer around `autoupdate-core`. All coordination logic
// (deduplication, scheduling, mutual exclusion) lives in the core crate.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the HTTP capabilities into the engine
// 4. Feeding proxy settings to the engine at startup and on SIGHUP
// 5. Shutting the engine down on SIGINT/SIGTERM
//
// ## Configuration
//
// ### Update service
// - `AUTOUPDATE_SERVICE_URL`: URL of the update service (required)
// - `AUTOUPDATE_PUBLIC_KEY_PATH`: Public key used to verify updates (required)
// - `AUTOUPDATE_CURRENT_VERSION`: Running version (default: this crate's version)
// - `AUTOUPDATE_STAGING_DIR`: Where downloaded releases are staged
// - `AUTOUPDATE_DOWNLOAD_TIMEOUT_SECS`: Timeout for one artifact download (default 1800)
//
// ### Proxy
// - `AUTOUPDATE_PROXY_ADDR`: Forward proxy address (empty disables updates)
// - `AUTOUPDATE_CA_CERT_PATH`: PEM CA certificate for proxied connections
// - `AUTOUPDATE_PROXY_CONFIG_PATH`: JSON file with proxy settings, re-read on SIGHUP.
//   Takes precedence over the two variables above.
//
// ### Scheduling
// - `AUTOUPDATE_INTERVAL_SECS`: Delay between update attempts (default 7200)
//
// ## Example
//
// ```bash
// export AUTOUPDATE_SERVICE_URL=https://updates.example.net/update
// export AUTOUPDATE_PUBLIC_KEY_PATH=/etc/autoupdate/update.pub
// export AUTOUPDATE_PROXY_CONFIG_PATH=/run/app/proxy.json
//
// autoupdated
// ```

use anyhow::Result;
use autoupdate_core::{AutoUpdateEngine, EngineConfig, ProxyConfig, UpdateIdentity};
use autoupdate_http::{HttpUpdater, ProxiedClientFactory};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default staging directory for downloaded releases
const DEFAULT_STAGING_DIR: &str = "/var/lib/autoupdate/staging";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Proxy settings file written by the hosting application
#[derive(Debug, Deserialize)]
struct ProxySettingsFile {
    /// Forward proxy address
    #[serde(default)]
    proxy_address: String,
    /// PEM CA certificate path
    #[serde(default)]
    ca_certificate_path: Option<PathBuf>,
}

/// Application configuration
struct Config {
    service_url: String,
    public_key_path: String,
    current_version: String,
    staging_dir: String,
    download_timeout_secs: Option<u64>,
    proxy_address: Option<String>,
    ca_cert_path: Option<String>,
    proxy_config_path: Option<String>,
    interval_secs: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            service_url: env::var("AUTOUPDATE_SERVICE_URL")
                .map_err(|_| anyhow::anyhow!("AUTOUPDATE_SERVICE_URL is required"))?,
            public_key_path: env::var("AUTOUPDATE_PUBLIC_KEY_PATH")
                .map_err(|_| anyhow::anyhow!("AUTOUPDATE_PUBLIC_KEY_PATH is required"))?,
            current_version: env::var("AUTOUPDATE_CURRENT_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            staging_dir: env::var("AUTOUPDATE_STAGING_DIR")
                .unwrap_or_else(|_| DEFAULT_STAGING_DIR.to_string()),
            download_timeout_secs: env::var("AUTOUPDATE_DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .map(|s| s.parse())
                .transpose()
                .map_err(|e| {
                    anyhow::anyhow!("AUTOUPDATE_DOWNLOAD_TIMEOUT_SECS is not a number: {}", e)
                })?,
            proxy_address: env::var("AUTOUPDATE_PROXY_ADDR").ok(),
            ca_cert_path: env::var("AUTOUPDATE_CA_CERT_PATH").ok(),
            proxy_config_path: env::var("AUTOUPDATE_PROXY_CONFIG_PATH").ok(),
            interval_secs: env::var("AUTOUPDATE_INTERVAL_SECS")
                .ok()
                .map(|s| s.parse())
                .transpose()
                .map_err(|e| anyhow::anyhow!("AUTOUPDATE_INTERVAL_SECS is not a number: {}", e))?,
            log_level: env::var("AUTOUPDATE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if !self.service_url.starts_with("https://") && !self.service_url.starts_with("http://") {
            anyhow::bail!(
                "AUTOUPDATE_SERVICE_URL must use HTTP or HTTPS scheme. Got: {}",
                self.service_url
            );
        }

        if self.service_url.starts_with("http://") {
            eprintln!(
                "WARNING: AUTOUPDATE_SERVICE_URL uses HTTP (not HTTPS). \
                Update checks can be observed by the proxy."
            );
        }

        if !Path::new(&self.public_key_path).is_file() {
            anyhow::bail!(
                "AUTOUPDATE_PUBLIC_KEY_PATH does not point to a file: {}",
                self.public_key_path
            );
        }

        if let Some(ref path) = self.proxy_config_path
            && !Path::new(path).is_file()
        {
            anyhow::bail!(
                "AUTOUPDATE_PROXY_CONFIG_PATH does not point to a file: {}",
                path
            );
        }

        if let Some(ref path) = self.ca_cert_path
            && !Path::new(path).is_file()
        {
            anyhow::bail!("AUTOUPDATE_CA_CERT_PATH does not point to a file: {}", path);
        }

        if let Some(interval) = self.interval_secs
            && !(60..=604_800).contains(&interval)
        {
            anyhow::bail!(
                "AUTOUPDATE_INTERVAL_SECS must be between 60 and 604800 seconds. Got: {}",
                interval
            );
        }

        if self.download_timeout_secs == Some(0) {
            anyhow::bail!("AUTOUPDATE_DOWNLOAD_TIMEOUT_SECS must be greater than 0");
        }

        if self.staging_dir.is_empty() {
            anyhow::bail!("AUTOUPDATE_STAGING_DIR cannot be empty");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "AUTOUPDATE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Read the current proxy settings
    ///
    /// Uses the settings file when configured, the environment otherwise.
    fn load_proxy_config(&self) -> Result<ProxyConfig> {
        if let Some(ref path) = self.proxy_config_path {
            let raw = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?;
            let settings: ProxySettingsFile = serde_json::from_slice(&raw)
                .map_err(|e| anyhow::anyhow!("Invalid proxy settings in {}: {}", path, e))?;

            let ca_certificate = match settings.ca_certificate_path {
                Some(ref ca_path) => read_certificate(ca_path)?,
                None => Vec::new(),
            };

            return Ok(ProxyConfig::new(settings.proxy_address, ca_certificate));
        }

        let ca_certificate = match self.ca_cert_path {
            Some(ref ca_path) => read_certificate(Path::new(ca_path))?,
            None => Vec::new(),
        };

        Ok(ProxyConfig::new(
            self.proxy_address.clone().unwrap_or_default(),
            ca_certificate,
        ))
    }

    /// Proxy settings applied at startup
    ///
    /// Settings that cannot be loaded disable updates instead of stopping the
    /// daemon.
    fn initial_proxy_config(&self) -> ProxyConfig {
        match self.load_proxy_config() {
            Ok(proxy) => proxy,
            Err(e) => {
                error!("Failed to load proxy settings, updates disabled: {}", e);
                ProxyConfig::disabled()
            }
        }
    }

    /// Release updater staging into the configured directory
    fn updater(&self) -> HttpUpdater {
        let updater = HttpUpdater::new(&self.staging_dir);
        match self.download_timeout_secs {
            Some(secs) => updater.with_download_timeout(Duration::from_secs(secs)),
            None => updater,
        }
    }

    /// Engine settings derived from the environment
    fn engine_config(&self) -> EngineConfig {
        match self.interval_secs {
            Some(secs) => EngineConfig::default().with_attempt_interval_secs(secs),
            None => EngineConfig::default(),
        }
    }
}

fn read_certificate(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read CA certificate {}: {}", path.display(), e))
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting autoupdated daemon");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let config = Arc::new(config);

    let public_key = std::fs::read(&config.public_key_path)?;
    let identity = UpdateIdentity::new(
        config.current_version.clone(),
        config.service_url.clone(),
        public_key,
    );

    let updater = Arc::new(config.updater());
    let (engine, mut event_rx) = AutoUpdateEngine::new(
        ProxiedClientFactory::new(),
        updater,
        identity,
        config.engine_config(),
    )?;

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    info!("Current version: {}", config.current_version);
    info!("Update service: {}", config.service_url);

    engine.configure(config.initial_proxy_config());
    engine.flush().await;

    #[cfg(unix)]
    {
        let (reload_tx, reload_rx) = tokio::sync::mpsc::channel(4);
        spawn_reload_watcher(Arc::clone(&config), reload_tx)?;
        engine.follow(tokio_stream::wrappers::ReceiverStream::new(reload_rx));
    }

    info!("Daemon initialized successfully");

    let received = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", received);

    engine.shutdown().await;
    info!("Shutting down daemon");

    Ok(())
}

/// Re-read proxy settings on SIGHUP
#[cfg(unix)]
fn spawn_reload_watcher(
    config: Arc<Config>,
    reload_tx: tokio::sync::mpsc::Sender<ProxyConfig>,
) -> Result<()> {
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;

    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            if config.proxy_config_path.is_none() {
                warn!("SIGHUP received but AUTOUPDATE_PROXY_CONFIG_PATH is not set, nothing to reload");
                continue;
            }

            info!("SIGHUP received, reloading proxy settings");
            match config.load_proxy_config() {
                Ok(proxy) => {
                    if reload_tx.send(proxy).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to reload proxy settings: {}", e),
            }
        }
    });

    Ok(())
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

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    Ok(received)
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_with(public_key: &NamedTempFile, proxy_config_path: Option<String>) -> Config {
        Config {
            service_url: "https://updates.example.net/update".to_string(),
            public_key_path: public_key.path().display().to_string(),
            current_version: "1.0.0".to_string(),
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
            download_timeout_secs: None,
            proxy_address: Some("10.0.0.1:8080".to_string()),
            ca_cert_path: None,
            proxy_config_path,
            interval_secs: None,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn valid_configuration_passes() {
        let key = NamedTempFile::new().unwrap();
        assert!(config_with(&key, None).validate().is_ok());
    }

    #[test]
    fn proxy_settings_come_from_env_without_file() {
        let key = NamedTempFile::new().unwrap();
        let proxy = config_with(&key, None).load_proxy_config().unwrap();
        assert_eq!(proxy.proxy_address, "10.0.0.1:8080");
        assert!(proxy.ca_certificate.is_empty());
    }

    #[test]
    fn proxy_settings_file_takes_precedence() {
        let key = NamedTempFile::new().unwrap();
        let mut ca = NamedTempFile::new().unwrap();
        write!(ca, "-----BEGIN CERTIFICATE-----").unwrap();

        let mut settings = NamedTempFile::new().unwrap();
        write!(
            settings,
            r#"{{"proxy_address": "10.0.0.2:9090", "ca_certificate_path": "{}"}}"#,
            ca.path().display()
        )
        .unwrap();

        let proxy = config_with(&key, Some(settings.path().display().to_string()))
            .load_proxy_config()
            .unwrap();
        assert_eq!(proxy.proxy_address, "10.0.0.2:9090");
        assert_eq!(proxy.ca_certificate, b"-----BEGIN CERTIFICATE-----".to_vec());
    }

    #[test]
    fn missing_ca_certificate_is_rejected() {
        let key = NamedTempFile::new().unwrap();
        let mut config = config_with(&key, None);
        config.ca_cert_path = Some("/nonexistent/ca.pem".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn unreadable_startup_settings_disable_updates() {
        let key = NamedTempFile::new().unwrap();
        let mut settings = NamedTempFile::new().unwrap();
        write!(
            settings,
            r#"{{"proxy_address": "10.0.0.2:9090", "ca_certificate_path": "/nonexistent/ca.pem"}}"#
        )
        .unwrap();

        let config = config_with(&key, Some(settings.path().display().to_string()));
        assert!(config.validate().is_ok());
        assert!(config.load_proxy_config().is_err());
        assert!(!config.initial_proxy_config().has_proxy());
    }

    #[test]
    fn malformed_startup_settings_disable_updates() {
        let key = NamedTempFile::new().unwrap();
        let mut settings = NamedTempFile::new().unwrap();
        write!(settings, "not json").unwrap();

        let config = config_with(&key, Some(settings.path().display().to_string()));
        assert!(!config.initial_proxy_config().has_proxy());
    }

    #[test]
    fn zero_download_timeout_is_rejected() {
        let key = NamedTempFile::new().unwrap();
        let mut config = config_with(&key, None);
        config.download_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_proxy_address_in_file_disables_updates() {
        let key = NamedTempFile::new().unwrap();
        let mut settings = NamedTempFile::new().unwrap();
        write!(settings, "{{}}").unwrap();

        let proxy = config_with(&key, Some(settings.path().display().to_string()))
            .load_proxy_config()
            .unwrap();
        assert!(!proxy.has_proxy());
    }

    #[test]
    fn interval_out_of_range_is_rejected() {
        let key = NamedTempFile::new().unwrap();
        let mut config = config_with(&key, None);
        config.interval_secs = Some(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn engine_config_uses_interval_override() {
        let key = NamedTempFile::new().unwrap();
        let mut config = config_with(&key, None);
        assert_eq!(config.engine_config().attempt_interval_secs, 7200);
        config.interval_secs = Some(600);
        assert_eq!(config.engine_config().attempt_interval_secs, 600);
    }
}
