// # HTTP Capabilities
//
// This crate provides the reqwest-based implementations of the two
// capabilities consumed by `autoupdate-core`.
//
// ## Components
//
// - **ProxiedClientFactory**: builds a `reqwest::Client` that sends every
//   request through the configured forward proxy and trusts the configured
//   CA certificate
// - **HttpUpdater**: asks the update service whether a newer release exists
//   and stages the artifact on disk
//
// ## Scope
//
// Signature verification and replacing the running binary are handled by
// the installer that consumes the staging directory, not here.

use autoupdate_core::traits::{AppliedUpdate, ClientFactory, Updater};
use autoupdate_core::{Error, Result, UpdateIdentity};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default request timeout for the update service
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default timeout for downloading a release artifact
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 1800;

/// User agent sent with every request
const USER_AGENT: &str = concat!("autoupdate/", env!("CARGO_PKG_VERSION"));

/// Extension of staged artifacts
const STAGED_EXTENSION: &str = "update";

/// Factory for clients routed through a forward proxy
#[derive(Debug, Clone)]
pub struct ProxiedClientFactory {
    /// Per-request timeout
    timeout: Duration,
}

impl ProxiedClientFactory {
    /// Create a factory with the default timeout
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProxiedClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for ProxiedClientFactory {
    type Client = reqwest::Client;

    fn build(&self, ca_certificate: &[u8], proxy_address: &str) -> Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(proxy_url(proxy_address))
            .map_err(|e| Error::client_build(format!("Invalid proxy {}: {}", proxy_address, e)))?;

        let mut builder = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .user_agent(USER_AGENT);

        if !ca_certificate.is_empty() {
            let certificate = reqwest::Certificate::from_pem(ca_certificate)
                .map_err(|e| Error::client_build(format!("Invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }

        builder
            .build()
            .map_err(|e| Error::client_build(format!("Failed to build HTTP client: {}", e)))
    }
}

/// Proxy URL for a configured address
///
/// Bare `host:port` addresses are treated as plain HTTP proxies.
pub fn proxy_url(proxy_address: &str) -> String {
    if proxy_address.contains("://") {
        proxy_address.to_string()
    } else {
        format!("http://{}", proxy_address)
    }
}

/// Body of the update check request
#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    current_version: &'a str,
    os: &'static str,
    arch: &'static str,
}

/// Release advertised by the update service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseInfo {
    /// Version of the release
    pub version: String,
    /// Where to download the artifact
    pub url: String,
}

/// Updater that checks the update service and stages new releases
///
/// # Protocol
///
/// - `POST <service_url>` with `{"current_version", "os", "arch"}`
/// - `204 No Content` / `304 Not Modified`: nothing to update
/// - `200 OK` with [`ReleaseInfo`]: download `url` and stage it
///
/// A release already present in the staging directory is not downloaded
/// again.
#[derive(Debug, Clone)]
pub struct HttpUpdater {
    /// Directory where downloaded artifacts are staged
    staging_dir: PathBuf,
    /// Timeout for the artifact download, replacing the client's request timeout
    download_timeout: Duration,
}

impl HttpUpdater {
    /// Create a new updater staging into `staging_dir`
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        }
    }

    /// Use a custom artifact download timeout
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Staging directory
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Ask the update service for a newer release
    async fn check(&self, identity: &UpdateIdentity, client: &reqwest::Client) -> Result<ReleaseInfo> {
        let response = client
            .post(&identity.service_url)
            .json(&CheckRequest {
                current_version: &identity.current_version,
                os: std::env::consts::OS,
                arch: std::env::consts::ARCH,
            })
            .send()
            .await
            .map_err(|e| Error::http(format!("Update check failed: {}", e)))?;

        let status = response.status();
        if is_no_update_status(status) {
            return Err(Error::NoUpdateAvailable);
        }
        if !status.is_success() {
            return Err(Error::http(format!("Update service returned {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::http(format!("Failed to read update check response: {}", e)))?;
        let release: ReleaseInfo = serde_json::from_slice(&body)?;

        if release.version == identity.current_version {
            return Err(Error::NoUpdateAvailable);
        }

        Ok(release)
    }

    /// Download the release artifact into the staging directory
    async fn stage(&self, client: &reqwest::Client, release: &ReleaseInfo) -> Result<PathBuf> {
        let staged = self.staging_dir.join(staged_file_name(&release.version));
        if tokio::fs::try_exists(&staged).await? {
            tracing::debug!("Release {} already staged at {}", release.version, staged.display());
            return Ok(staged);
        }

        let response = client
            .get(&release.url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| Error::http(format!("Download of {} failed: {}", release.version, e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "Download of {} returned {}",
                release.version,
                response.status()
            )));
        }

        let artifact = response
            .bytes()
            .await
            .map_err(|e| Error::http(format!("Download of {} interrupted: {}", release.version, e)))?;

        write_staged(&self.staging_dir, &release.version, &artifact).await
    }
}

#[async_trait::async_trait]
impl Updater<reqwest::Client> for HttpUpdater {
    async fn apply_next(&self, identity: &UpdateIdentity, client: &reqwest::Client) -> Result<AppliedUpdate> {
        let release = self.check(identity, client).await?;
        tracing::info!(
            "Release {} available (running {})",
            release.version,
            identity.current_version
        );

        let path = self.stage(client, &release).await?;
        tracing::info!("Staged release {} at {}", release.version, path.display());

        Ok(AppliedUpdate::new(release.version))
    }
}

/// Whether the service answered "nothing newer"
fn is_no_update_status(status: StatusCode) -> bool {
    status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

/// File name for a staged version
///
/// Anything outside `[A-Za-z0-9._-]` is replaced so a hostile version string
/// cannot escape the staging directory.
pub fn staged_file_name(version: &str) -> String {
    let sanitized: String = version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        format!("unknown.{}", STAGED_EXTENSION)
    } else {
        format!("{}.{}", sanitized, STAGED_EXTENSION)
    }
}

/// Write an artifact into `staging_dir` atomically (temp file + rename)
pub async fn write_staged(staging_dir: &Path, version: &str, artifact: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(staging_dir).await?;

    let final_path = staging_dir.join(staged_file_name(version));
    let temp_path = final_path.with_extension(format!("{}.partial", STAGED_EXTENSION));

    tokio::fs::write(&temp_path, artifact).await?;
    tokio::fs::rename(&temp_path, &final_path).await?;

    Ok(final_path)
}
