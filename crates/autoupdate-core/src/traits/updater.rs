// # Updater Trait
//
// Defines the interface to the mechanism that checks for, downloads,
// verifies and applies an update.
//
// ## Implementations
//
// - HTTP check-and-stage: `autoupdate-http` crate (`HttpUpdater`)

use async_trait::async_trait;

use crate::config::UpdateIdentity;

/// Description of an update that was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpdate {
    /// Version that was applied
    pub version: String,
}

impl AppliedUpdate {
    /// Create a new applied-update record
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

/// Trait for update mechanisms
///
/// The scheduler invokes [`Updater::apply_next`] at most once at a time and
/// never retries within an attempt: the next attempt only happens after the
/// fixed interval.
///
/// # Return Values
///
/// - `Ok(AppliedUpdate)`: An update was found and applied
/// - `Err(Error::NoUpdateAvailable)`: The running version is current
/// - `Err(_)`: Anything else (network, verification, installation)
///
/// The scheduler handles "no update" and "error" identically apart from the
/// log level.
#[async_trait]
pub trait Updater<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    /// Check for and apply the next update
    ///
    /// # Parameters
    ///
    /// - `identity`: Running version, service URL and signing public key
    /// - `client`: The client installed at the start of this attempt
    async fn apply_next(
        &self,
        identity: &UpdateIdentity,
        client: &C,
    ) -> Result<AppliedUpdate, crate::Error>;
}
