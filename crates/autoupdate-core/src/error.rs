//! Error types for the auto-update system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for auto-update operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the auto-update system
#[derive(Error, Debug)]
pub enum Error {
    /// Building the proxied network client failed
    #[error("Client construction error: {0}")]
    ClientBuild(String),

    /// The update service has nothing newer than the running version
    #[error("No update available")]
    NoUpdateAvailable,

    /// An update attempt failed (download, verification, installation)
    #[error("Update error: {0}")]
    Update(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (staging files, certificates)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP errors talking to the update service
    #[error("HTTP error: {0}")]
    Http(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a client construction error
    pub fn client_build(msg: impl Into<String>) -> Self {
        Self::ClientBuild(msg.into())
    }

    /// Create an update error
    pub fn update(msg: impl Into<String>) -> Self {
        Self::Update(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether this error only means "nothing to update"
    ///
    /// The scheduler treats this the same as any other failure, but logs it
    /// at a lower level.
    pub fn is_no_update(&self) -> bool {
        matches!(self, Self::NoUpdateAvailable)
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_update_is_distinguishable() {
        assert!(Error::NoUpdateAvailable.is_no_update());
        assert!(!Error::update("signature mismatch").is_no_update());
    }

    #[test]
    fn anyhow_errors_keep_their_message() {
        let err: Error = anyhow::anyhow!("proxy refused CONNECT").into();
        assert_eq!(err.to_string(), "proxy refused CONNECT");
    }
}
