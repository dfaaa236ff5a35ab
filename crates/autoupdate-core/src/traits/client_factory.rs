// # Client Factory Trait
//
// Defines how a proxy-aware network client is built from a configuration
// snapshot.
//
// ## Implementations
//
// - reqwest-based: `autoupdate-http` crate (`ProxiedClientFactory`)
// - Tests: counting doubles in `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use autoupdate_core::ClientFactory;
//
// let factory = /* ClientFactory implementation */;
// let client = factory.build(&ca_pem, "10.0.0.1:8080")?;
// ```

/// Trait for building the network client used to reach the update service
///
/// The configuration gate calls [`ClientFactory::build`] once per distinct
/// proxy address. The returned client is installed as a whole: it is never
/// observed half-built by the scheduler.
///
/// # Thread Safety
///
/// Implementations must be thread-safe. Clients are cloned out of the shared
/// slot for every update attempt, so `Client` should be cheap to clone (for
/// example an `Arc`-backed handle such as `reqwest::Client`).
///
/// # Responsibilities
///
/// - ✅ Configure proxy routing and trusted certificates
/// - ❌ Decide whether updates are enabled (the gate does that)
/// - ❌ Retry on failure (a failed build disables updates until the address changes)
pub trait ClientFactory: Send + Sync + 'static {
    /// The client type handed to the [`Updater`](crate::Updater)
    type Client: Clone + Send + Sync + 'static;

    /// Build a client that routes through `proxy_address`
    ///
    /// # Parameters
    ///
    /// - `ca_certificate`: PEM-encoded CA certificate (may be empty)
    /// - `proxy_address`: Non-empty proxy address
    ///
    /// # Returns
    ///
    /// - `Ok(Client)`: A fully configured client
    /// - `Err(Error)`: The reason is opaque to the core and only logged
    fn build(
        &self,
        ca_certificate: &[u8],
        proxy_address: &str,
    ) -> Result<Self::Client, crate::Error>;
}
