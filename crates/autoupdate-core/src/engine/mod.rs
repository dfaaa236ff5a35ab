//! Auto-update engine
//!
//! The AutoUpdateEngine is responsible for:
//! - Owning the shared state (installed client, watch flag)
//! - Running the configuration gate worker
//! - Starting the update scheduler once a client is available
//! - Shutting every background task down deterministically
//!
//! ## Architecture
//!
//! ```text
//!  configure(ProxyConfig)
//!          │
//!          ▼
//! ┌───────────────────┐   build    ┌───────────────┐
//! │ ConfigurationGate │──────────►│ ClientFactory │
//! └───────────────────┘            └───────────────┘
//!          │ install / clear
//!          ▼
//! ┌───────────────────┐   read    ┌─────────────────┐  apply_next  ┌─────────┐
//! │   UpdaterState    │◄──────────│ UpdateScheduler │─────────────►│ Updater │
//! └───────────────────┘            └─────────────────┘              └─────────┘
//!                        (started once by the gate)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, ProxyConfig, UpdateIdentity};
use crate::error::Result;
use crate::gate::{ConfigurationGate, GateWorker};
use crate::scheduler::UpdateScheduler;
use crate::state::UpdaterState;
use crate::traits::{ClientFactory, Updater};

/// Why updates are currently disabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableReason {
    /// The configuration has no proxy address
    NoProxy,
    /// The client factory rejected the configuration
    ClientBuildFailed(String),
}

/// Events emitted by the AutoUpdateEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A snapshot with the already-applied proxy address was ignored
    ConfigurationUnchanged {
        proxy_address: String,
    },

    /// A new client was built and installed
    ClientInstalled {
        proxy_address: String,
    },

    /// The installed client was cleared
    UpdatesDisabled {
        reason: DisableReason,
    },

    /// The update scheduler was started (at most once per engine)
    SchedulerStarted,

    /// An attempt found no installed client
    AttemptSkipped,

    /// An attempt applied an update
    AttemptSucceeded {
        version: String,
    },

    /// An attempt failed or found nothing to update
    AttemptFailed {
        error: String,
    },

    /// The update scheduler exited after cancellation
    SchedulerStopped,
}

/// Bounded, non-blocking event publisher
///
/// Events are dropped (with a warning) when the channel is full, so a slow
/// consumer never stalls reconfiguration or update attempts.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventSink {
    /// Create a sink and the receiver that observes it
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit an engine event
    pub fn emit(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                // Nobody is listening
            }
        }
    }
}

/// Core auto-update engine
///
/// ## Lifecycle
///
/// 1. Create with [`AutoUpdateEngine::new()`] (inside a tokio runtime)
/// 2. Feed configuration with [`AutoUpdateEngine::configure()`] or [`AutoUpdateEngine::follow()`]
/// 3. The scheduler starts on the first successfully installed client
/// 4. Stop with [`AutoUpdateEngine::shutdown()`]
///
/// Dropping the engine without calling `shutdown()` stops the gate worker
/// once every [`ConfigurationGate`] handle is gone, but leaves a running
/// scheduler alive until the runtime exits.
pub struct AutoUpdateEngine<F: ClientFactory> {
    /// Submission handle for the gate worker
    gate: ConfigurationGate,

    /// Shared client slot and watch flag
    state: Arc<UpdaterState<F::Client>>,

    /// Engine-wide shutdown signal
    cancel: CancellationToken,

    /// Tracks the gate worker, the scheduler and stream followers
    tracker: TaskTracker,
}

impl<F: ClientFactory> AutoUpdateEngine<F> {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `factory`: Client factory implementation
    /// - `updater`: Update mechanism
    /// - `identity`: Running version, service URL and public key
    /// - `config`: Engine configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        factory: F,
        updater: Arc<dyn Updater<F::Client>>,
        identity: UpdateIdentity,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        identity.validate()?;
        config.validate()?;

        let (events, rx) = EventSink::channel(config.event_channel_capacity);
        let state = Arc::new(UpdaterState::new());
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let scheduler = Arc::new(UpdateScheduler::new(
            updater,
            Arc::clone(&state),
            Arc::new(identity),
            config.attempt_interval(),
            events.clone(),
        ));

        let gate = GateWorker::new(
            Arc::new(factory),
            Arc::clone(&state),
            scheduler,
            tracker.clone(),
            cancel.clone(),
            events,
        )
        .spawn();

        let engine = Self {
            gate,
            state,
            cancel,
            tracker,
        };

        Ok((engine, rx))
    }

    /// Submit a configuration snapshot
    ///
    /// Safe to call repeatedly and concurrently. Returns immediately.
    pub fn configure(&self, config: ProxyConfig) {
        self.gate.configure(config);
    }

    /// A cloneable handle for submitting configuration from other tasks
    pub fn gate(&self) -> ConfigurationGate {
        self.gate.clone()
    }

    /// Forward every snapshot of `configs` to the gate
    ///
    /// The forwarding task ends when the stream ends or the engine shuts down.
    pub fn follow<S>(&self, configs: S)
    where
        S: Stream<Item = ProxyConfig> + Send + 'static,
    {
        let gate = self.gate.clone();
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            let mut configs = std::pin::pin!(configs);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = configs.next() => match next {
                        Some(config) => gate.configure(config),
                        None => break,
                    },
                }
            }
            debug!("Configuration stream finished");
        });
    }

    /// Wait until every snapshot submitted so far has been applied
    pub async fn flush(&self) {
        self.gate.flush().await;
    }

    /// Clone of the currently installed client, if any
    pub async fn installed_client(&self) -> Option<F::Client> {
        self.state.client().await
    }

    /// Whether the update scheduler has been started
    pub fn is_watching(&self) -> bool {
        self.state.is_watching()
    }

    /// Stop the gate worker, the scheduler and all followers
    ///
    /// Returns once every background task has exited. An in-flight update
    /// attempt is abandoned.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Auto-update engine stopped");
    }
}
