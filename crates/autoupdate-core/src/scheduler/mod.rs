//! Update scheduler
//!
//! The scheduler is a single perpetual loop:
//!
//! ```text
//!   ┌──────────────────────────────────────────────┐
//!   │                                              │
//!   ▼                                              │
//! lock update guard ──► read installed client      │
//!                          │                       │
//!              none ◄──────┴──────► some           │
//!               │                    │             │
//!            (skip)        Updater::apply_next     │
//!               │                    │             │
//!               └────► release guard ◄┘            │
//!                          │                       │
//!                   sleep fixed interval ──────────┘
//! ```
//!
//! Failures never end the loop. The update guard covers only the updater
//! call, never the sleep, and the client is read fresh for every attempt so
//! reconfiguration takes effect on the next iteration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UpdateIdentity;
use crate::engine::{EngineEvent, EventSink};
use crate::state::UpdaterState;
use crate::traits::{AppliedUpdate, Updater};

/// Result of a single update attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// No client was installed; the updater was not called
    Skipped,
    /// The updater applied an update
    Applied(AppliedUpdate),
    /// The updater reported no update available
    UpToDate,
    /// The updater failed
    Failed(String),
}

/// Perpetual fixed-interval update loop
///
/// Constructed once per engine and started by the configuration gate the
/// first time a client is installed.
pub struct UpdateScheduler<C> {
    /// Update mechanism
    updater: Arc<dyn Updater<C>>,

    /// Shared client slot
    state: Arc<UpdaterState<C>>,

    /// Static identity passed to every attempt
    identity: Arc<UpdateIdentity>,

    /// Delay between attempts
    interval: Duration,

    /// Held for the duration of one updater call
    update_lock: Mutex<()>,

    /// Event sink for external monitoring
    events: EventSink,
}

impl<C> UpdateScheduler<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Create a new scheduler
    ///
    /// # Parameters
    ///
    /// - `updater`: Update mechanism
    /// - `state`: Shared state written by the configuration gate
    /// - `identity`: Static identity of the running software
    /// - `interval`: Fixed delay between attempts
    /// - `events`: Event sink
    pub fn new(
        updater: Arc<dyn Updater<C>>,
        state: Arc<UpdaterState<C>>,
        identity: Arc<UpdateIdentity>,
        interval: Duration,
        events: EventSink,
    ) -> Self {
        Self {
            updater,
            state,
            identity,
            interval,
            update_lock: Mutex::new(()),
            events,
        }
    }

    /// Fixed delay between attempts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one update attempt
    ///
    /// Waits for any attempt already in progress. Concurrent callers are
    /// serialized: the updater is never invoked re-entrantly.
    pub async fn attempt(&self) -> AttemptOutcome {
        let _guard = self.update_lock.lock().await;

        let Some(client) = self.state.client().await else {
            debug!("No proxied client installed, skipping update attempt");
            self.events.emit(EngineEvent::AttemptSkipped);
            return AttemptOutcome::Skipped;
        };

        match self.updater.apply_next(&self.identity, &client).await {
            Ok(applied) => {
                info!("Got update: {}", applied.version);
                self.events.emit(EngineEvent::AttemptSucceeded {
                    version: applied.version.clone(),
                });
                AttemptOutcome::Applied(applied)
            }
            Err(e) if e.is_no_update() => {
                debug!("No update available for version {}", self.identity.current_version);
                self.events.emit(EngineEvent::AttemptFailed {
                    error: e.to_string(),
                });
                AttemptOutcome::UpToDate
            }
            Err(e) => {
                warn!("Error getting update: {}", e);
                self.events.emit(EngineEvent::AttemptFailed {
                    error: e.to_string(),
                });
                AttemptOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run the loop until `cancel` fires
    ///
    /// Production wiring passes a token that is only cancelled on process
    /// shutdown. Cancellation interrupts both an in-flight attempt and the
    /// sleep between attempts.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Software version: {}", self.identity.current_version);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.attempt() => {
                    debug!("Update attempt finished: {:?}", outcome);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Update scheduler stopped");
        self.events.emit(EngineEvent::SchedulerStopped);
    }
}
