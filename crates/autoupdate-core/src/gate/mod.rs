//! Configuration gate
//!
//! The gate receives configuration snapshots, drops repeats, and on a genuine
//! change (re)builds the proxied client and starts the update scheduler the
//! first time a client becomes available.
//!
//! ## Serialization
//!
//! [`ConfigurationGate::configure`] only enqueues the snapshot. A single
//! worker task drains the queue, so snapshots are applied strictly in order
//! and one at a time; the caller never waits for client construction.
//!
//! ## Event Flow
//!
//! 1. Snapshot dequeued
//! 2. Same proxy address as the last one applied → no-op
//! 3. Record the address as applied (even if the next steps fail)
//! 4. Empty address or client build failure → clear the client, updates disabled
//! 5. Otherwise install the client and start the scheduler once

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::ProxyConfig;
use crate::engine::{DisableReason, EngineEvent, EventSink};
use crate::scheduler::UpdateScheduler;
use crate::state::UpdaterState;
use crate::traits::ClientFactory;

/// Work item for the gate worker
#[derive(Debug)]
enum GateCommand {
    /// Apply a configuration snapshot
    Apply(ProxyConfig),
    /// Acknowledge once every earlier command has been processed
    Flush(oneshot::Sender<()>),
}

/// Handle for submitting configuration snapshots
///
/// Cheap to clone; every clone feeds the same worker.
#[derive(Debug, Clone)]
pub struct ConfigurationGate {
    tx: mpsc::UnboundedSender<GateCommand>,
}

impl ConfigurationGate {
    /// Submit a configuration snapshot
    ///
    /// Returns immediately and never fails. The outcome is only observable
    /// through logs and [`EngineEvent`]s.
    pub fn configure(&self, config: ProxyConfig) {
        if self.tx.send(GateCommand::Apply(config)).is_err() {
            warn!("Configuration gate has stopped, ignoring configuration");
        }
    }

    /// Wait until every snapshot submitted before this call has been applied
    ///
    /// Returns immediately if the gate has stopped.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(GateCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Single worker that owns the "last applied" address
pub(crate) struct GateWorker<F: ClientFactory> {
    /// Builds proxied clients
    factory: Arc<F>,

    /// Shared client slot and watch flag
    state: Arc<UpdaterState<F::Client>>,

    /// Scheduler to start on the first installed client
    scheduler: Arc<UpdateScheduler<F::Client>>,

    /// Tracks the scheduler task
    tracker: TaskTracker,

    /// Engine-wide shutdown signal
    cancel: CancellationToken,

    /// Event sink for external monitoring
    events: EventSink,

    /// Proxy address of the last snapshot applied, `None` before the first
    last_address: Option<String>,
}

impl<F: ClientFactory> GateWorker<F> {
    pub(crate) fn new(
        factory: Arc<F>,
        state: Arc<UpdaterState<F::Client>>,
        scheduler: Arc<UpdateScheduler<F::Client>>,
        tracker: TaskTracker,
        cancel: CancellationToken,
        events: EventSink,
    ) -> Self {
        Self {
            factory,
            state,
            scheduler,
            tracker,
            cancel,
            events,
            last_address: None,
        }
    }

    /// Spawn the worker on its tracker and return the submission handle
    pub(crate) fn spawn(self) -> ConfigurationGate {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = self.tracker.clone();
        tracker.spawn(self.run(rx));
        ConfigurationGate { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GateCommand>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(GateCommand::Apply(config)) => self.apply(config).await,
                    Some(GateCommand::Flush(done)) => {
                        let _ = done.send(());
                    }
                    None => break,
                },
            }
        }

        debug!("Configuration gate stopped");
    }

    /// Apply one configuration snapshot
    async fn apply(&mut self, config: ProxyConfig) {
        // Only the proxy address identifies a configuration
        if self.last_address.as_deref() == Some(config.proxy_address.as_str()) {
            debug!("Autoupdate configuration unchanged");
            self.events.emit(EngineEvent::ConfigurationUnchanged {
                proxy_address: config.proxy_address,
            });
            return;
        }

        self.last_address = Some(config.proxy_address.clone());

        if !config.has_proxy() {
            self.state.disable().await;
            error!("No known proxy, disabling auto updates");
            self.events.emit(EngineEvent::UpdatesDisabled {
                reason: DisableReason::NoProxy,
            });
            return;
        }

        let client = match self
            .factory
            .build(&config.ca_certificate, &config.proxy_address)
        {
            Ok(client) => client,
            Err(e) => {
                self.state.disable().await;
                error!(
                    "Could not create proxied HTTP client for {}, disabling auto updates: {}",
                    config.proxy_address, e
                );
                self.events.emit(EngineEvent::UpdatesDisabled {
                    reason: DisableReason::ClientBuildFailed(e.to_string()),
                });
                return;
            }
        };

        self.state.install(client).await;
        info!("Auto updates enabled through proxy {}", config.proxy_address);
        self.events.emit(EngineEvent::ClientInstalled {
            proxy_address: config.proxy_address,
        });

        if self.state.begin_watching() {
            let scheduler = Arc::clone(&self.scheduler);
            let cancel = self.cancel.child_token();
            self.tracker.spawn(async move { scheduler.run(cancel).await });

            info!(
                "Watching for updates every {:?}",
                self.scheduler.interval()
            );
            self.events.emit(EngineEvent::SchedulerStarted);
        }
    }
}
