// # Updater State
//
// Shared state between the configuration gate and the update scheduler.
//
// ## Contents
//
// - **Installed client**: single slot, replaced on every successful
//   reconfiguration, cleared when updates are disabled
// - **Watch flag**: set the first time the scheduler is started, never cleared
//
// The slot is written only by the gate worker and read by the scheduler at
// the start of each attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Shared state owned by one [`AutoUpdateEngine`](crate::AutoUpdateEngine)
#[derive(Debug)]
pub struct UpdaterState<C> {
    client: RwLock<Option<C>>,
    watching: AtomicBool,
}

impl<C: Clone> UpdaterState<C> {
    /// Create an empty state: no client installed, scheduler not started
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
            watching: AtomicBool::new(false),
        }
    }

    /// Install a new client, replacing any previous one
    pub async fn install(&self, client: C) {
        *self.client.write().await = Some(client);
    }

    /// Clear the installed client
    ///
    /// Returns `true` if a client was installed before the call.
    pub async fn disable(&self) -> bool {
        self.client.write().await.take().is_some()
    }

    /// Clone of the currently installed client, if any
    ///
    /// The read lock is released before this returns, so a caller holding the
    /// clone never blocks reconfiguration.
    pub async fn client(&self) -> Option<C> {
        self.client.read().await.clone()
    }

    /// Whether the scheduler has ever been started
    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::Acquire)
    }

    /// Mark the scheduler as started
    ///
    /// Returns `true` for exactly one caller over the lifetime of the state,
    /// no matter how many callers race.
    pub fn begin_watching(&self) -> bool {
        self.watching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<C: Clone> Default for UpdaterState<C> {
    fn default() -> Self {
        Self::new()
    }
}
