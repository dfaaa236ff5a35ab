// # autoupdate-core
//
// Core library for keeping a long-running client application up to date
// through a configurable forward proxy.
//
// ## Architecture Overview
//
// - **ClientFactory**: Trait for building a proxy-aware network client
// - **Updater**: Trait for checking, fetching and applying the next update
// - **ConfigurationGate**: Deduplicates configuration snapshots and (re)installs the client
// - **UpdateScheduler**: Perpetual fixed-interval loop that runs one update attempt at a time
// - **AutoUpdateEngine**: Wires the gate and the scheduler together around shared state
//
// ## Design Principles
//
// 1. **Fire-and-forget configuration**: `configure()` never blocks and never fails
// 2. **Single scheduler**: The update loop is started at most once per engine
// 3. **No overlapping attempts**: Update attempts are serialized by their own lock
// 4. **Fresh client per attempt**: Reconfiguration takes effect without restarting the loop
// 5. **Deterministic shutdown**: Every background task is tracked and cancellable

pub mod traits;
pub mod engine;
pub mod gate;
pub mod scheduler;
pub mod config;
pub mod error;
pub mod state;

// Re-export core types for convenience
pub use config::{EngineConfig, ProxyConfig, UpdateIdentity};
pub use engine::{AutoUpdateEngine, DisableReason, EngineEvent, EventSink};
pub use error::{Error, Result};
pub use gate::ConfigurationGate;
pub use scheduler::{AttemptOutcome, UpdateScheduler};
pub use state::UpdaterState;
pub use traits::{AppliedUpdate, ClientFactory, Updater};
