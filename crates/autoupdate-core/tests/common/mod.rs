//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that record how the core
//! drives its two capabilities without doing any real networking.

#![allow(dead_code)]

use autoupdate_core::error::{Error, Result};
use autoupdate_core::traits::{AppliedUpdate, ClientFactory, Updater};
use autoupdate_core::{AutoUpdateEngine, EngineConfig, EngineEvent, UpdateIdentity};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};

/// Client produced by [`CountingClientFactory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockClient {
    /// Proxy address the client was built for
    pub proxy_address: String,
    /// CA certificate the client was built with
    pub ca_certificate: Vec<u8>,
    /// Build sequence number (1-based)
    pub serial: usize,
}

/// A ClientFactory that counts builds and can be told to fail
pub struct CountingClientFactory {
    /// Call counter for build()
    build_call_count: Arc<AtomicUsize>,
    /// Addresses for which build() fails
    failing_addresses: Arc<HashSet<String>>,
}

impl CountingClientFactory {
    pub fn new() -> Self {
        Self {
            build_call_count: Arc::new(AtomicUsize::new(0)),
            failing_addresses: Arc::new(HashSet::new()),
        }
    }

    /// A factory whose build() fails for the given addresses
    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            build_call_count: Arc::new(AtomicUsize::new(0)),
            failing_addresses: Arc::new(addresses.iter().map(|a| a.to_string()).collect()),
        }
    }

    /// Get the number of times build() was called
    pub fn build_call_count(&self) -> usize {
        self.build_call_count.load(Ordering::SeqCst)
    }

    /// Create a new factory that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            build_call_count: Arc::clone(&other.build_call_count),
            failing_addresses: Arc::clone(&other.failing_addresses),
        }
    }
}

impl ClientFactory for CountingClientFactory {
    type Client = MockClient;

    fn build(&self, ca_certificate: &[u8], proxy_address: &str) -> Result<MockClient> {
        let serial = self.build_call_count.fetch_add(1, Ordering::SeqCst) + 1;

        if self.failing_addresses.contains(proxy_address) {
            return Err(Error::client_build(format!(
                "cannot reach proxy {}",
                proxy_address
            )));
        }

        Ok(MockClient {
            proxy_address: proxy_address.to_string(),
            ca_certificate: ca_certificate.to_vec(),
            serial,
        })
    }
}

/// An Updater that records every call and the proxy it was called through
pub struct RecordingUpdater {
    /// Proxy addresses of the clients passed to apply_next(), in call order
    calls: std::sync::Mutex<Vec<String>>,
    /// Whether apply_next() should fail
    fail: bool,
}

impl RecordingUpdater {
    /// An updater that always reports "no update available"
    pub fn up_to_date() -> Arc<Self> {
        Arc::new(Self {
            calls: std::sync::Mutex::new(Vec::new()),
            fail: false,
        })
    }

    /// An updater that always fails
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: std::sync::Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Updater<MockClient> for RecordingUpdater {
    async fn apply_next(&self, _identity: &UpdateIdentity, client: &MockClient) -> Result<AppliedUpdate> {
        self.calls
            .lock()
            .unwrap()
            .push(client.proxy_address.clone());

        if self.fail {
            Err(Error::update("update service unreachable"))
        } else {
            Err(Error::NoUpdateAvailable)
        }
    }
}

/// An Updater that records a violation if it is ever entered twice at once
pub struct ReentrancyCheckingUpdater {
    in_flight: AtomicBool,
    violations: AtomicUsize,
    calls: AtomicUsize,
    hold: std::time::Duration,
}

impl ReentrancyCheckingUpdater {
    pub fn new(hold: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicBool::new(false),
            violations: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            hold,
        })
    }

    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Updater<MockClient> for ReentrancyCheckingUpdater {
    async fn apply_next(&self, _identity: &UpdateIdentity, _client: &MockClient) -> Result<AppliedUpdate> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }

        tokio::time::sleep(self.hold).await;

        self.in_flight.store(false, Ordering::SeqCst);
        Ok(AppliedUpdate::new("2.0.0"))
    }
}

/// An Updater whose first call blocks until released
pub struct GatedUpdater {
    /// Notified when the first call has started
    pub entered: Notify,
    /// Notify to let the first call finish
    pub release: Notify,
    first: AtomicBool,
    calls: std::sync::Mutex<Vec<String>>,
}

impl GatedUpdater {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
            first: AtomicBool::new(true),
            calls: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Updater<MockClient> for GatedUpdater {
    async fn apply_next(&self, _identity: &UpdateIdentity, client: &MockClient) -> Result<AppliedUpdate> {
        self.calls
            .lock()
            .unwrap()
            .push(client.proxy_address.clone());

        if self.first.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        Err(Error::NoUpdateAvailable)
    }
}

/// An Updater that never returns
pub struct StuckUpdater;

#[async_trait::async_trait]
impl Updater<MockClient> for StuckUpdater {
    async fn apply_next(&self, _identity: &UpdateIdentity, _client: &MockClient) -> Result<AppliedUpdate> {
        std::future::pending().await
    }
}

/// Identity used by all tests
pub fn test_identity() -> UpdateIdentity {
    UpdateIdentity::new(
        "1.4.2",
        "https://updates.example.net/update",
        b"test-public-key".to_vec(),
    )
}

/// Engine configuration used by all tests (default 2 hour interval)
pub fn test_config() -> EngineConfig {
    EngineConfig::default()
}

/// Build an engine around a shared-counter copy of `factory`
pub fn engine_with(
    factory: &CountingClientFactory,
    updater: Arc<dyn Updater<MockClient>>,
) -> (
    AutoUpdateEngine<CountingClientFactory>,
    mpsc::Receiver<EngineEvent>,
) {
    AutoUpdateEngine::new(
        CountingClientFactory::sharing_counters_with(factory),
        updater,
        test_identity(),
        test_config(),
    )
    .expect("engine construction succeeds")
}

/// Collect every event currently buffered
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Count the SchedulerStarted events in `events`
pub fn scheduler_starts(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::SchedulerStarted))
        .count()
}
