//! Core traits for the auto-update system
//!
//! This module defines the two external capabilities the core coordinates.
//!
//! - [`ClientFactory`]: Build a network client that routes through the configured proxy
//! - [`Updater`]: Check for, fetch, verify and apply the next update

pub mod client_factory;
pub mod updater;

pub use client_factory::ClientFactory;
pub use updater::{AppliedUpdate, Updater};
