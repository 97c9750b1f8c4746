//! Offline availability layer for ecriture.
//!
//! This crate makes the application shell usable offline:
//! - Named cache generations in SQLite, one per deployed version
//! - Install / activate lifecycle with whitelist eviction on upgrade
//! - Cache-first fetch interception with opportunistic refresh
//!
//! The controller operates transparently at the network boundary; staleness
//! is bounded by the install/activate cycle of a deployment, not by
//! per-resource expiry.

pub mod config;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod generations;
pub mod hash;
pub mod migrations;

pub use config::{ConfigError, OfflineConfig};
pub use controller::{InterceptedResponse, OfflineCacheController, Phase, ResponseSource};
pub use error::OfflineError;
pub use fetch::{FetchClient, FetchResponse};
pub use generations::{CacheStore, CachedResponse};
