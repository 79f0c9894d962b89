//! Fleet configuration.
//!
//! Loaded once, at orchestrator construction, from a TOML file. Durations
//! are stored as plain integer fields with accessor methods so the file
//! format stays obvious; semantic validation (backend coverage, connection
//! lists) happens in the orchestrator constructor, where violations can be
//! aggregated against the set of registered backends.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{FleetError, Result};
use crate::types::{ConnectionUri, Platform};

/// Top-level fleet configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Capacity and transport settings.
    pub fleet: FleetSection,

    /// Health watchdog settings.
    pub watchdog: WatchdogSection,

    /// Configured backend types and the connections each may use.
    pub backends: Vec<BackendSection>,

    /// Platforms this fleet is expected to serve.
    pub platforms: Vec<Platform>,
}

impl FleetConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| {
            FleetError::configuration(format!("{}: {e}", path.display()))
        })
    }
}

/// Capacity and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSection {
    /// Hard ceiling on the number of live domains.
    pub max_domains: usize,

    /// Port the test-runner server listens on inside every domain.
    pub server_port: u16,

    /// Transport connect/IO timeout in seconds.
    pub transport_timeout_secs: u64,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            max_domains: 4,
            server_port: 5005,
            transport_timeout_secs: 30,
        }
    }
}

impl FleetSection {
    /// Returns the transport timeout as a Duration.
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }
}

/// Health watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSection {
    /// Interval between liveness poll ticks, in milliseconds.
    pub poll_interval_ms: u64,

    /// How long a domain may stay a zombie before it is declared dead,
    /// in seconds.
    pub grace_period_secs: u64,

    /// Upper bound on a single liveness probe, in milliseconds. A probe
    /// that exceeds this is a probe fault (fail-open), so one slow probe
    /// cannot stall a whole poll tick.
    pub probe_timeout_ms: u64,
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            grace_period_secs: 30,
            probe_timeout_ms: 1000,
        }
    }
}

impl WatchdogSection {
    /// Returns the poll interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the grace period as a Duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Returns the probe timeout as a Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// One configured backend type and its connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    /// Backend type name; must match a registered backend implementation.
    pub backend_type: String,

    /// Connections this backend may provision through.
    #[serde(default)]
    pub connections: Vec<ConnectionUri>,
}
