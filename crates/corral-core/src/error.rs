//! Error types for fleet orchestration.
//!
//! One taxonomy for the whole subsystem. Configuration problems are
//! aggregated and fatal at construction; everything else is a per-request or
//! per-domain failure that leaves the orchestrator usable.

use thiserror::Error;

use crate::types::{DomainId, Platform};

/// Result type for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Errors that can occur while provisioning, pooling, or monitoring domains.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Invalid or incomplete configuration, detected eagerly at orchestrator
    /// construction. Every violation found is collected here; the caller
    /// gets one report, not the first problem.
    #[error("invalid fleet configuration: {}", .0.join("; "))]
    Configuration(Vec<String>),

    /// No backend binding could serve the requested platform.
    #[error("no backend supports platform {platform}")]
    UnsupportedPlatform {
        /// The platform that could not be served.
        platform: String,
    },

    /// A backend failed to create or boot a domain.
    #[error("backend {backend} failed to provision domain: {reason}")]
    Provisioning {
        /// The backend type that failed.
        backend: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A pooled domain has no IP address to bind a transport to.
    #[error("domain {domain} has no address")]
    DomainUnaddressable {
        /// The domain without an address.
        domain: DomainId,
    },

    /// A liveness probe faulted (not merely "not alive"). Fail-open: the
    /// watchdog logs this and treats the domain as alive.
    #[error("liveness probe failed for domain {domain}: {reason}")]
    Probe {
        /// The probed domain.
        domain: DomainId,
        /// The reason for the probe fault.
        reason: String,
    },

    /// A domain could not be stopped during shutdown. Logged per domain;
    /// never halts stopping the rest of the fleet.
    #[error("failed to stop domain {domain}: {reason}")]
    Stop {
        /// The domain that failed to stop.
        domain: DomainId,
        /// The reason for the failure.
        reason: String,
    },

    /// A backend connection could not be opened or closed.
    #[error("connection {uri} failed: {reason}")]
    Connection {
        /// The connection endpoint.
        uri: String,
        /// The reason for the failure.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// Creates a configuration error from a single violation.
    pub fn configuration(violation: impl Into<String>) -> Self {
        Self::Configuration(vec![violation.into()])
    }

    /// Creates an unsupported-platform error.
    pub fn unsupported_platform(platform: &Platform) -> Self {
        Self::UnsupportedPlatform {
            platform: platform.to_string(),
        }
    }

    /// Creates a provisioning error.
    pub fn provisioning(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provisioning {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Creates a domain-unaddressable error.
    pub fn domain_unaddressable(domain: &DomainId) -> Self {
        Self::DomainUnaddressable {
            domain: domain.clone(),
        }
    }

    /// Creates a probe error.
    pub fn probe(domain: &DomainId, reason: impl Into<String>) -> Self {
        Self::Probe {
            domain: domain.clone(),
            reason: reason.into(),
        }
    }

    /// Creates a stop error.
    pub fn stop(domain: &DomainId, reason: impl Into<String>) -> Self {
        Self::Stop {
            domain: domain.clone(),
            reason: reason.into(),
        }
    }

    /// Creates a connection error.
    pub fn connection(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the operation could succeed.
    ///
    /// Configuration and unsupported-platform errors are deterministic and
    /// never retryable; provisioning and connection faults may be transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provisioning { .. } | Self::Connection { .. } | Self::Probe { .. } | Self::Io(_)
        )
    }

    /// Returns true if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is an unsupported-platform error.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedPlatform { .. })
    }

    /// Returns the individual violations of a configuration error.
    pub fn violations(&self) -> &[String] {
        match self {
            Self::Configuration(violations) => violations,
            _ => &[],
        }
    }
}
