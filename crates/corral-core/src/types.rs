//! Value types shared across the fleet.
//!
//! These are immutable descriptors: a [`Platform`] a caller wants a domain
//! to satisfy, a [`ConnectionUri`] for reaching a provisioning backend, and
//! the transient [`DomainConfig`] handed to a backend when provisioning.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A target architecture/OS/runtime combination a domain must satisfy.
///
/// Platforms are loaded from configuration and never mutated at runtime.
/// Equality and hashing are by value, so a platform can key capability
/// lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture, e.g. `x86_64` or `aarch64`.
    pub arch: String,

    /// Operating system, e.g. `linux`.
    pub os: String,

    /// Runtime flavor the test payload needs, e.g. `jvm-21` or `native`.
    pub runtime: String,
}

impl Platform {
    /// Creates a new platform descriptor.
    pub fn new(
        arch: impl Into<String>,
        os: impl Into<String>,
        runtime: impl Into<String>,
    ) -> Self {
        Self {
            arch: arch.into(),
            os: os.into(),
            runtime: runtime.into(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.arch, self.os, self.runtime)
    }
}

/// Endpoint descriptor for reaching a provisioning backend.
///
/// Identity is the URI value itself: two `ConnectionUri`s are the same
/// connection iff their strings are equal. The URI doubles as the key into
/// the shared connection registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionUri(String);

impl ConnectionUri {
    /// Creates a connection URI from its string form.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Returns the URI as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionUri {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

/// Identifier of a provisioned domain.
///
/// Used for log correlation and watchdog bookkeeping. Backends may derive it
/// from the requested domain name or generate one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

impl DomainId {
    /// Creates a domain ID from an explicit name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generates a fresh random domain ID.
    pub fn generate() -> Self {
        Self(format!("corral-{}", uuid::Uuid::new_v4()))
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transient provisioning request handed to a backend.
///
/// Produced per provisioning call and discarded after use. An absent `name`
/// means the backend must auto-generate one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// The platform the new domain must satisfy.
    pub platform: Platform,

    /// Requested domain name, if the caller cares.
    pub name: Option<String>,
}

impl DomainConfig {
    /// Creates a provisioning request with an auto-generated name.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            name: None,
        }
    }

    /// Sets an explicit domain name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
