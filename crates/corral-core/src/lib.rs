//! Shared foundation for the corral domain fleet.
//!
//! This crate carries the value types, the error taxonomy, and the
//! configuration model that the fleet orchestration subsystem is built on.
//! It contains no I/O and no runtime dependencies so that every other crate
//! in the workspace can depend on it without pulling in the orchestrator.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::FleetConfig;
pub use error::{FleetError, Result};
pub use types::{ConnectionUri, DomainConfig, DomainId, Platform};
