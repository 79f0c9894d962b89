//! Domain fleet orchestration for a distributed test runner.
//!
//! This crate provisions, pools, and health-monitors a fleet of ephemeral
//! virtual-machine instances ("domains") used as disposable execution
//! targets. Callers ask the [`FleetOrchestrator`] for a transport to some
//! target [`Platform`](corral_core::Platform); the orchestrator decides
//! whether to provision a new domain through a capable backend, balances
//! callers across a bounded pool of domains, and a background
//! [`HealthWatchdog`] evicts domains that stay dead past a grace period.
//!
//! # Architecture
//!
//! - [`pool`]: generic round-robin container that suspends callers while
//!   empty; the concurrency primitive everything else is built on
//! - [`registry`]: refcounted, per-identity-locked cache of opened backend
//!   connections
//! - [`backend`]: the provisioning backend and domain handle traits, plus a
//!   simulated backend for tests and dry runs
//! - [`binding`]: pairs one backend with its round-robin connection pool
//! - [`watchdog`]: periodic liveness poller with a grace-period recovery
//!   policy
//! - [`orchestrator`]: the top-level coordinator that ties it all together
//! - [`transport`]: the `(address, timeout)` handle callers receive; wire
//!   framing is an external collaborator
//!
//! # Example
//!
//! ```ignore
//! use corral_core::{FleetConfig, Platform};
//! use corral_fleet::{FleetOrchestrator, backend::SimulatedBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> corral_core::Result<()> {
//!     let config = FleetConfig::load("corral.toml")?;
//!     let backend = Arc::new(SimulatedBackend::new("simulated"));
//!
//!     let orchestrator = FleetOrchestrator::new(&config, vec![backend]).await?;
//!     orchestrator.start().await;
//!
//!     let transport = orchestrator
//!         .get_transport(&Platform::new("x86_64", "linux", "jvm-21"))
//!         .await?;
//!     println!("runner endpoint: {}", transport.addr());
//!
//!     orchestrator.stop().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod binding;
pub mod orchestrator;
pub mod pool;
pub mod registry;
pub mod transport;
pub mod watchdog;

pub use backend::{Domain, DomainHandle, ProvisioningBackend, SimulatedBackend};
pub use binding::BackendBinding;
pub use orchestrator::FleetOrchestrator;
pub use pool::RoundRobinPool;
pub use registry::{ConnectionOpener, SharedConnectionRegistry};
pub use transport::Transport;
pub use watchdog::{DeathListener, GracePeriodStrategy, HealthWatchdog, Liveness, WatchdogStrategy};
