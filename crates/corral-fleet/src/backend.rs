//! Provisioning backends and domain handles.
//!
//! A backend is a pluggable provisioner capable of creating domains over a
//! set of connections; a domain is a runtime handle to one live VM instance.
//! The concrete hypervisor mechanics live behind these traits; the
//! orchestrator only ever sees `start`/`stop`/`is_alive`/`ip_address`.
//!
//! [`SimulatedBackend`] is a first-class in-process implementation used by
//! the tests and the daemon's dry-run mode.

use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use corral_core::{ConnectionUri, DomainConfig, DomainId, FleetError, Platform, Result};

/// Runtime handle to one live VM instance.
///
/// The domain pool exclusively owns a domain once provisioned; the watchdog
/// holds only a monitoring reference and never stops or destroys a domain
/// itself.
#[async_trait]
pub trait Domain: Send + Sync {
    /// Returns this domain's identifier.
    fn id(&self) -> &DomainId;

    /// Boots the domain (or re-boots a stopped one) and returns its address.
    async fn start(&self) -> Result<IpAddr>;

    /// Stops and releases the domain.
    async fn stop(&self) -> Result<()>;

    /// Probes whether the domain is currently alive.
    ///
    /// An `Err` here means the probe itself faulted, not that the domain is
    /// down; the watchdog treats probe faults as alive (fail-open).
    async fn is_alive(&self) -> Result<bool>;

    /// Returns the domain's address, absent until it has been started.
    fn ip_address(&self) -> Option<IpAddr>;
}

/// Cheap, cloneable reference to a [`Domain`].
///
/// Equality is handle identity (`Arc` pointer equality), so removing a
/// handle from a pool removes exactly the instance that was added. Two
/// domains with coincidentally equal IDs stay distinct.
#[derive(Clone)]
pub struct DomainHandle {
    inner: Arc<dyn Domain>,
}

impl DomainHandle {
    /// Wraps a domain implementation in a shared handle.
    pub fn new(domain: Arc<dyn Domain>) -> Self {
        Self { inner: domain }
    }
}

impl Deref for DomainHandle {
    type Target = dyn Domain;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl PartialEq for DomainHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DomainHandle {}

impl fmt::Debug for DomainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainHandle")
            .field("id", self.inner.id())
            .field("ip", &self.inner.ip_address())
            .finish()
    }
}

/// A pluggable provisioner capable of creating domains over a set of
/// connections.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Returns this backend's type name, matched against configuration.
    fn backend_type(&self) -> &str;

    /// Checks whether this backend can serve `platform` through `uri`.
    ///
    /// May perform I/O. Results are never cached by callers, since backend
    /// capability can change between calls.
    async fn supports(&self, platform: &Platform, uri: &ConnectionUri) -> Result<bool>;

    /// Provisions a new domain through the given connection.
    async fn create_domain(
        &self,
        config: &DomainConfig,
        uri: &ConnectionUri,
    ) -> Result<DomainHandle>;
}

/// In-process domain used by [`SimulatedBackend`].
///
/// Liveness and start/stop behavior are scriptable from tests:
/// [`set_alive`](SimulatedDomain::set_alive) flips what the probe reports,
/// [`fail_probes`](SimulatedDomain::fail_probes) makes the probe itself
/// fault, and [`start_count`](SimulatedDomain::start_count) exposes how many
/// resurrection attempts the domain has seen.
pub struct SimulatedDomain {
    id: DomainId,
    ip: Mutex<Option<IpAddr>>,
    assigned_ip: IpAddr,
    alive: AtomicBool,
    probe_faulty: AtomicBool,
    start_count: AtomicUsize,
}

impl SimulatedDomain {
    fn new(id: DomainId, assigned_ip: IpAddr) -> Self {
        Self {
            id,
            ip: Mutex::new(None),
            assigned_ip,
            alive: AtomicBool::new(false),
            probe_faulty: AtomicBool::new(false),
            start_count: AtomicUsize::new(0),
        }
    }

    /// Scripts what the liveness probe reports.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Makes every subsequent probe return an error instead of a verdict.
    pub fn fail_probes(&self, faulty: bool) {
        self.probe_faulty.store(faulty, Ordering::SeqCst);
    }

    /// Number of times `start` has been called on this domain.
    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Domain for SimulatedDomain {
    fn id(&self) -> &DomainId {
        &self.id
    }

    async fn start(&self) -> Result<IpAddr> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);
        let mut ip = self.ip.lock().unwrap_or_else(|e| e.into_inner());
        *ip = Some(self.assigned_ip);
        Ok(self.assigned_ip)
    }

    async fn stop(&self) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_alive(&self) -> Result<bool> {
        if self.probe_faulty.load(Ordering::SeqCst) {
            return Err(FleetError::probe(&self.id, "simulated probe fault"));
        }
        Ok(self.alive.load(Ordering::SeqCst))
    }

    fn ip_address(&self) -> Option<IpAddr> {
        *self.ip.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Simulated provisioning backend for tests and dry runs.
///
/// Supported platforms are declared per connection with
/// [`support`](SimulatedBackend::support); provisioning failures can be
/// injected with [`fail_creates`](SimulatedBackend::fail_creates). Every
/// created domain and the connection it was created through are recorded for
/// later assertions.
pub struct SimulatedBackend {
    backend_type: String,
    supported: Mutex<Vec<(ConnectionUri, Platform)>>,
    created: Mutex<Vec<(ConnectionUri, Arc<SimulatedDomain>)>>,
    fail_creates: AtomicBool,
    next_host: AtomicUsize,
}

impl SimulatedBackend {
    /// Creates a simulated backend with the given type name.
    pub fn new(backend_type: impl Into<String>) -> Self {
        Self {
            backend_type: backend_type.into(),
            supported: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            fail_creates: AtomicBool::new(false),
            next_host: AtomicUsize::new(0),
        }
    }

    /// Declares that `platform` is served through `uri`.
    pub fn support(&self, uri: ConnectionUri, platform: Platform) {
        let mut supported = self.supported.lock().unwrap_or_else(|e| e.into_inner());
        supported.push((uri, platform));
    }

    /// Injects provisioning failures for every subsequent `create_domain`.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Returns every domain created so far, with the connection used.
    pub fn created(&self) -> Vec<(ConnectionUri, Arc<SimulatedDomain>)> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ProvisioningBackend for SimulatedBackend {
    fn backend_type(&self) -> &str {
        &self.backend_type
    }

    async fn supports(&self, platform: &Platform, uri: &ConnectionUri) -> Result<bool> {
        let supported = self.supported.lock().unwrap_or_else(|e| e.into_inner());
        Ok(supported.iter().any(|(u, p)| u == uri && p == platform))
    }

    async fn create_domain(
        &self,
        config: &DomainConfig,
        uri: &ConnectionUri,
    ) -> Result<DomainHandle> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(FleetError::provisioning(
                &self.backend_type,
                "simulated provisioning failure",
            ));
        }

        let id = match &config.name {
            Some(name) => DomainId::new(name.clone()),
            None => DomainId::generate(),
        };
        // Hosts spread over 10.0.x.1..=10.0.x.254 so the pool stays unique
        // well past 255 domains; .0 and .255 per octet are skipped.
        let host = self.next_host.fetch_add(1, Ordering::SeqCst);
        let ip = IpAddr::V4(Ipv4Addr::new(
            10,
            0,
            (host / 254) as u8,
            (host % 254 + 1) as u8,
        ));

        let domain = Arc::new(SimulatedDomain::new(id, ip));
        {
            let mut created = self.created.lock().unwrap_or_else(|e| e.into_inner());
            created.push((uri.clone(), Arc::clone(&domain)));
        }

        Ok(DomainHandle::new(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> Platform {
        Platform::new("x86_64", "linux", "jvm-21")
    }

    #[tokio::test]
    async fn handle_equality_is_identity() {
        let backend = SimulatedBackend::new("simulated");
        let uri = ConnectionUri::new("sim://a");

        let a = backend
            .create_domain(&DomainConfig::new(platform()), &uri)
            .await
            .expect("create should succeed");
        let b = backend
            .create_domain(&DomainConfig::new(platform()), &uri)
            .await
            .expect("create should succeed");

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn simulated_domain_lifecycle() {
        let backend = SimulatedBackend::new("simulated");
        let uri = ConnectionUri::new("sim://a");
        let config = DomainConfig::new(platform()).with_name("worker-1");

        let handle = backend
            .create_domain(&config, &uri)
            .await
            .expect("create should succeed");
        assert_eq!(handle.id().as_str(), "worker-1");
        assert!(handle.ip_address().is_none());

        let ip = handle.start().await.expect("start should succeed");
        assert_eq!(handle.ip_address(), Some(ip));
        assert!(handle.is_alive().await.expect("probe should succeed"));

        handle.stop().await.expect("stop should succeed");
        assert!(!handle.is_alive().await.expect("probe should succeed"));
    }

    #[tokio::test]
    async fn supports_is_per_connection() {
        let backend = SimulatedBackend::new("simulated");
        let a = ConnectionUri::new("sim://a");
        let b = ConnectionUri::new("sim://b");
        backend.support(b.clone(), platform());

        assert!(!backend
            .supports(&platform(), &a)
            .await
            .expect("probe should succeed"));
        assert!(backend
            .supports(&platform(), &b)
            .await
            .expect("probe should succeed"));
    }

    #[tokio::test]
    async fn assigned_ips_stay_unique_past_a_full_octet() {
        let backend = SimulatedBackend::new("simulated");
        let uri = ConnectionUri::new("sim://a");

        let mut ips = std::collections::HashSet::new();
        for _ in 0..300 {
            let handle = backend
                .create_domain(&DomainConfig::new(platform()), &uri)
                .await
                .expect("create should succeed");
            let ip = handle.start().await.expect("start should succeed");
            assert!(ips.insert(ip), "duplicate ip {ip}");
        }
    }

    #[tokio::test]
    async fn injected_create_failure_surfaces_as_provisioning_error() {
        let backend = SimulatedBackend::new("simulated");
        backend.fail_creates(true);

        let err = backend
            .create_domain(&DomainConfig::new(platform()), &ConnectionUri::new("sim://a"))
            .await
            .expect_err("create should fail");
        assert!(matches!(err, FleetError::Provisioning { .. }));
    }
}
