//! Fleet orchestrator.
//!
//! The top-level coordinator: owns the domain pool and the set of backend
//! bindings, enforces the capacity ceiling, and hands out transports bound
//! to pooled domains. A background [`HealthWatchdog`] evicts domains that
//! stay dead past the grace period.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use corral_core::{DomainConfig, FleetConfig, FleetError, Platform, Result};

use crate::backend::{Domain, DomainHandle, ProvisioningBackend};
use crate::binding::BackendBinding;
use crate::pool::RoundRobinPool;
use crate::transport::Transport;
use crate::watchdog::{DeathListener, GracePeriodStrategy, HealthWatchdog};

/// Watchdog listener that evicts confirmed-dead domains from the pool.
///
/// Eviction only: a confirmed-dead domain is presumed already gone, so it is
/// never stopped here.
struct PoolEviction {
    domains: Arc<RoundRobinPool<DomainHandle>>,
}

#[async_trait]
impl DeathListener for PoolEviction {
    async fn domain_died(&self, domain: &DomainHandle) {
        if self.domains.remove(domain).await {
            info!(domain = %domain.id(), "evicted dead domain from pool");
        }
    }
}

/// Top-level coordinator for the domain fleet.
pub struct FleetOrchestrator {
    domains: Arc<RoundRobinPool<DomainHandle>>,
    bindings: RoundRobinPool<Arc<BackendBinding>>,
    watchdog: Arc<HealthWatchdog>,
    /// Serializes provisioning decisions only; never held across a blocking
    /// draw from the domain pool.
    provision_lock: Mutex<()>,
    max_domains: usize,
    server_port: u16,
    transport_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
    watchdog_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for FleetOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetOrchestrator")
            .field("max_domains", &self.max_domains)
            .field("server_port", &self.server_port)
            .field("transport_timeout", &self.transport_timeout)
            .finish_non_exhaustive()
    }
}

impl FleetOrchestrator {
    /// Builds an orchestrator from configuration and the registered backend
    /// implementations.
    ///
    /// Validation is eager and aggregated: every violation found (a
    /// configured backend type with no registered implementation, a backend
    /// type listing no connections, an empty backend list, a zero domain
    /// ceiling) is collected and reported together in a single
    /// [`FleetError::Configuration`]. On failure there is no partial
    /// orchestrator.
    pub async fn new(
        config: &FleetConfig,
        backends: Vec<Arc<dyn ProvisioningBackend>>,
    ) -> Result<Self> {
        let mut violations = Vec::new();
        let mut bindings = Vec::new();

        if config.fleet.max_domains == 0 {
            violations.push("fleet.max_domains must be at least 1".to_string());
        }
        if config.backends.is_empty() {
            violations.push("no backend types configured".to_string());
        }

        for section in &config.backends {
            let registered = backends
                .iter()
                .find(|b| b.backend_type() == section.backend_type);

            match registered {
                None => violations.push(format!(
                    "no registered backend for configured type \"{}\"",
                    section.backend_type
                )),
                Some(backend) => {
                    if section.connections.is_empty() {
                        violations.push(format!(
                            "backend type \"{}\" lists no connections",
                            section.backend_type
                        ));
                    } else {
                        bindings.push(Arc::new(BackendBinding::new(
                            Arc::clone(backend),
                            section.connections.clone(),
                        )));
                    }
                }
            }
        }

        if !violations.is_empty() {
            return Err(FleetError::Configuration(violations));
        }

        let domains = Arc::new(RoundRobinPool::new());
        let watchdog = Arc::new(HealthWatchdog::new(
            Arc::new(GracePeriodStrategy::new(config.watchdog.grace_period())),
            config.watchdog.poll_interval(),
            config.watchdog.probe_timeout(),
        ));
        watchdog
            .add_listener(Arc::new(PoolEviction {
                domains: Arc::clone(&domains),
            }))
            .await;

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            domains,
            bindings: RoundRobinPool::from_items(bindings),
            watchdog,
            provision_lock: Mutex::new(()),
            max_domains: config.fleet.max_domains,
            server_port: config.fleet.server_port,
            transport_timeout: config.fleet.transport_timeout(),
            shutdown_tx,
            watchdog_task: Mutex::new(None),
        })
    }

    /// Returns a transport to a pooled domain, provisioning a new domain
    /// first if there is spare capacity and a backend can serve `platform`.
    ///
    /// The provisioning decision happens under a short critical section (at
    /// most one domain per call, never a blocking wait). The subsequent
    /// round-robin draw happens outside it and may suspend while the pool
    /// is momentarily empty. The domain drawn is not guaranteed to be the
    /// one just provisioned, nor to match `platform`, if other domains
    /// already occupy the pool.
    pub async fn get_transport(&self, platform: &Platform) -> Result<Transport> {
        {
            let _guard = self.provision_lock.lock().await;
            if self.domains.len().await < self.max_domains {
                self.provision(platform).await?;
            }
        }

        let domain = self.domains.next().await;
        let ip = domain
            .ip_address()
            .ok_or_else(|| FleetError::domain_unaddressable(domain.id()))?;

        Ok(Transport::new(
            SocketAddr::new(ip, self.server_port),
            self.transport_timeout,
        ))
    }

    /// Provisions one domain for `platform`. Caller holds the provisioning
    /// lock.
    async fn provision(&self, platform: &Platform) -> Result<()> {
        let mut chosen = None;
        let candidates = self.bindings.len().await;
        for _ in 0..candidates {
            let binding = self.bindings.next().await;
            if let Some(uri) = binding.connection_for(platform).await {
                chosen = Some((binding, uri));
                break;
            }
        }

        let Some((binding, uri)) = chosen else {
            return Err(FleetError::unsupported_platform(platform));
        };

        let config = DomainConfig::new(platform.clone());
        let handle = binding.create_domain(&config, &uri).await?;
        let ip = match handle.start().await {
            Ok(ip) => ip,
            Err(e) => {
                // Pool size is simply not incremented; the orchestrator
                // stays usable.
                return Err(FleetError::provisioning(
                    binding.backend_type(),
                    format!("domain {} failed to boot: {e}", handle.id()),
                ));
            }
        };

        info!(
            domain = %handle.id(),
            backend = binding.backend_type(),
            uri = %uri,
            ip = %ip,
            platform = %platform,
            "provisioned domain"
        );

        self.domains.add(handle.clone()).await;
        self.watchdog.watch(handle).await;
        Ok(())
    }

    /// Starts the health watchdog poller.
    pub async fn start(&self) {
        let mut task = self.watchdog_task.lock().await;
        if task.is_some() {
            return;
        }

        self.watchdog.start_watching();
        let watchdog = Arc::clone(&self.watchdog);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *task = Some(tokio::spawn(async move {
            watchdog.run(shutdown_rx).await;
        }));
        info!(max_domains = self.max_domains, "fleet orchestrator started");
    }

    /// Stops the watchdog and the whole fleet.
    ///
    /// Drains the pool and stops every domain; individual stop failures are
    /// logged and skipped, never aborting the rest of the shutdown.
    pub async fn stop(&self) {
        self.watchdog.stop_watching();
        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.watchdog_task.lock().await.take() {
            if let Err(e) = task.await {
                error!(error = %e, "watchdog task terminated abnormally");
            }
        }

        let drained = self.domains.drain().await;
        info!(domains = drained.len(), "stopping fleet");
        for domain in drained {
            self.watchdog.unwatch(&domain).await;
            if let Err(e) = domain.stop().await {
                warn!(domain = %domain.id(), error = %e, "failed to stop domain");
            }
        }
    }

    /// Current number of pooled domains.
    pub async fn pool_size(&self) -> usize {
        self.domains.len().await
    }

    /// The watchdog monitoring this fleet.
    pub fn watchdog(&self) -> &Arc<HealthWatchdog> {
        &self.watchdog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use corral_core::config::{BackendSection, FleetSection, WatchdogSection};
    use corral_core::ConnectionUri;

    fn platform() -> Platform {
        Platform::new("x86_64", "linux", "jvm-21")
    }

    fn config_with(backends: Vec<BackendSection>, max_domains: usize) -> FleetConfig {
        FleetConfig {
            fleet: FleetSection {
                max_domains,
                ..FleetSection::default()
            },
            watchdog: WatchdogSection::default(),
            backends,
            platforms: vec![platform()],
        }
    }

    fn simulated(uris: &[&str]) -> (Arc<SimulatedBackend>, Vec<BackendSection>) {
        let backend = Arc::new(SimulatedBackend::new("simulated"));
        let sections = vec![BackendSection {
            backend_type: "simulated".to_string(),
            connections: uris.iter().map(|u| ConnectionUri::new(*u)).collect(),
        }];
        (backend, sections)
    }

    #[tokio::test]
    async fn construction_reports_all_violations_together() {
        let config = config_with(
            vec![
                BackendSection {
                    backend_type: "simulated".to_string(),
                    connections: Vec::new(),
                },
                BackendSection {
                    backend_type: "Y".to_string(),
                    connections: vec![ConnectionUri::new("y://host")],
                },
            ],
            0,
        );
        let backend: Arc<dyn ProvisioningBackend> = Arc::new(SimulatedBackend::new("simulated"));

        let err = FleetOrchestrator::new(&config, vec![backend])
            .await
            .expect_err("construction should fail");

        let violations = err.violations();
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.contains("max_domains")));
        assert!(violations.iter().any(|v| v.contains("\"simulated\"")));
        assert!(violations.iter().any(|v| v.contains("\"Y\"")));
    }

    #[tokio::test]
    async fn missing_backend_type_is_named() {
        let config = config_with(
            vec![BackendSection {
                backend_type: "Y".to_string(),
                connections: vec![ConnectionUri::new("y://host")],
            }],
            2,
        );

        let err = FleetOrchestrator::new(&config, Vec::new())
            .await
            .expect_err("construction should fail");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("\"Y\""));
    }

    #[tokio::test]
    async fn unsupported_platform_provisions_nothing() {
        let (backend, sections) = simulated(&["sim://a"]);
        let config = config_with(sections, 2);
        let orchestrator = FleetOrchestrator::new(&config, vec![backend.clone()])
            .await
            .expect("construction should succeed");

        let err = orchestrator
            .get_transport(&platform())
            .await
            .expect_err("no connection supports the platform");
        assert!(err.is_unsupported());
        assert_eq!(orchestrator.pool_size().await, 0);
        assert!(backend.created().is_empty());
    }

    #[tokio::test]
    async fn provisions_and_returns_a_bound_transport() {
        let (backend, sections) = simulated(&["sim://a"]);
        backend.support(ConnectionUri::new("sim://a"), platform());
        let config = config_with(sections, 2);
        let orchestrator = FleetOrchestrator::new(&config, vec![backend.clone()])
            .await
            .expect("construction should succeed");

        let transport = orchestrator
            .get_transport(&platform())
            .await
            .expect("transport should be acquired");

        assert_eq!(orchestrator.pool_size().await, 1);
        assert_eq!(transport.addr().port(), config.fleet.server_port);
        assert_eq!(transport.timeout(), config.fleet.transport_timeout());

        let created = backend.created();
        assert_eq!(created.len(), 1);
        assert_eq!(
            transport.addr().ip(),
            created[0].1.ip_address().expect("domain was started")
        );
    }

    #[tokio::test]
    async fn provisioning_failure_leaves_orchestrator_usable() {
        let (backend, sections) = simulated(&["sim://a"]);
        backend.support(ConnectionUri::new("sim://a"), platform());
        let config = config_with(sections, 2);
        let orchestrator = FleetOrchestrator::new(&config, vec![backend.clone()])
            .await
            .expect("construction should succeed");

        backend.fail_creates(true);
        let err = orchestrator
            .get_transport(&platform())
            .await
            .expect_err("provisioning should fail");
        assert!(matches!(err, FleetError::Provisioning { .. }));
        assert_eq!(orchestrator.pool_size().await, 0);

        backend.fail_creates(false);
        orchestrator
            .get_transport(&platform())
            .await
            .expect("orchestrator should recover");
        assert_eq!(orchestrator.pool_size().await, 1);
    }

    #[tokio::test]
    async fn full_pool_skips_provisioning_and_reuses_domains() {
        let (backend, sections) = simulated(&["sim://a"]);
        backend.support(ConnectionUri::new("sim://a"), platform());
        let config = config_with(sections, 1);
        let orchestrator = FleetOrchestrator::new(&config, vec![backend.clone()])
            .await
            .expect("construction should succeed");

        for _ in 0..5 {
            orchestrator
                .get_transport(&platform())
                .await
                .expect("transport should be acquired");
        }
        assert_eq!(orchestrator.pool_size().await, 1);
        assert_eq!(backend.created().len(), 1);
    }

    #[tokio::test]
    async fn stop_drains_and_stops_every_domain() {
        let (backend, sections) = simulated(&["sim://a"]);
        backend.support(ConnectionUri::new("sim://a"), platform());
        let config = config_with(sections, 3);
        let orchestrator = FleetOrchestrator::new(&config, vec![backend.clone()])
            .await
            .expect("construction should succeed");

        orchestrator.start().await;
        orchestrator
            .get_transport(&platform())
            .await
            .expect("transport should be acquired");
        orchestrator.stop().await;

        assert_eq!(orchestrator.pool_size().await, 0);
        assert_eq!(orchestrator.watchdog().watched_len().await, 0);
        for (_, domain) in backend.created() {
            assert!(!domain.is_alive().await.expect("probe should succeed"));
        }
    }
}
