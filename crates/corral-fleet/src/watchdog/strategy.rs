//! Watchdog death policy.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::backend::{Domain, DomainHandle};

/// Policy deciding terminal death versus a resurrection attempt.
///
/// Pure policy: the strategy keeps no timers of its own. The watchdog
/// tracks how long a domain has been suspect and passes the elapsed
/// duration in.
#[async_trait]
pub trait WatchdogStrategy: Send + Sync {
    /// Given a domain that has been suspect for `suspect_for`, decides
    /// whether it is terminally dead. Returning `false` may have side
    /// effects (e.g. a resurrection attempt); the domain remains suspect.
    async fn domain_dead(&self, domain: &DomainHandle, suspect_for: Duration) -> bool;
}

/// Default policy: a domain is dead once it has been suspect for the
/// configured grace period; inside the grace period each tick attempts a
/// resurrection instead.
pub struct GracePeriodStrategy {
    grace_period: Duration,
}

impl GracePeriodStrategy {
    /// Creates the policy with the given grace period.
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }
}

#[async_trait]
impl WatchdogStrategy for GracePeriodStrategy {
    async fn domain_dead(&self, domain: &DomainHandle, suspect_for: Duration) -> bool {
        if suspect_for >= self.grace_period {
            return true;
        }

        info!(
            domain = %domain.id(),
            suspect_ms = suspect_for.as_millis() as u64,
            "zombie within grace period; attempting resurrection"
        );
        if let Err(e) = domain.start().await {
            warn!(domain = %domain.id(), error = %e, "resurrection attempt failed");
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Domain, ProvisioningBackend, SimulatedBackend};
    use corral_core::{ConnectionUri, DomainConfig, Platform};

    async fn suspect_domain() -> (DomainHandle, std::sync::Arc<crate::backend::SimulatedDomain>) {
        let backend = SimulatedBackend::new("simulated");
        let uri = ConnectionUri::new("sim://a");
        let handle = backend
            .create_domain(
                &DomainConfig::new(Platform::new("x86_64", "linux", "native")),
                &uri,
            )
            .await
            .expect("create should succeed");
        let (_, sim) = backend.created().pop().expect("one domain created");
        (handle, sim)
    }

    #[tokio::test]
    async fn within_grace_attempts_resurrection() {
        let (handle, sim) = suspect_domain().await;
        let strategy = GracePeriodStrategy::new(Duration::from_secs(3600));

        let dead = strategy
            .domain_dead(&handle, Duration::from_millis(10))
            .await;
        assert!(!dead);
        assert_eq!(sim.start_count(), 1);
        assert!(handle.is_alive().await.expect("probe should succeed"));
    }

    #[tokio::test]
    async fn past_grace_is_terminal_without_side_effects() {
        let (handle, sim) = suspect_domain().await;
        let strategy = GracePeriodStrategy::new(Duration::from_millis(50));

        let dead = strategy
            .domain_dead(&handle, Duration::from_millis(50))
            .await;
        assert!(dead);
        assert_eq!(sim.start_count(), 0);
    }
}
