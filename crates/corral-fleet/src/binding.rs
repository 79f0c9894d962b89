//! Backend bindings.
//!
//! A binding pairs one provisioning backend with the round-robin pool of
//! connections it is configured to use, and answers "can you serve this
//! platform, and through which connection?".

use std::sync::Arc;
use tracing::warn;

use corral_core::{ConnectionUri, DomainConfig, Platform, Result};

use crate::backend::{DomainHandle, ProvisioningBackend};
use crate::pool::RoundRobinPool;

/// One provisioning backend and the connections it may use.
pub struct BackendBinding {
    backend: Arc<dyn ProvisioningBackend>,
    connections: RoundRobinPool<ConnectionUri>,
}

impl BackendBinding {
    /// Creates a binding over the given connections.
    pub fn new(backend: Arc<dyn ProvisioningBackend>, connections: Vec<ConnectionUri>) -> Self {
        Self {
            backend,
            connections: RoundRobinPool::from_items(connections),
        }
    }

    /// Returns the bound backend's type name.
    pub fn backend_type(&self) -> &str {
        self.backend.backend_type()
    }

    /// Finds a connection through which the backend can serve `platform`.
    ///
    /// Probes at most `len()` distinct connections, since drawing
    /// unboundedly from a non-empty round-robin pool would cycle forever.
    /// The support
    /// check may do I/O and is never cached: backend capability can change
    /// between calls. A probe error counts as "does not support" for that
    /// connection and is logged, never escalated.
    pub async fn connection_for(&self, platform: &Platform) -> Option<ConnectionUri> {
        let candidates = self.connections.len().await;
        for _ in 0..candidates {
            let uri = self.connections.next().await;
            match self.backend.supports(platform, &uri).await {
                Ok(true) => return Some(uri),
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        backend = self.backend.backend_type(),
                        uri = %uri,
                        platform = %platform,
                        error = %e,
                        "support probe failed; skipping connection"
                    );
                }
            }
        }
        None
    }

    /// Provisions a domain through the given connection.
    pub async fn create_domain(
        &self,
        config: &DomainConfig,
        uri: &ConnectionUri,
    ) -> Result<DomainHandle> {
        self.backend.create_domain(config, uri).await
    }
}
