//! Transport handles.
//!
//! A [`Transport`] is what callers get back from
//! [`FleetOrchestrator::get_transport`](crate::FleetOrchestrator::get_transport):
//! an endpoint bound to one pooled domain's address and the configured
//! server port and timeout. Message framing and serialization on top of the
//! stream are an external collaborator.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

use corral_core::{FleetError, Result};

/// Endpoint handle bound to one domain's test-runner server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    addr: SocketAddr,
    timeout: Duration,
}

impl Transport {
    /// Creates a transport bound to the given endpoint.
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// The bound endpoint.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The configured I/O timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Opens a TCP stream to the bound endpoint, bounded by the timeout.
    pub async fn connect(&self) -> Result<TcpStream> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(FleetError::connection(
                self.addr.to_string(),
                format!("connect timed out after {:?}", self.timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_a_listening_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("listener has an address");

        let transport = Transport::new(addr, Duration::from_secs(1));
        let accept = tokio::spawn(async move { listener.accept().await });

        transport.connect().await.expect("connect should succeed");
        accept
            .await
            .expect("accept task should not panic")
            .expect("accept should succeed");
    }

    #[tokio::test]
    async fn refused_connection_surfaces_as_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("listener has an address");
        drop(listener);

        let transport = Transport::new(addr, Duration::from_secs(1));
        transport.connect().await.expect_err("connect should fail");
    }
}
