//! Accept loop and per-connection supervision.
//!
//! # Responsibilities
//! - Build the shared filter catalog and policy once at startup
//! - Accept client connections and spawn one task per connection
//! - Bound each session with the configured timeouts
//! - Stop accepting on shutdown and wait for live sessions to drain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::{ProxyConfig, TimeoutConfig};
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::handler::{ConnectionHandler, Outcome};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::tamper::{CatalogError, FilterCatalog, FilterPolicy};

/// The tampering proxy server.
#[derive(Debug)]
pub struct TamperServer {
    upstream: Arc<str>,
    timeouts: TimeoutConfig,
    policy: Arc<FilterPolicy>,
    tracker: ConnectionTracker,
}

impl TamperServer {
    /// Create a server from a validated configuration.
    pub fn new(config: &ProxyConfig) -> Result<Self, CatalogError> {
        let catalog = Arc::new(FilterCatalog::from_names(&config.tamper.filters)?);
        let policy = FilterPolicy::from_config(catalog, &config.tamper);

        tracing::info!(
            upstream = %config.upstream.address(),
            filters = ?policy.catalog().names(),
            max_filters = policy.max_selected(),
            retain_order = config.tamper.retain_order,
            "Tamper policy ready"
        );

        Ok(Self {
            upstream: config.upstream.address().into(),
            timeouts: config.timeouts.clone(),
            policy: Arc::new(policy),
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    /// Number of sessions currently running.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, upstream = %self.upstream, "Proxy server starting");
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr, permit)) => self.spawn_session(stream, peer_addr, permit),
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Accept failed");
                        }
                        Err(e) => return Err(e),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }
        drop(listener);

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active_connections = active, "Waiting for connections to drain");
            let deadline = Duration::from_secs(self.timeouts.request_secs);
            if tokio::time::timeout(deadline, self.tracker.wait_for_drain()).await.is_err() {
                tracing::warn!(
                    active_connections = self.tracker.active_count(),
                    "Drain deadline reached, abandoning connections"
                );
            }
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer_addr: SocketAddr, permit: ConnectionPermit) {
        let guard = self.tracker.track(peer_addr);
        let upstream = Arc::clone(&self.upstream);
        let policy = Arc::clone(&self.policy);
        let timeouts = self.timeouts.clone();

        tokio::spawn(async move {
            supervise(stream, peer_addr, guard, &upstream, policy, &timeouts).await;
            drop(permit);
        });
    }
}

/// Run one session under the connect and request timeouts and log how it ended.
async fn supervise(
    stream: TcpStream,
    peer_addr: SocketAddr,
    guard: ConnectionGuard,
    upstream: &str,
    policy: Arc<FilterPolicy>,
    timeouts: &TimeoutConfig,
) {
    let id = guard.id();
    tracing::debug!(connection_id = %id, peer_addr = %peer_addr, "Session started");

    let handler = ConnectionHandler::new(id, policy);
    let session = handler.serve(stream, upstream, Duration::from_secs(timeouts.connect_secs));

    match tokio::time::timeout(Duration::from_secs(timeouts.request_secs), session).await {
        Ok(Ok(Outcome::Delivered { bytes, filters })) => {
            tracing::debug!(connection_id = %id, bytes, filters = ?filters, "Response delivered");
        }
        Ok(Ok(Outcome::ClientAborted)) => {
            tracing::debug!(connection_id = %id, "Client aborted session");
        }
        Ok(Err(e)) => {
            tracing::warn!(connection_id = %id, peer_addr = %peer_addr, error = %e, "Connection terminated");
        }
        Err(_) => {
            tracing::warn!(
                connection_id = %id,
                timeout_secs = timeouts.request_secs,
                "Session timed out, connection closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_follows_config() {
        let mut config = ProxyConfig::default();
        config.tamper.filters = vec!["RandomizeHeaderCase".into()];
        config.tamper.max_filters = 1;

        let server = TamperServer::new(&config).unwrap();
        assert_eq!(server.policy().catalog().names(), ["RandomizeHeaderCase"]);
        assert_eq!(server.policy().max_selected(), 1);
        assert_eq!(server.active_connections(), 0);
    }

    #[test]
    fn unknown_filter_is_rejected() {
        let mut config = ProxyConfig::default();
        config.tamper.filters = vec!["Nope".into()];
        assert!(matches!(TamperServer::new(&config), Err(CatalogError::UnknownFilter(_))));
    }
}
