//! Managed connection capability
//!
//! Every transport adapter (hub realtime link, cloud sync channel, ...)
//! implements [`ManagedConnection`]. The orchestrator only ever sees this
//! trait, never a concrete adapter.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::core::health::{HealthReceiver, HealthState};
use crate::error::Result;

/// Lifecycle control plus health reporting for one long-lived connection
///
/// @trait ManagedConnection
/// @implementors VirtualLink, transport adapters
/// @lifecycle start → (unhealthy → force_reconnect → reconnected)* → stop
/// @events Unhealthy / Reconnected, fired by the adapter exactly on the transition
#[async_trait]
pub trait ManagedConnection: Send + Sync {
    /// Transport kind, e.g. "virtual", "hub", "cloud"
    fn kind(&self) -> &str;

    /// Current health, read synchronously without side effects
    fn health_state(&self) -> HealthState;

    /// Establish the connection and begin health monitoring
    async fn start(&self) -> Result<()>;

    /// Tear down the connection without initiating reconnection
    async fn stop(&self) -> Result<()>;

    /// Close the current transport and open a new one, re-authenticating as required
    async fn force_reconnect(&self) -> Result<()>;

    /// Subscribe to this connection's health events
    ///
    /// Only events emitted after the call are delivered; none are dropped.
    fn subscribe(&self) -> HealthReceiver;
}

/// Future returned by a resync procedure
pub type ResyncFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Application-supplied routine run after a successful reconnection
pub type ResyncProcedure = Arc<dyn Fn() -> ResyncFuture + Send + Sync>;

/// Wrap an async closure as a [`ResyncProcedure`]
///
/// ```ignore
/// let resync = resync_fn(move || {
///     let store = store.clone();
///     async move { store.reload_devices().await }
/// });
/// ```
pub fn resync_fn<F, Fut>(f: F) -> ResyncProcedure
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Registry entry, owned by the connection manager
#[derive(Clone)]
pub struct ConnectionEntry {
    pub name: Arc<str>,
    pub connection: Arc<dyn ManagedConnection>,
    pub resync: Option<ResyncProcedure>,
    /// Cancels the event listener bound at registration
    pub binding: CancellationToken,
}

impl ConnectionEntry {
    pub fn new(
        name: Arc<str>,
        connection: Arc<dyn ManagedConnection>,
        resync: Option<ResyncProcedure>,
        binding: CancellationToken,
    ) -> Self {
        Self {
            name,
            connection,
            resync,
            binding,
        }
    }

    pub fn health_state(&self) -> HealthState {
        self.connection.health_state()
    }
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("name", &self.name)
            .field("kind", &self.connection.kind())
            .field("has_resync", &self.resync.is_some())
            .finish_non_exhaustive()
    }
}
