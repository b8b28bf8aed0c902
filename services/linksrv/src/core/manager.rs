//! Connection manager
//!
//! Registry of named connections. Bulk start/stop runs sequentially in
//! registration order with per-connection failure isolation; unhealthy and
//! reconnected events are handled on their own tasks, independently of
//! any bulk operation in progress.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::core::connection::{ConnectionEntry, ManagedConnection, ResyncProcedure};
use crate::core::health::{HealthEvent, HealthReceiver, HealthState};
use crate::error::{LinkSrvError, Result};

/// What to do with an unhealthy event while a reconnect is still running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Drop the event; the in-flight reconnect covers it
    #[default]
    Skip,
    /// Start another reconnect for every event
    Allow,
}

/// What happens to the old connection's event binding when a name is re-registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePolicy {
    /// The old connection stays bound: its unhealthy events still reconnect
    /// the old object, its reconnected events resync by name
    #[default]
    KeepBindings,
    /// Cancel the old connection's listener before binding the new one
    Detach,
}

impl ReplacePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplacePolicy::KeepBindings => "keep_bindings",
            ReplacePolicy::Detach => "detach",
        }
    }
}

/// Manager behavior switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerOptions {
    pub overlap_policy: OverlapPolicy,
    pub replace_policy: ReplacePolicy,
}

/// Per-connection status row, in registration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub kind: String,
    pub state: HealthState,
}

/// Name → entry map that remembers registration order
///
/// Single writer at startup (`register`); readers take snapshots and never
/// hold the lock across an await.
#[derive(Debug, Default)]
struct Registry {
    order: Vec<Arc<str>>,
    entries: HashMap<Arc<str>, ConnectionEntry>,
}

impl Registry {
    /// Insert or replace; a replaced name keeps its original position
    fn upsert(&mut self, entry: ConnectionEntry) -> Option<ConnectionEntry> {
        let name = Arc::clone(&entry.name);
        let previous = self.entries.insert(Arc::clone(&name), entry);
        if previous.is_none() {
            self.order.push(name);
        }
        previous
    }

    fn ordered(&self) -> impl Iterator<Item = &ConnectionEntry> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    fn resync_for(&self, name: &str) -> Option<ResyncProcedure> {
        self.entries.get(name).and_then(|entry| entry.resync.clone())
    }
}

/// Connection manager - registry and reconnection orchestrator
pub struct ConnectionManager {
    registry: Arc<RwLock<Registry>>,
    started: AtomicBool,
    options: ManagerOptions,
    /// Parent of every listener binding; cancelled on drop
    shutdown: CancellationToken,
    span: Span,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.len())
            .field("started", &self.is_started())
            .field("options", &self.options)
            .finish()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_options(ManagerOptions::default())
    }

    pub fn with_options(options: ManagerOptions) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            started: AtomicBool::new(false),
            options,
            shutdown: CancellationToken::new(),
            span: info_span!("connection_manager", component = "ConnectionManager"),
        }
    }

    pub fn options(&self) -> ManagerOptions {
        self.options
    }

    /// Register (or replace) a connection under `name`
    ///
    /// Binds the connection's health events immediately: unhealthy triggers
    /// `force_reconnect()` on this same object, reconnected runs whatever
    /// resync procedure is registered under `name` at that moment.
    ///
    /// The event listener runs on the current Tokio runtime; called outside
    /// one, nothing is registered and a `StateError` is returned.
    pub fn register(
        &self,
        name: impl Into<String>,
        connection: Arc<dyn ManagedConnection>,
        resync: Option<ResyncProcedure>,
    ) -> Result<()> {
        let _entered = self.span.enter();
        let name: Arc<str> = Arc::from(name.into());

        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(connection = %name, error = %e, "Register failed: no Tokio runtime");
                return Err(LinkSrvError::state(format!(
                    "Cannot register {} outside a Tokio runtime",
                    name
                )));
            },
        };

        let binding = self.shutdown.child_token();

        // Subscribe before the entry becomes visible so no event is missed
        let events = connection.subscribe();
        let entry = ConnectionEntry::new(
            Arc::clone(&name),
            Arc::clone(&connection),
            resync,
            binding.clone(),
        );

        let previous = self.registry.write().upsert(entry);

        if let Some(previous) = previous {
            let policy = self.options.replace_policy;
            if policy == ReplacePolicy::Detach {
                previous.binding.cancel();
            }
            warn!(
                connection = %name,
                policy = policy.as_str(),
                "Connection replaced"
            );
        }

        self.bind(&runtime, name.clone(), connection, events, binding);
        debug!(connection = %name, "Connection registered");
        Ok(())
    }

    fn bind(
        &self,
        runtime: &Handle,
        name: Arc<str>,
        connection: Arc<dyn ManagedConnection>,
        mut events: HealthReceiver,
        binding: CancellationToken,
    ) {
        let registry = Arc::clone(&self.registry);
        let overlap = self.options.overlap_policy;
        let in_flight = Arc::new(AtomicBool::new(false));
        let span = self.span.clone();

        runtime.spawn(
            async move {
                loop {
                    let event = tokio::select! {
                        biased;
                        _ = binding.cancelled() => break,
                        event = events.recv() => event,
                    };

                    match event {
                        Some(HealthEvent::Unhealthy) => {
                            on_unhealthy(&name, &connection, &in_flight, overlap);
                        },
                        Some(HealthEvent::Reconnected) => {
                            let resync = registry.read().resync_for(&name);
                            on_reconnected(&name, resync);
                        },
                        None => break,
                    }
                }
                debug!(connection = %name, "Event binding released");
            }
            .instrument(span),
        );
    }

    /// Start every registered connection, in registration order
    ///
    /// No-op when already started. Each failure is logged with the
    /// connection name and the next connection is still attempted.
    pub async fn start_all(&self) {
        async {
            if self.started.swap(true, Ordering::AcqRel) {
                debug!("start_all: already started");
                return;
            }

            let targets = self.connections();
            info!("Starting {} connections", targets.len());

            let mut started = 0usize;
            for (name, connection) in &targets {
                let connection = Arc::clone(connection);
                match isolated(async move { connection.start().await }).await {
                    Ok(()) => {
                        started += 1;
                        debug!(connection = %name, "Connection started");
                    },
                    Err(reason) => {
                        error!(connection = %name, error = %reason, "Start failed");
                    },
                }
            }

            info!("Started {}/{} connections", started, targets.len());
        }
        .instrument(self.span.clone())
        .await
    }

    /// Stop every registered connection, in registration order
    ///
    /// No-op when not started. Entries stay registered so a later
    /// `start_all()` resumes them.
    pub async fn stop_all(&self) {
        async {
            if !self.started.swap(false, Ordering::AcqRel) {
                debug!("stop_all: not started");
                return;
            }

            let targets = self.connections();
            info!("Stopping {} connections", targets.len());

            for (name, connection) in &targets {
                let connection = Arc::clone(connection);
                match isolated(async move { connection.stop().await }).await {
                    Ok(()) => debug!(connection = %name, "Connection stopped"),
                    Err(reason) => warn!(connection = %name, error = %reason, "Stop failed"),
                }
            }

            info!("Stopped {} connections", targets.len());
        }
        .instrument(self.span.clone())
        .await
    }

    /// Current health of one connection, `None` if the name is unknown
    pub fn connection_state(&self, name: &str) -> Option<HealthState> {
        let connection = self
            .registry
            .read()
            .entries
            .get(name)
            .map(|entry| Arc::clone(&entry.connection))?;
        Some(connection.health_state())
    }

    /// Status row of one connection, `None` if the name is unknown
    pub fn status(&self, name: &str) -> Option<ConnectionStatus> {
        let (name, connection) = self
            .registry
            .read()
            .entries
            .get(name)
            .map(|entry| (Arc::clone(&entry.name), Arc::clone(&entry.connection)))?;
        Some(ConnectionStatus {
            name: name.to_string(),
            kind: connection.kind().to_string(),
            state: connection.health_state(),
        })
    }

    /// Current health of every registered connection, fetched at call time
    pub fn all_states(&self) -> HashMap<String, HealthState> {
        self.connections()
            .into_iter()
            .map(|(name, connection)| (name.to_string(), connection.health_state()))
            .collect()
    }

    /// Ordered status rows for reporting
    pub fn snapshot(&self) -> Vec<ConnectionStatus> {
        self.connections()
            .into_iter()
            .map(|(name, connection)| ConnectionStatus {
                name: name.to_string(),
                kind: connection.kind().to_string(),
                state: connection.health_state(),
            })
            .collect()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.registry
            .read()
            .order
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn connections(&self) -> Vec<(Arc<str>, Arc<dyn ManagedConnection>)> {
        self.registry
            .read()
            .ordered()
            .map(|entry| (Arc::clone(&entry.name), Arc::clone(&entry.connection)))
            .collect()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Clears the in-flight flag when the reconnect task ends, panics included
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn on_unhealthy(
    name: &Arc<str>,
    connection: &Arc<dyn ManagedConnection>,
    in_flight: &Arc<AtomicBool>,
    policy: OverlapPolicy,
) {
    let guard = match policy {
        OverlapPolicy::Skip => {
            if in_flight.swap(true, Ordering::AcqRel) {
                debug!(connection = %name, "Reconnect in flight, unhealthy event ignored");
                return;
            }
            Some(InFlight(Arc::clone(in_flight)))
        },
        OverlapPolicy::Allow => None,
    };

    warn!(connection = %name, "Connection unhealthy, forcing reconnect");

    let name = Arc::clone(name);
    let connection = Arc::clone(connection);
    tokio::spawn(
        async move {
            let _guard = guard;
            match isolated(async move { connection.force_reconnect().await }).await {
                Ok(()) => info!(connection = %name, "Reconnect completed"),
                Err(reason) => error!(connection = %name, error = %reason, "Reconnect failed"),
            }
        }
        .in_current_span(),
    );
}

fn on_reconnected(name: &Arc<str>, resync: Option<ResyncProcedure>) {
    let Some(resync) = resync else {
        debug!(connection = %name, "Reconnected, no resync procedure registered");
        return;
    };

    info!(connection = %name, "Reconnected, running resync");

    let name = Arc::clone(name);
    tokio::spawn(
        async move {
            match isolated(async move { resync().await }).await {
                Ok(()) => info!(connection = %name, "Resync completed"),
                Err(reason) => error!(connection = %name, error = %reason, "Resync failed"),
            }
        }
        .in_current_span(),
    );
}

/// Run a fallible operation on its own task so that neither an error nor a
/// panic escapes to the caller; the failure comes back as a message.
async fn isolated<F, E>(operation: F) -> std::result::Result<(), String>
where
    F: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    match tokio::spawn(operation.in_current_span()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(join_err) if join_err.is_panic() => Err(format!(
            "panicked: {}",
            panic_message(join_err.into_panic())
        )),
        Err(join_err) => Err(join_err.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::adapters::VirtualLink;
    use crate::core::connection::resync_fn;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Poll until `check` holds or a second passes
    async fn eventually(check: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    /// Lets spawned listener/reconnect tasks run to completion
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    fn counting_resync(counter: &Arc<AtomicUsize>) -> ResyncProcedure {
        let counter = Arc::clone(counter);
        resync_fn(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    /// Connection whose lifecycle calls panic
    struct PanickingLink {
        link: VirtualLink,
        reconnect_attempts: AtomicUsize,
    }

    impl PanickingLink {
        fn new() -> Self {
            Self {
                link: VirtualLink::new(),
                reconnect_attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ManagedConnection for PanickingLink {
        fn kind(&self) -> &str {
            "panicking"
        }

        fn health_state(&self) -> HealthState {
            self.link.health_state()
        }

        async fn start(&self) -> Result<()> {
            panic!("transport exploded");
        }

        async fn stop(&self) -> Result<()> {
            Err(LinkSrvError::connection("socket already closed"))
        }

        async fn force_reconnect(&self) -> Result<()> {
            self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
            panic!("reconnect exploded");
        }

        fn subscribe(&self) -> HealthReceiver {
            self.link.subscribe()
        }
    }

    #[test]
    fn test_registry_keeps_first_registration_position() {
        let mut registry = Registry::default();
        let entry = |name: &str| {
            ConnectionEntry::new(
                Arc::from(name),
                Arc::new(VirtualLink::new()),
                None,
                CancellationToken::new(),
            )
        };

        assert!(registry.upsert(entry("hub")).is_none());
        assert!(registry.upsert(entry("cloud")).is_none());
        assert!(registry.upsert(entry("hub")).is_some());

        let names: Vec<&str> = registry.ordered().map(|e| &*e.name).collect();
        assert_eq!(names, vec!["hub", "cloud"]);
    }

    #[tokio::test]
    async fn test_start_all_is_idempotent() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        manager.register("hub", hub.clone(), None).unwrap();

        manager.start_all().await;
        manager.start_all().await;

        assert!(manager.is_started());
        assert_eq!(hub.stats().starts, 1);
        assert_eq!(manager.connection_state("hub"), Some(HealthState::Connected));
    }

    #[tokio::test]
    async fn test_stop_all_before_start_is_noop() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        manager.register("hub", hub.clone(), None).unwrap();

        manager.stop_all().await;

        assert_eq!(hub.stats().stops, 0);
        assert!(!manager.is_started());
    }

    #[tokio::test]
    async fn test_stop_then_start_resumes_connections() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        manager.register("hub", hub.clone(), None).unwrap();

        manager.start_all().await;
        manager.stop_all().await;
        assert_eq!(manager.connection_state("hub"), Some(HealthState::Offline));
        assert_eq!(manager.len(), 1);

        manager.start_all().await;
        assert_eq!(hub.stats().starts, 2);
        assert_eq!(hub.stats().stops, 1);
        assert_eq!(manager.connection_state("hub"), Some(HealthState::Connected));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_start_failure_is_isolated() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        let cloud = Arc::new(VirtualLink::new());
        hub.fail_next_start();
        manager.register("hub", hub.clone(), None).unwrap();
        manager.register("cloud", cloud.clone(), None).unwrap();

        manager.start_all().await;

        assert_eq!(hub.stats().starts, 1);
        assert_eq!(cloud.stats().starts, 1);
        assert_eq!(manager.connection_state("hub"), Some(HealthState::Offline));
        assert_eq!(manager.connection_state("cloud"), Some(HealthState::Connected));
        assert!(logs_contain("Start failed"));
        assert!(logs_contain("hub"));
        assert!(logs_contain("Started 1/2 connections"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panicking_start_does_not_escape() {
        let manager = ConnectionManager::new();
        let bad = Arc::new(PanickingLink::new());
        let cloud = Arc::new(VirtualLink::new());
        manager.register("bad", bad, None).unwrap();
        manager.register("cloud", cloud.clone(), None).unwrap();

        manager.start_all().await;

        assert_eq!(cloud.stats().starts, 1);
        assert!(logs_contain("transport exploded"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stop_failure_is_logged_and_iteration_continues() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        let cloud = Arc::new(VirtualLink::new());
        manager.register("hub", hub.clone(), None).unwrap();
        manager.register("cloud", cloud.clone(), None).unwrap();
        manager.start_all().await;

        hub.fail_next_stop();
        manager.stop_all().await;

        assert_eq!(cloud.stats().stops, 1);
        assert_eq!(manager.connection_state("cloud"), Some(HealthState::Offline));
        assert!(logs_contain("Stop failed"));
    }

    #[tokio::test]
    async fn test_unhealthy_event_triggers_one_reconnect() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        manager.register("hub", hub.clone(), None).unwrap();
        manager.start_all().await;

        hub.simulate_outage();

        assert!(eventually(|| hub.stats().reconnects == 1).await);
        settle().await;
        assert_eq!(hub.stats().reconnects, 1);
        assert_eq!(manager.connection_state("hub"), Some(HealthState::Connected));
    }

    #[tokio::test]
    async fn test_unhealthy_events_are_handled_before_start_all() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        manager.register("hub", hub.clone(), None).unwrap();

        hub.simulate_outage();

        assert!(eventually(|| hub.stats().reconnects == 1).await);
    }

    #[tokio::test]
    async fn test_unhealthy_followed_by_reconnected_still_reconnects() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        manager.register("hub", hub.clone(), None).unwrap();

        // Both events are queued before the listener task gets to run
        hub.simulate_outage();
        hub.emit_reconnected();

        assert!(eventually(|| hub.stats().reconnects == 1).await);
        settle().await;
        assert_eq!(hub.stats().reconnects, 1);
    }

    #[tokio::test]
    async fn test_event_burst_does_not_lose_unhealthy() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        let resyncs = Arc::new(AtomicUsize::new(0));
        manager
            .register("hub", hub.clone(), Some(counting_resync(&resyncs)))
            .unwrap();

        hub.simulate_outage();
        for _ in 0..256 {
            hub.emit_reconnected();
        }

        assert!(eventually(|| hub.stats().reconnects == 1).await);
        // 256 explicit events plus the one emitted by the reconnect itself
        assert!(eventually(|| resyncs.load(Ordering::SeqCst) == 257).await);
        settle().await;
        assert_eq!(hub.stats().reconnects, 1);
    }

    #[tokio::test]
    async fn test_overlapping_unhealthy_events_are_skipped() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new().with_handshake(Duration::from_millis(100)));
        manager.register("hub", hub.clone(), None).unwrap();

        hub.simulate_outage();
        assert!(eventually(|| hub.stats().reconnects == 1).await);
        hub.simulate_outage();
        hub.simulate_outage();

        assert!(eventually(|| hub.health_state() == HealthState::Connected).await);
        settle().await;
        assert_eq!(hub.stats().reconnects, 1);

        // Once the reconnect finished, a fresh event is honored again
        hub.simulate_outage();
        assert!(eventually(|| hub.stats().reconnects == 2).await);
    }

    #[tokio::test]
    async fn test_allow_policy_reconnects_on_every_event() {
        let manager = ConnectionManager::with_options(ManagerOptions {
            overlap_policy: OverlapPolicy::Allow,
            ..Default::default()
        });
        let hub = Arc::new(VirtualLink::new().with_handshake(Duration::from_millis(100)));
        manager.register("hub", hub.clone(), None).unwrap();

        hub.simulate_outage();
        hub.simulate_outage();
        hub.simulate_outage();

        assert!(eventually(|| hub.stats().reconnects == 3).await);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_reconnect_failure_is_logged_without_retry() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        manager.register("hub", hub.clone(), None).unwrap();

        hub.fail_next_reconnect();
        hub.simulate_outage();

        assert!(eventually(|| hub.stats().reconnects == 1).await);
        settle().await;
        assert_eq!(hub.stats().reconnects, 1);
        assert_eq!(hub.health_state(), HealthState::Offline);
        assert!(logs_contain("Reconnect failed"));
    }

    #[tokio::test]
    async fn test_panicking_reconnect_releases_in_flight_guard() {
        let manager = ConnectionManager::new();
        let bad = Arc::new(PanickingLink::new());
        manager.register("bad", bad.clone(), None).unwrap();

        bad.link.simulate_outage();
        assert!(eventually(|| bad.reconnect_attempts.load(Ordering::SeqCst) == 1).await);
        settle().await;

        // A second event after the panic must still be processed
        bad.link.simulate_outage();
        assert!(eventually(|| bad.reconnect_attempts.load(Ordering::SeqCst) == 2).await);
        assert_eq!(manager.connection_state("bad"), Some(HealthState::Offline));
    }

    #[tokio::test]
    async fn test_reconnected_event_runs_resync() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        let resyncs = Arc::new(AtomicUsize::new(0));
        manager
            .register("hub", hub.clone(), Some(counting_resync(&resyncs)))
            .unwrap();

        hub.simulate_outage();

        assert!(eventually(|| resyncs.load(Ordering::SeqCst) == 1).await);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failing_resync_does_not_touch_other_connections() {
        let manager = ConnectionManager::new();
        let cloud = Arc::new(VirtualLink::new());
        let hub = Arc::new(VirtualLink::new());
        let hub_resyncs = Arc::new(AtomicUsize::new(0));
        manager
            .register(
                "cloud",
                cloud.clone(),
                Some(resync_fn(|| async {
                    Err(anyhow::anyhow!("snapshot endpoint returned 503"))
                })),
            )
            .unwrap();
        manager
            .register("hub", hub.clone(), Some(counting_resync(&hub_resyncs)))
            .unwrap();

        cloud.emit_reconnected();
        settle().await;

        assert!(logs_contain("Resync failed"));
        assert!(logs_contain("snapshot endpoint returned 503"));
        assert!(logs_contain("cloud"));
        assert_eq!(hub_resyncs.load(Ordering::SeqCst), 0);

        // The manager keeps working
        manager.start_all().await;
        assert_eq!(manager.connection_state("hub"), Some(HealthState::Connected));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panicking_resync_is_contained() {
        let manager = ConnectionManager::new();
        let cloud = Arc::new(VirtualLink::new());
        manager
            .register(
                "cloud",
                cloud.clone(),
                Some(resync_fn(|| async { panic!("resync bug") })),
            )
            .unwrap();

        cloud.emit_reconnected();
        settle().await;

        assert!(logs_contain("Resync failed"));
        assert!(logs_contain("resync bug"));
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_replacement_keeps_old_binding() {
        let manager = ConnectionManager::new();
        let conn_a = Arc::new(VirtualLink::new());
        let conn_b = Arc::new(VirtualLink::new());
        let resyncs_a = Arc::new(AtomicUsize::new(0));
        manager
            .register("hub", conn_a.clone(), Some(counting_resync(&resyncs_a)))
            .unwrap();
        manager.register("hub", conn_b.clone(), None).unwrap();

        conn_a.simulate_outage();

        assert!(eventually(|| conn_a.stats().reconnects == 1).await);
        settle().await;
        assert_eq!(conn_b.stats().reconnects, 0);
        // Resync resolves by name: "hub" now has no procedure
        assert_eq!(resyncs_a.load(Ordering::SeqCst), 0);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_replacement_resync_resolves_current_entry() {
        let manager = ConnectionManager::new();
        let conn_a = Arc::new(VirtualLink::new());
        let conn_b = Arc::new(VirtualLink::new());
        let resyncs_a = Arc::new(AtomicUsize::new(0));
        let resyncs_b = Arc::new(AtomicUsize::new(0));
        manager
            .register("hub", conn_a.clone(), Some(counting_resync(&resyncs_a)))
            .unwrap();
        manager
            .register("hub", conn_b.clone(), Some(counting_resync(&resyncs_b)))
            .unwrap();

        conn_a.emit_reconnected();

        assert!(eventually(|| resyncs_b.load(Ordering::SeqCst) == 1).await);
        assert_eq!(resyncs_a.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_replacement_is_logged_with_policy() {
        let manager = ConnectionManager::new();
        manager.register("hub", Arc::new(VirtualLink::new()), None).unwrap();
        assert!(!logs_contain("Connection replaced"));

        manager.register("hub", Arc::new(VirtualLink::new()), None).unwrap();

        assert!(logs_contain("Connection replaced"));
        assert!(logs_contain("keep_bindings"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_detach_replacement_is_logged_with_policy() {
        let manager = ConnectionManager::with_options(ManagerOptions {
            replace_policy: ReplacePolicy::Detach,
            ..Default::default()
        });
        manager.register("hub", Arc::new(VirtualLink::new()), None).unwrap();
        manager.register("hub", Arc::new(VirtualLink::new()), None).unwrap();

        assert!(logs_contain("Connection replaced"));
        assert!(logs_contain("detach"));
        assert!(!logs_contain("keep_bindings"));
    }

    #[tokio::test]
    async fn test_detach_policy_releases_old_binding() {
        let manager = ConnectionManager::with_options(ManagerOptions {
            replace_policy: ReplacePolicy::Detach,
            ..Default::default()
        });
        let conn_a = Arc::new(VirtualLink::new());
        let conn_b = Arc::new(VirtualLink::new());
        manager.register("hub", conn_a.clone(), None).unwrap();
        manager.register("hub", conn_b.clone(), None).unwrap();

        assert!(eventually(|| conn_a.subscriber_count() == 0).await);
        conn_a.simulate_outage();
        settle().await;
        assert_eq!(conn_a.stats().reconnects, 0);

        conn_b.simulate_outage();
        assert!(eventually(|| conn_b.stats().reconnects == 1).await);
    }

    #[tokio::test]
    async fn test_all_states_reads_live_values() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        let cloud = Arc::new(VirtualLink::new());
        manager.register("hub", hub.clone(), None).unwrap();
        manager.register("cloud", cloud.clone(), None).unwrap();
        manager.start_all().await;

        cloud.simulate_degraded();

        let states = manager.all_states();
        assert_eq!(states.len(), 2);
        assert_eq!(states["hub"], HealthState::Connected);
        assert_eq!(states["cloud"], HealthState::Degraded);
        assert_eq!(manager.connection_state("missing"), None);
    }

    #[tokio::test]
    async fn test_status_looks_up_one_connection() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());
        manager.register("cloud", Arc::new(VirtualLink::new()), None).unwrap();
        manager.register("hub", hub.clone(), None).unwrap();
        manager.start_all().await;
        hub.simulate_degraded();

        let status = manager.status("hub").unwrap();
        assert_eq!(status.name, "hub");
        assert_eq!(status.kind, "virtual");
        assert_eq!(status.state, HealthState::Degraded);
        assert!(manager.status("zigbee").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_in_registration_order() {
        let manager = ConnectionManager::new();
        for name in ["zigbee", "cloud", "hub"] {
            manager.register(name, Arc::new(VirtualLink::new()), None).unwrap();
        }

        let names: Vec<String> = manager.snapshot().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zigbee", "cloud", "hub"]);
        assert_eq!(manager.names(), names);
        assert!(manager
            .snapshot()
            .iter()
            .all(|s| s.kind == "virtual" && s.state == HealthState::Offline));
    }

    #[tokio::test]
    async fn test_drop_releases_bindings() {
        let hub = Arc::new(VirtualLink::new());
        {
            let manager = ConnectionManager::new();
            manager.register("hub", hub.clone(), None).unwrap();
            assert_eq!(hub.subscriber_count(), 1);
        }
        assert!(eventually(|| hub.subscriber_count() == 0).await);
    }

    #[test]
    fn test_register_outside_runtime_is_rejected() {
        let manager = ConnectionManager::new();
        let hub = Arc::new(VirtualLink::new());

        let err = manager.register("hub", hub.clone(), None).unwrap_err();

        assert!(matches!(err, LinkSrvError::StateError(msg) if msg.contains("hub")));
        assert!(manager.is_empty());
        assert_eq!(hub.subscriber_count(), 0);
    }
}
