//! Virtual link
//!
//! In-process simulated transport. It needs no hardware or network, which
//! makes it useful for dry runs of the service and for exercising the
//! orchestrator in tests. Failures are injected one-shot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::connection::ManagedConnection;
use crate::core::health::{HealthEvents, HealthReceiver, HealthState};
use crate::error::{LinkSrvError, Result};

/// Lifecycle call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub starts: u64,
    pub stops: u64,
    pub reconnects: u64,
    /// Calls that returned an error
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    starts: AtomicU64,
    stops: AtomicU64,
    reconnects: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Default)]
struct FaultPlan {
    start: AtomicBool,
    stop: AtomicBool,
    reconnect: AtomicBool,
}

/// Simulated transport implementing [`ManagedConnection`]
pub struct VirtualLink {
    state: Mutex<HealthState>,
    events: HealthEvents,
    handshake: Duration,
    counters: Counters,
    faults: FaultPlan,
}

impl std::fmt::Debug for VirtualLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualLink")
            .field("state", &*self.state.lock())
            .field("handshake", &self.handshake)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Default for VirtualLink {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualLink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HealthState::Offline),
            events: HealthEvents::new(),
            handshake: Duration::ZERO,
            counters: Counters::default(),
            faults: FaultPlan::default(),
        }
    }

    /// Time spent in `Degraded` while (re)connecting
    pub fn with_handshake(mut self, handshake: Duration) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            starts: self.counters.starts.load(Ordering::Relaxed),
            stops: self.counters.stops.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    pub fn fail_next_start(&self) {
        self.faults.start.store(true, Ordering::Release);
    }

    pub fn fail_next_stop(&self) {
        self.faults.stop.store(true, Ordering::Release);
    }

    pub fn fail_next_reconnect(&self) {
        self.faults.reconnect.store(true, Ordering::Release);
    }

    /// Drop the transport: goes `Offline` and announces `Unhealthy`
    pub fn simulate_outage(&self) {
        self.set_state(HealthState::Offline);
        warn!("Virtual link outage");
        self.events.emit_unhealthy();
    }

    /// Minor fault, no event
    pub fn simulate_degraded(&self) {
        self.set_state(HealthState::Degraded);
    }

    /// Recover without a reconnect call: goes `Connected` and announces `Reconnected`
    pub fn emit_reconnected(&self) -> usize {
        self.set_state(HealthState::Connected);
        self.events.emit_reconnected()
    }

    fn set_state(&self, state: HealthState) {
        *self.state.lock() = state;
    }

    fn take_fault(&self, flag: &AtomicBool) -> bool {
        if flag.swap(false, Ordering::AcqRel) {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    async fn handshake(&self) {
        self.set_state(HealthState::Degraded);
        if !self.handshake.is_zero() {
            tokio::time::sleep(self.handshake).await;
        }
    }
}

#[async_trait]
impl ManagedConnection for VirtualLink {
    fn kind(&self) -> &str {
        "virtual"
    }

    fn health_state(&self) -> HealthState {
        *self.state.lock()
    }

    async fn start(&self) -> Result<()> {
        self.counters.starts.fetch_add(1, Ordering::Relaxed);
        if self.take_fault(&self.faults.start) {
            return Err(LinkSrvError::connection("virtual link refused start"));
        }

        self.handshake().await;
        self.set_state(HealthState::Connected);
        info!("Virtual link connected");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.counters.stops.fetch_add(1, Ordering::Relaxed);
        if self.take_fault(&self.faults.stop) {
            return Err(LinkSrvError::connection("virtual link refused stop"));
        }

        self.set_state(HealthState::Offline);
        debug!("Virtual link stopped");
        Ok(())
    }

    async fn force_reconnect(&self) -> Result<()> {
        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        self.handshake().await;

        if self.take_fault(&self.faults.reconnect) {
            self.set_state(HealthState::Offline);
            return Err(LinkSrvError::auth("virtual link rejected credentials"));
        }

        self.set_state(HealthState::Connected);
        self.events.emit_reconnected();
        info!("Virtual link reconnected");
        Ok(())
    }

    fn subscribe(&self) -> HealthReceiver {
        self.events.subscribe()
    }
}
