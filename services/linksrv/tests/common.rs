//! Shared helpers for linksrv integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use linksrv::{
    resync_fn, HealthEvents, HealthReceiver, HealthState, LinkSrvError, ManagedConnection,
    Result, ResyncProcedure,
};
use parking_lot::Mutex;

/// Poll until `check` holds, giving up after a second
pub async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Give spawned handlers time to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

/// Resync procedure that counts its invocations
pub fn counting_resync(counter: &Arc<AtomicUsize>) -> ResyncProcedure {
    let counter = Arc::clone(counter);
    resync_fn(move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

/// Connection double that records every lifecycle call in a shared journal
pub struct RecordingConnection {
    label: &'static str,
    journal: Arc<Mutex<Vec<String>>>,
    state: Mutex<HealthState>,
    events: HealthEvents,
    fail_start: bool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub reconnects: AtomicUsize,
}

impl RecordingConnection {
    pub fn new(label: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label,
            journal: Arc::clone(journal),
            state: Mutex::new(HealthState::Offline),
            events: HealthEvents::new(),
            fail_start: false,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
        }
    }

    /// Every `start()` call rejects
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn set_state(&self, state: HealthState) {
        *self.state.lock() = state;
    }

    pub fn fire_unhealthy(&self) {
        self.set_state(HealthState::Offline);
        self.events.emit_unhealthy();
    }

    pub fn fire_reconnected(&self) {
        self.set_state(HealthState::Connected);
        self.events.emit_reconnected();
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn record(&self, call: &str) {
        self.journal.lock().push(format!("{}:{}", self.label, call));
    }
}

#[async_trait]
impl ManagedConnection for RecordingConnection {
    fn kind(&self) -> &str {
        "recording"
    }

    fn health_state(&self) -> HealthState {
        *self.state.lock()
    }

    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.record("start");
        if self.fail_start {
            return Err(LinkSrvError::connection(format!("{} refused", self.label)));
        }
        self.set_state(HealthState::Connected);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.record("stop");
        self.set_state(HealthState::Offline);
        Ok(())
    }

    async fn force_reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        self.record("reconnect");
        self.set_state(HealthState::Connected);
        Ok(())
    }

    fn subscribe(&self) -> HealthReceiver {
        self.events.subscribe()
    }
}
