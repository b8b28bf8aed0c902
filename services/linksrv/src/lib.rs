//! Connection health orchestration service
//!
//! Keeps a registry of long-lived connections (hub realtime link, cloud
//! sync channel, ...), drives their bulk lifecycle, forces a reconnect
//! when one reports itself unhealthy and runs the registered resync
//! procedure once it is back.

pub mod adapters;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod core;
pub mod error;

pub use crate::core::{
    resync_fn, ConnectionManager, ConnectionStatus, HealthEvent, HealthEvents, HealthReceiver,
    HealthState, ManagedConnection, ManagerOptions, OverlapPolicy, ReplacePolicy, ResyncProcedure,
};
pub use error::{LinkSrvError, Result};
