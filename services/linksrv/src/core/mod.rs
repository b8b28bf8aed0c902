//! Orchestration core: health model, connection capability, manager

pub mod connection;
pub mod health;
pub mod manager;

pub use connection::{resync_fn, ConnectionEntry, ManagedConnection, ResyncProcedure};
pub use health::{HealthEvent, HealthEvents, HealthReceiver, HealthState};
pub use manager::{
    ConnectionManager, ConnectionStatus, ManagerOptions, OverlapPolicy, ReplacePolicy,
};
