//! Transport adapters
//!
//! Concrete [`ManagedConnection`] implementations and the factory that
//! builds them from configuration.

pub mod virtual_link;

pub use virtual_link::{LinkStats, VirtualLink};

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{ConnectionConfig, ConnectionKind};
use crate::core::connection::{resync_fn, ManagedConnection, ResyncProcedure};
use crate::error::Result;

/// Build a connection from its configuration
pub fn build_connection(config: &ConnectionConfig) -> Result<Arc<dyn ManagedConnection>> {
    let connection: Arc<dyn ManagedConnection> = match config.connection_kind()? {
        ConnectionKind::Virtual => Arc::new(
            VirtualLink::new().with_handshake(Duration::from_millis(config.handshake_ms)),
        ),
    };
    Ok(connection)
}

/// Resync procedure that records the resynchronization in the log
pub fn logging_resync(name: &str) -> ResyncProcedure {
    let name: Arc<str> = Arc::from(name);
    resync_fn(move || {
        let name = Arc::clone(&name);
        async move {
            info!(connection = %name, "Resynchronizing state after reconnect");
            Ok(())
        }
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::health::HealthState;

    #[test]
    fn test_build_virtual_connection() {
        let connection = build_connection(&ConnectionConfig::new("hub")).unwrap();
        assert_eq!(connection.kind(), "virtual");
        assert_eq!(connection.health_state(), HealthState::Offline);
    }

    #[test]
    fn test_build_rejects_unknown_kind() {
        let mut config = ConnectionConfig::new("hub");
        config.kind = "mqtt".to_string();
        assert!(build_connection(&config).is_err());
    }

    #[tokio::test]
    async fn test_logging_resync_succeeds() {
        logging_resync("hub")().await.unwrap();
    }
}
