//! Service bootstrap
//!
//! Command-line arguments, logging setup and building the connection
//! manager from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::adapters::{build_connection, logging_resync};
use crate::config::AppConfig;
use crate::core::manager::ConnectionManager;
use crate::error::{LinkSrvError, Result};

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(
    name = "linksrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Connection Health Orchestration Service",
    long_about = None
)]
pub struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Bind address for API server; overrides the config file
    #[arg(short = 'b', long)]
    pub bind_address: Option<String>,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(level) = &self.log_level {
            config.service.logging.level = level.clone();
        }
        if let Some(bind) = &self.bind_address {
            config.service.api.bind_address = bind.clone();
        }
    }
}

/// Initialize logging from the service configuration
///
/// Log root directory priority:
/// 1. `LINK_LOG_DIR` environment variable
/// 2. `service.logging.dir`
/// 3. `logs`
pub fn initialize_logging(config: &AppConfig) -> Result<()> {
    let logging = &config.service.logging;
    let log_config = common::LogConfig {
        service_name: config.service.name.clone(),
        log_dir: common::logging::resolve_log_root(logging.dir.as_deref()),
        level: logging.level.clone(),
        enable_json: logging.json,
        enable_file: true,
    };

    common::logging::init_with_config(log_config)
        .map_err(|e| LinkSrvError::config(format!("Failed to initialize logging: {}", e)))
}

/// Create the manager and register every configured connection, in order
///
/// Registration needs a Tokio runtime; without one this returns a `StateError`.
pub fn build_manager(config: &AppConfig) -> Result<Arc<ConnectionManager>> {
    let manager = Arc::new(ConnectionManager::with_options(config.manager_options()));

    for connection_config in &config.connections {
        let connection = build_connection(connection_config)?;
        let resync = connection_config
            .resync
            .then(|| logging_resync(&connection_config.name));
        manager.register(connection_config.name.clone(), connection, resync)?;
    }

    info!("Registered {} connections", manager.len());
    Ok(manager)
}
