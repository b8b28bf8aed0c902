//! Service configuration
//!
//! Layered with figment: struct defaults, then an optional YAML/TOML/JSON
//! file, then `LINKSRV_`-prefixed environment variables
//! (`LINKSRV_SERVICE__API__BIND_ADDRESS=0.0.0.0:6010`).

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::manager::{ManagerOptions, OverlapPolicy, ReplacePolicy};
use crate::error::{LinkSrvError, Result};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LINKSRV_";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    /// Managed connections, registered in this order
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_api_bind")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory; `LINK_LOG_DIR` takes precedence
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default)]
    pub json: bool,
}

/// Orchestrator policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,

    #[serde(default)]
    pub replace_policy: ReplacePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id_file")]
    pub id_file: String,
}

/// One managed connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    /// Register the logging resync procedure for this connection
    #[serde(default = "default_true")]
    pub resync: bool,

    /// Simulated handshake duration (virtual links)
    #[serde(default)]
    pub handshake_ms: u64,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: default_kind(),
            resync: true,
            handshake_ms: 0,
        }
    }

    pub fn connection_kind(&self) -> Result<ConnectionKind> {
        self.kind.parse()
    }
}

/// Built-in connection kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Virtual,
}

impl FromStr for ConnectionKind {
    type Err = LinkSrvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "virtual" | "virt" => Ok(ConnectionKind::Virtual),
            other => Err(LinkSrvError::config(format!(
                "Unknown connection kind: {}",
                other
            ))),
        }
    }
}

// Default value functions
fn default_service_name() -> String {
    "linksrv".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_bind() -> String {
    "127.0.0.1:6010".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_id_file() -> String {
    common::device_id::DEFAULT_DEVICE_ID_FILE.to_string()
}

fn default_kind() -> String {
    "virtual".to_string()
}

// Default implementations
impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_bind(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            json: false,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            overlap_policy: OverlapPolicy::default(),
            replace_policy: ReplacePolicy::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id_file: default_device_id_file(),
        }
    }
}

impl AppConfig {
    /// Load from defaults, an optional file and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = common::load_config(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            return Err(LinkSrvError::config("service.name must not be empty"));
        }

        let mut seen = HashSet::new();
        for (index, connection) in self.connections.iter().enumerate() {
            if connection.name.trim().is_empty() {
                return Err(LinkSrvError::config(format!(
                    "connections[{}].name must not be empty",
                    index
                )));
            }
            if !seen.insert(connection.name.as_str()) {
                return Err(LinkSrvError::config(format!(
                    "Duplicate connection name: {}",
                    connection.name
                )));
            }
            connection.connection_kind()?;
        }

        Ok(())
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            overlap_policy: self.orchestrator.overlap_policy,
            replace_policy: self.orchestrator.replace_policy,
        }
    }
}
