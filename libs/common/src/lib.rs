//! HomeLink basic library
//!
//! Provides basic functions shared by all services, including:
//! - logging functions
//! - layered configuration loading
//! - graceful shutdown signals
//! - persisted device identity

pub mod config_loader;
pub mod device_id;
pub mod logging;
pub mod shutdown;

pub use config_loader::load_config;
pub use logging::LogConfig;
