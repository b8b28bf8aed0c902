//! Error handling for the connection service
//!
//! Adapters report lifecycle failures with [`LinkSrvError`]; the service
//! boundary converts into the shared [`errors::LinkError`].

use errors::LinkError;
use thiserror::Error;

/// Connection service error type
#[derive(Error, Debug, Clone)]
pub enum LinkSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connection establishment and maintenance errors
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Authentication handshake rejected by the remote side
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Connection registry errors (unknown name)
    #[error("Registry error: {0}")]
    RegistryError(String),

    /// State errors (operation not valid in the current state)
    #[error("State error: {0}")]
    StateError(String),

    /// Shared-layer failures with no closer match
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the connection service
pub type Result<T> = std::result::Result<T, LinkSrvError>;

impl LinkSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        LinkSrvError::ConfigError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        LinkSrvError::ConnectionError(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        LinkSrvError::AuthError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        LinkSrvError::StateError(msg.into())
    }

    pub fn connection_not_found(name: impl std::fmt::Display) -> Self {
        LinkSrvError::RegistryError(format!("Connection not found: {}", name))
    }
}

impl From<LinkError> for LinkSrvError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Configuration(msg) => LinkSrvError::ConfigError(msg),
            other => LinkSrvError::InternalError(other.to_string()),
        }
    }
}

impl From<LinkSrvError> for LinkError {
    fn from(err: LinkSrvError) -> Self {
        match err {
            LinkSrvError::ConfigError(msg) => LinkError::Configuration(msg),
            LinkSrvError::ConnectionError(msg) | LinkSrvError::AuthError(msg) => {
                LinkError::Communication(msg)
            },
            LinkSrvError::RegistryError(msg) => LinkError::NotFound { resource: msg },
            LinkSrvError::StateError(msg) | LinkSrvError::InternalError(msg) => {
                LinkError::Internal(msg)
            },
        }
    }
}
