//! Unified error handling for HomeLink services
//!
//! Shared error type for the service binaries and their libraries. Each
//! service keeps its own domain error (e.g. `LinkSrvError`) and converts
//! into [`LinkError`] at the service boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ErrorInfo - API error response type
// ============================================================================

/// Standard error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (HTTP status)
    pub code: u16,
    /// Error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new ErrorInfo with just a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }
}

// ============================================================================
// LinkError - Main error type
// ============================================================================

/// Main error type for all HomeLink services
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using LinkError
pub type LinkResult<T> = Result<T, LinkError>;

impl LinkError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Communication(_) => 502,
            Self::Configuration(_) | Self::Io(_) | Self::Internal(_) => 500,
        }
    }

    /// Convert to API ErrorInfo for HTTP responses
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.to_string()).with_code(self.status_code())
    }
}
