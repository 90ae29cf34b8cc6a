//! Error types for cs3lease.
//!
//! Uses thiserror for derive macros. Malformed lock metadata is deliberately
//! absent from this taxonomy: it decodes to "no lock" instead of failing.

use crate::exit_codes;
use crate::storage::{Status, StatusCode};
use thiserror::Error;

/// Main error type for cs3lease operations.
#[derive(Error, Debug)]
pub enum LeaseError {
    /// The addressed file or container does not exist.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// A backend round trip (stat, metadata write, transfer) failed.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Another session holds an unexpired lease on the resource.
    #[error("File locked: {0}")]
    LockConflict(String),

    /// The current actor could not be authenticated or identified.
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The caller asked for something that cannot be done.
    #[error("{0}")]
    UserError(String),
}

impl LeaseError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LeaseError::UserError(_) | LeaseError::ConfigError(_) => exit_codes::USER_ERROR,
            LeaseError::ResourceNotFound(_) => exit_codes::NOT_FOUND,
            LeaseError::TransportFailure(_) => exit_codes::TRANSPORT_FAILURE,
            LeaseError::LockConflict(_) => exit_codes::LOCK_FAILURE,
            LeaseError::AuthenticationFailure(_) => exit_codes::AUTH_FAILURE,
        }
    }

    /// Map a non-OK backend status onto the error taxonomy.
    pub fn from_status(status: &Status, context: &str) -> Self {
        let message = format!("{}: {}", context, status.message);
        match status.code {
            StatusCode::NotFound => LeaseError::ResourceNotFound(message),
            StatusCode::Unauthenticated => LeaseError::AuthenticationFailure(message),
            _ => LeaseError::TransportFailure(message),
        }
    }

    /// Returns true if this error means the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LeaseError::ResourceNotFound(_))
    }
}

/// Result type alias for cs3lease operations.
pub type Result<T> = std::result::Result<T, LeaseError>;
