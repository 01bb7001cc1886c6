//! Error types for CLI operations.

use contracts::ContractError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parsing error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// Broker connection error
    #[error("Failed to connect to MQTT broker at {address}: {message}")]
    BusConnection { address: String, message: String },

    /// Established broker connection ended unexpectedly
    #[error("MQTT connection lost: {message}")]
    BusLost { message: String },

    /// Every sink stopped after a terminal delivery failure
    #[error("All {count} sinks failed")]
    AllSinksFailed { count: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn bus_connection(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BusConnection {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn bus_lost(message: impl Into<String>) -> Self {
        Self::BusLost {
            message: message.into(),
        }
    }
}

impl From<ContractError> for CliError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::ConfigParse { message, .. } => Self::ConfigParse { message },
            ContractError::ConfigValidation { field, message } => Self::ConfigValidation {
                message: format!("{field}: {message}"),
            },
            ContractError::Io(e) => Self::Io(e),
            other => Self::Other(anyhow::Error::new(other)),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
