//! Bus error types

use thiserror::Error;

/// Message bus specific error
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// Broker address could not be parsed
    #[error("invalid broker address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    /// Initial connection failed
    #[error("failed to connect to MQTT broker: {message}")]
    ConnectFailed { message: String },

    /// Established connection was lost
    #[error("MQTT connection lost: {message}")]
    ConnectionLost { message: String },

    /// Subscribe / publish / disconnect request was refused
    #[error("MQTT request failed: {message}")]
    RequestFailed { message: String },
}

impl BusError {
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            message: message.into(),
        }
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, BusError>;
