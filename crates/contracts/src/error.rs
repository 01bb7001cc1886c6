//! Layered error definitions
//!
//! Categorized by source: config / credential / bus / delivery

use thiserror::Error;

/// Unified error type for everything except delivery attempts
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Credential Errors =====
    /// Token acquisition failed
    #[error("credential error: {message}")]
    Credential { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create credential error
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }
}

/// Terminal outcome of delivering one envelope
///
/// Recoverable conditions (rate limiting, transient unavailability, network
/// blips) never surface here; they are retried inside the sink. Every variant
/// is fatal for the sink instance that produced it.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Non-retryable status from the remote API
    #[error("{url} ({status}): {body}\n\nPOST data was: {payload}")]
    Rejected {
        sink: String,
        url: String,
        status: u16,
        body: String,
        payload: String,
    },

    /// Bounded retries used up without success
    #[error(
        "retries exhausted posting to {url} after {attempts} attempts: {last_error}\n\nPOST data was: {payload}"
    )]
    Exhausted {
        sink: String,
        url: String,
        attempts: u32,
        last_error: String,
        payload: String,
    },

    /// Network failure that is not classified as transient
    #[error("transport error posting to {url}: {message}\n\nPOST data was: {payload}")]
    Transport {
        sink: String,
        url: String,
        message: String,
        payload: String,
    },

    /// Request could not be built (signature, credential, serialization)
    #[error("sink '{sink}' failed to build request: {message}")]
    Build { sink: String, message: String },
}

impl DeliveryError {
    /// Create request build error
    pub fn build(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Build {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Name of the sink instance that failed
    pub fn sink(&self) -> &str {
        match self {
            Self::Rejected { sink, .. }
            | Self::Exhausted { sink, .. }
            | Self::Transport { sink, .. }
            | Self::Build { sink, .. } => sink,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Exhausted { .. } => "exhausted",
            Self::Transport { .. } => "transport",
            Self::Build { .. } => "build",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_carries_payload() {
        let err = DeliveryError::Rejected {
            sink: "discord[0]".into(),
            url: "http://hook".into(),
            status: 500,
            body: "oops".into(),
            payload: r#"{"content":"x"}"#.into(),
        };
        let text = err.to_string();
        assert!(text.contains("(500)"));
        assert!(text.contains("oops"));
        assert!(text.contains(r#"POST data was: {"content":"x"}"#));
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.sink(), "discord[0]");
        assert_eq!(err.kind(), "rejected");
    }

    #[test]
    fn test_config_validation_display() {
        let err = ContractError::config_validation("discord[0].topic", "topic cannot be empty");
        assert_eq!(
            err.to_string(),
            "config validation error at 'discord[0].topic': topic cannot be empty"
        );
    }
}
