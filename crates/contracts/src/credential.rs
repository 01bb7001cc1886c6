//! TokenProvider trait - delegated credential acquisition
//!
//! Sinks that authenticate with bearer tokens depend on this narrow interface
//! only; the identity provider's own protocol lives outside the bridge.

use chrono::{DateTime, Utc};

use crate::ContractError;

/// Bearer token handed to a sink
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

// Keep secrets out of logs.
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Capability to obtain a bearer token
#[trait_variant::make(TokenProvider: Send)]
pub trait LocalTokenProvider {
    /// Acquire a currently valid token
    async fn acquire_token(&self) -> Result<AccessToken, ContractError>;
}
