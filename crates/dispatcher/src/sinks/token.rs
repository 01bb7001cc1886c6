//! Bearer token providers for the logs ingestion sink

use std::process::Stdio;

use chrono::{TimeDelta, Utc};
use contracts::{AccessToken, AzureMonitorConfig, ContractError, TokenProvider};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Command used when neither a token nor a command is configured
pub const DEFAULT_TOKEN_COMMAND: [&str; 9] = [
    "az",
    "account",
    "get-access-token",
    "--resource",
    "https://monitor.azure.com",
    "--query",
    "accessToken",
    "-o",
    "tsv",
];

/// Fixed token from configuration
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(secret, None),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    async fn acquire_token(&self) -> Result<AccessToken, ContractError> {
        Ok(self.token.clone())
    }
}

/// Token printed on stdout by an external command, cached for a while
#[derive(Debug)]
pub struct CommandTokenProvider {
    program: String,
    args: Vec<String>,
    cache_secs: u64,
    cached: Mutex<Option<AccessToken>>,
}

impl CommandTokenProvider {
    /// `argv[0]` is the program; an empty argv fails on first use
    pub fn new(argv: &[String], cache_secs: u64) -> Self {
        let (program, args) = match argv.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self {
            program,
            args,
            cache_secs,
            cached: Mutex::new(None),
        }
    }

    async fn run(&self) -> Result<String, ContractError> {
        if self.program.is_empty() {
            return Err(ContractError::credential("token command is empty"));
        }

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                ContractError::credential(format!("failed to run '{}': {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(ContractError::credential(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let secret = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if secret.is_empty() {
            return Err(ContractError::credential(format!(
                "'{}' printed no token",
                self.program
            )));
        }
        Ok(secret)
    }
}

impl TokenProvider for CommandTokenProvider {
    #[instrument(name = "command_token_acquire", skip(self), fields(program = %self.program))]
    async fn acquire_token(&self) -> Result<AccessToken, ContractError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired_at(now)) {
            return Ok(token.clone());
        }

        let secret = self.run().await?;
        let expires_at = i64::try_from(self.cache_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl));
        let token = AccessToken::new(secret, expires_at);
        debug!(expires_at = ?token.expires_at(), "Token refreshed");

        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Provider selected from configuration
#[derive(Debug)]
pub enum TokenSource {
    Static(StaticTokenProvider),
    Command(CommandTokenProvider),
}

impl TokenSource {
    /// `access_token` wins over `token_command`; neither means the Azure CLI
    pub fn from_config(config: &AzureMonitorConfig) -> Self {
        if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
            return Self::Static(StaticTokenProvider::new(token));
        }
        let argv = match &config.token_command {
            Some(argv) => argv.clone(),
            None => DEFAULT_TOKEN_COMMAND.iter().map(|s| s.to_string()).collect(),
        };
        Self::Command(CommandTokenProvider::new(&argv, config.token_cache_secs))
    }
}

impl TokenProvider for TokenSource {
    async fn acquire_token(&self) -> Result<AccessToken, ContractError> {
        match self {
            Self::Static(provider) => provider.acquire_token().await,
            Self::Command(provider) => provider.acquire_token().await,
        }
    }
}
