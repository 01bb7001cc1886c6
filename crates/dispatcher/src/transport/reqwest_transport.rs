//! reqwest-backed transport

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use contracts::ContractError;
use tracing::trace;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError, TransportErrorKind};

/// Shared HTTP client; cloning is cheap and reuses the connection pool
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests are bounded by `timeout` in total
    pub fn new(timeout: Duration) -> Result<Self, ContractError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mqtt-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ContractError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.post(&request.url).body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(map_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(map_error)?;

        trace!(url = %request.url, status, "HTTP response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if is_connection_reset(&err) {
        TransportErrorKind::ConnectionReset
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, err.to_string())
}

/// Walk the source chain looking for an io reset
fn is_connection_reset(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}
