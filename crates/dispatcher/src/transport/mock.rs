//! Mock transport
//!
//! Scripted replies for unit and integration tests; records every request.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(HttpResponse),
    Error(TransportError),
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockReply>,
    fallback: Option<MockReply>,
    requests: Vec<HttpRequest>,
}

/// Transport returning scripted replies in order
///
/// Once the script is drained the fallback reply (if any) is repeated;
/// without a fallback the call fails with a non-transient error. Clones share
/// state, so a test can keep one handle while a sink owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that always answers with `status`
    pub fn always_status(status: u16) -> Self {
        let mock = Self::new();
        mock.set_fallback(MockReply::Response(HttpResponse::new(status)));
        mock
    }

    /// Queue a bare status reply
    pub fn push_status(&self, status: u16) -> &Self {
        self.push_response(HttpResponse::new(status))
    }

    /// Queue a full response
    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.lock().script.push_back(MockReply::Response(response));
        self
    }

    /// Queue a transport error
    pub fn push_error(&self, error: TransportError) -> &Self {
        self.lock().script.push_back(MockReply::Error(error));
        self
    }

    /// Reply used after the script is drained
    pub fn set_fallback(&self, reply: MockReply) {
        self.lock().fallback = Some(reply);
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded requests
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HttpTransport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            state.script.pop_front().or_else(|| state.fallback.clone())
        };

        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Error(error)) => Err(error),
            None => Err(TransportError::other("mock transport has no scripted reply")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let mock = MockTransport::new();
        mock.push_status(503).push_status(200);
        mock.set_fallback(MockReply::Response(HttpResponse::new(204)));

        let req = HttpRequest::json("http://x", "{}");
        assert_eq!(mock.send(&req).await.unwrap().status, 503);
        assert_eq!(mock.send(&req).await.unwrap().status, 200);
        assert_eq!(mock.send(&req).await.unwrap().status, 204);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_script_errors() {
        let mock = MockTransport::new();
        let err = mock
            .send(&HttpRequest::json("http://x", "{}"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let mock = MockTransport::always_status(204);
        let other = mock.clone();
        other.send(&HttpRequest::json("http://x", "a")).await.unwrap();
        assert_eq!(mock.requests()[0].body_text(), "a");
    }
}
