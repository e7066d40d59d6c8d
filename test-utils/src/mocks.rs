//! Mock implementations for testing.
//!
//! [`MockTransport`] answers requests from a script keyed by method and
//! expanded path, and records every request it sees.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use vault_session::transport::{status_error, AsyncTransport, BlockingTransport, HttpRequest, Method};
use vault_session::{VaultError, VaultResult};

/// Scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Success with a JSON body
    Json(Value),
    /// Non-success status with a JSON body
    Status(u16, Value),
    /// Connection-level failure
    Unavailable(String),
}

impl MockReply {
    fn into_result(self, path: &str) -> VaultResult<Value> {
        match self {
            Self::Json(body) => Ok(body),
            Self::Status(status, body) => Err(status_error(status, path, &body.to_string())),
            Self::Unavailable(message) => Err(VaultError::unavailable(message)),
        }
    }
}

impl From<Value> for MockReply {
    fn from(body: Value) -> Self {
        Self::Json(body)
    }
}

/// A request seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: Method,
    /// Expanded path
    pub path: String,
    /// Token value, if any
    pub token: Option<String>,
    /// JSON body, if any
    pub body: Option<Value>,
}

type RouteKey = (Method, String);

#[derive(Default)]
struct Routes {
    once: HashMap<RouteKey, VecDeque<MockReply>>,
    always: HashMap<RouteKey, MockReply>,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<Routes>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Mutex<Option<Duration>>,
}

/// In-memory transport for both interpreters.
///
/// One-shot replies are consumed in order before the standing reply for the
/// same route. Unscripted routes answer 404.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `method path` request with `reply`.
    pub fn on(&self, method: Method, path: &str, reply: impl Into<MockReply>) -> &Self {
        self.state
            .routes
            .lock()
            .always
            .insert((method, path.to_string()), reply.into());
        self
    }

    /// Answer the next `method path` request with `reply`.
    pub fn once(&self, method: Method, path: &str, reply: impl Into<MockReply>) -> &Self {
        self.state
            .routes
            .lock()
            .once
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply.into());
        self
    }

    /// Delay every async answer by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = Some(delay);
    }

    /// All requests seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    /// Number of `method path` requests seen so far.
    #[must_use]
    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn answer(&self, request: &HttpRequest) -> VaultResult<Value> {
        let path = request.path();
        self.state.requests.lock().push(RecordedRequest {
            method: request.method(),
            path: path.clone(),
            token: request.token().map(|t| t.expose().to_string()),
            body: request.body().cloned(),
        });

        let key = (request.method(), path.clone());
        let reply = {
            let mut routes = self.state.routes.lock();
            routes
                .once
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .or_else(|| routes.always.get(&key).cloned())
        };
        match reply {
            Some(reply) => reply.into_result(&path),
            None => Err(VaultError::not_found(path)),
        }
    }
}

#[async_trait]
impl AsyncTransport for MockTransport {
    async fn execute(&self, request: &HttpRequest) -> VaultResult<Value> {
        let delay = *self.state.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.answer(request)
    }
}

impl BlockingTransport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> VaultResult<Value> {
        self.answer(request)
    }
}
