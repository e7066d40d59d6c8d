//! HTTP request descriptions and the transport seam.
//!
//! Everything above this module builds [`HttpRequest`] values and hands them
//! to an [`AsyncTransport`] or [`BlockingTransport`]; only the adapters in
//! [`reqwest`] perform I/O.

pub mod reqwest;

pub use self::reqwest::{BlockingReqwestTransport, ReqwestTransport};

use crate::error::{VaultError, VaultResult};
use crate::token::VaultToken;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Header carrying the Vault token.
pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Header selecting a Vault Enterprise namespace.
pub const VAULT_NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// HTTP method of a request description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// Method name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one HTTP call against the Vault API.
///
/// The path is a template: `{name}` placeholders are expanded from the bound
/// variables when the request is executed, so a chain can be built before
/// e.g. a role name is known.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    method: Method,
    template: String,
    variables: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    token: Option<VaultToken>,
    body: Option<Value>,
}

impl HttpRequest {
    /// Request with `method` against `template`.
    #[must_use]
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            variables: BTreeMap::new(),
            headers: BTreeMap::new(),
            token: None,
            body: None,
        }
    }

    /// GET request.
    #[must_use]
    pub fn get(template: impl Into<String>) -> Self {
        Self::new(Method::Get, template)
    }

    /// POST request.
    #[must_use]
    pub fn post(template: impl Into<String>) -> Self {
        Self::new(Method::Post, template)
    }

    /// PUT request.
    #[must_use]
    pub fn put(template: impl Into<String>) -> Self {
        Self::new(Method::Put, template)
    }

    /// DELETE request.
    #[must_use]
    pub fn delete(template: impl Into<String>) -> Self {
        Self::new(Method::Delete, template)
    }

    /// Bind a template variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Authenticate the request with `token`.
    #[must_use]
    pub fn with_token(mut self, token: VaultToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the body unless one is already present.
    #[must_use]
    pub(crate) fn or_body(mut self, body: Value) -> Self {
        if self.body.is_none() {
            self.body = Some(body);
        }
        self
    }

    /// Method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Unexpanded path template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Path with variables expanded, without a leading slash.
    ///
    /// Unbound placeholders are left in place.
    #[must_use]
    pub fn path(&self) -> String {
        let mut path = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            path.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match self.variables.get(name) {
                        Some(value) => path.push_str(value),
                        None => {
                            path.push('{');
                            path.push_str(name);
                            path.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    path.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        path.push_str(rest);
        path.trim_start_matches('/').to_string()
    }

    /// Headers other than the token header.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Token the request authenticates with.
    #[must_use]
    pub const fn token(&self) -> Option<&VaultToken> {
        self.token.as_ref()
    }

    /// JSON body.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("authenticated", &self.token.is_some())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Non-blocking HTTP capability.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    /// Execute `request` and return the parsed JSON body.
    ///
    /// An empty response body yields `Value::Null`.
    async fn execute(&self, request: &HttpRequest) -> VaultResult<Value>;
}

/// Blocking HTTP capability.
pub trait BlockingTransport: Send + Sync {
    /// Execute `request` on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns transport, status or decoding errors.
    fn execute(&self, request: &HttpRequest) -> VaultResult<Value>;
}

#[async_trait]
impl<T: AsyncTransport + ?Sized> AsyncTransport for std::sync::Arc<T> {
    async fn execute(&self, request: &HttpRequest) -> VaultResult<Value> {
        (**self).execute(request).await
    }
}

impl<T: BlockingTransport + ?Sized> BlockingTransport for std::sync::Arc<T> {
    fn execute(&self, request: &HttpRequest) -> VaultResult<Value> {
        (**self).execute(request)
    }
}

/// Map a non-success status and its body to a [`VaultError`].
#[must_use]
pub fn status_error(status: u16, path: &str, body: &str) -> VaultError {
    let message = error_messages(body);
    match status {
        403 => VaultError::PermissionDenied(if message.is_empty() {
            path.to_string()
        } else {
            message
        }),
        404 => VaultError::not_found(path),
        429 => VaultError::RateLimited,
        500..=599 => VaultError::unavailable(format!("Status {status} at {path}: {message}")),
        _ => VaultError::Status {
            status,
            path: path.to_string(),
            message,
        },
    }
}

/// Join Vault's `{"errors": [...]}` messages, falling back to the raw body.
fn error_messages(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("errors").and_then(Value::as_array).map(|errors| {
                errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Parse a response body, treating an empty body as `null`.
///
/// # Errors
///
/// Returns a serialization error for non-JSON bodies.
pub fn parse_body(body: &str) -> VaultResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(VaultError::from)
}
