//! reqwest-backed transports.
//!
//! Both transports share request preparation, client configuration and
//! response handling; they differ only in how the request is sent.

use super::{
    parse_body, status_error, AsyncTransport, BlockingTransport, HttpRequest, Method,
    VAULT_NAMESPACE_HEADER, VAULT_TOKEN_HEADER,
};
use crate::config::{HttpSettings, VaultConfig};
use crate::endpoint::VaultEndpoint;
use crate::error::{VaultError, VaultResult};
use crate::retry::RetryPolicy;
use ::reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, instrument};
use url::Url;

/// Apply timeouts, pooling, user agent and TLS material to a client builder.
///
/// The async and blocking builders expose the same methods without sharing
/// a trait.
macro_rules! configure_client {
    ($builder:expr, $settings:expr) => {{
        let settings: &HttpSettings = $settings;
        let mut builder = $builder
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_idle_timeout(settings.pool_idle_timeout)
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .user_agent(&settings.user_agent)
            .use_rustls_tls();
        if let Some(identity) = load_identity(settings)? {
            builder = builder.identity(identity);
        }
        if let Some(certificate) = load_ca_certificate(settings)? {
            builder = builder.add_root_certificate(certificate);
        }
        builder.build().map_err(VaultError::from)
    }};
}

fn http_method(method: Method) -> ::reqwest::Method {
    match method {
        Method::Get => ::reqwest::Method::GET,
        Method::Post => ::reqwest::Method::POST,
        Method::Put => ::reqwest::Method::PUT,
        Method::Delete => ::reqwest::Method::DELETE,
    }
}

/// Request ready to hand to either client.
struct Prepared<'a> {
    method: ::reqwest::Method,
    url: Url,
    path: String,
    headers: HeaderMap,
    body: Option<&'a Value>,
}

/// Vault address and namespace.
#[derive(Debug, Clone)]
struct Target {
    endpoint: VaultEndpoint,
    namespace: Option<String>,
}

impl Target {
    fn new(config: &VaultConfig) -> VaultResult<Self> {
        Ok(Self {
            endpoint: config.endpoint()?,
            namespace: config.namespace.clone(),
        })
    }

    fn prepare<'a>(&self, request: &'a HttpRequest) -> VaultResult<Prepared<'a>> {
        let path = request.path();
        let url = self.endpoint.url_for(&path)?;

        let mut headers = HeaderMap::new();
        for (name, value) in request.headers() {
            headers.insert(header_name(name)?, header_value(value)?);
        }
        if let Some(namespace) = &self.namespace {
            headers.insert(VAULT_NAMESPACE_HEADER, header_value(namespace)?);
        }
        if let Some(token) = request.token() {
            let mut value = header_value(token.expose())?;
            value.set_sensitive(true);
            headers.insert(VAULT_TOKEN_HEADER, value);
        }

        Ok(Prepared {
            method: http_method(request.method()),
            url,
            path,
            headers,
            body: request.body(),
        })
    }
}

fn header_name(name: &str) -> VaultResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| VaultError::InvalidConfig(format!("header {name}: {e}")))
}

fn header_value(value: &str) -> VaultResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| VaultError::InvalidConfig(format!("header value: {e}")))
}

/// Map a Vault answer to its JSON body or an error.
fn finish(status: u16, path: &str, text: &str) -> VaultResult<Value> {
    debug!(status, path = %path, "Vault responded");
    if !(200..300).contains(&status) {
        return Err(status_error(status, path, text));
    }
    parse_body(text)
}

/// Async transport over a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ::reqwest::Client,
    target: Target,
    retry: RetryPolicy,
}

impl ReqwestTransport {
    /// Build a transport from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the address does not parse or the client cannot be built.
    pub fn new(config: &VaultConfig) -> VaultResult<Self> {
        Ok(Self {
            client: build_client(&config.http)?,
            target: Target::new(config)?,
            retry: RetryPolicy::new(config.retry.clone()),
        })
    }

    /// Endpoint requests are sent to.
    #[must_use]
    pub const fn endpoint(&self) -> &VaultEndpoint {
        &self.target.endpoint
    }

    async fn execute_once(&self, request: &HttpRequest) -> VaultResult<Value> {
        let prepared = self.target.prepare(request)?;
        let mut builder = self
            .client
            .request(prepared.method, prepared.url)
            .headers(prepared.headers);
        if let Some(body) = prepared.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| VaultError::unavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        finish(status, &prepared.path, &text)
    }
}

#[async_trait]
impl AsyncTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method(), path = %request.path()))]
    async fn execute(&self, request: &HttpRequest) -> VaultResult<Value> {
        self.retry.execute(|| self.execute_once(request)).await
    }
}

/// Blocking transport over `reqwest::blocking::Client`.
///
/// Must not be used from within an async runtime thread.
#[derive(Debug, Clone)]
pub struct BlockingReqwestTransport {
    client: ::reqwest::blocking::Client,
    target: Target,
    retry: RetryPolicy,
}

impl BlockingReqwestTransport {
    /// Build a transport from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the address does not parse or the client cannot be built.
    pub fn new(config: &VaultConfig) -> VaultResult<Self> {
        Ok(Self {
            client: build_blocking_client(&config.http)?,
            target: Target::new(config)?,
            retry: RetryPolicy::new(config.retry.clone()),
        })
    }

    /// Endpoint requests are sent to.
    #[must_use]
    pub const fn endpoint(&self) -> &VaultEndpoint {
        &self.target.endpoint
    }

    fn execute_once(&self, request: &HttpRequest) -> VaultResult<Value> {
        let prepared = self.target.prepare(request)?;
        let mut builder = self
            .client
            .request(prepared.method, prepared.url)
            .headers(prepared.headers);
        if let Some(body) = prepared.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .map_err(|e| VaultError::unavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text()?;
        finish(status, &prepared.path, &text)
    }
}

impl BlockingTransport for BlockingReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method(), path = %request.path()))]
    fn execute(&self, request: &HttpRequest) -> VaultResult<Value> {
        self.retry.execute_blocking(|| self.execute_once(request))
    }
}

/// Build the pooled async client with rustls.
///
/// # Errors
///
/// Returns an error if a PEM file cannot be read or the client cannot be
/// built (e.g., TLS initialization fails).
pub fn build_client(settings: &HttpSettings) -> VaultResult<::reqwest::Client> {
    configure_client!(::reqwest::Client::builder(), settings)
}

fn build_blocking_client(settings: &HttpSettings) -> VaultResult<::reqwest::blocking::Client> {
    configure_client!(::reqwest::blocking::Client::builder(), settings)
}

fn read_pem(path: &Path) -> VaultResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| VaultError::InvalidConfig(format!("{}: {e}", path.display())))
}

fn load_identity(settings: &HttpSettings) -> VaultResult<Option<::reqwest::Identity>> {
    settings
        .client_identity
        .as_deref()
        .map(|path| Ok(::reqwest::Identity::from_pem(&read_pem(path)?)?))
        .transpose()
}

fn load_ca_certificate(settings: &HttpSettings) -> VaultResult<Option<::reqwest::Certificate>> {
    settings
        .ca_certificate
        .as_deref()
        .map(|path| Ok(::reqwest::Certificate::from_pem(&read_pem(path)?)?))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::token::VaultToken;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> VaultConfig {
        VaultConfig::new(server.uri()).with_retry(
            RetryConfig::default()
                .without_jitter()
                .with_initial_delay(Duration::from_millis(5)),
        )
    }

    #[test]
    fn test_prepared_request_carries_vault_headers() {
        let config = VaultConfig::new("https://vault.example:8200").with_namespace("team-a");
        let target = Target::new(&config).unwrap();
        let request = HttpRequest::put("sys/leases/renew")
            .with_header("X-Request-Id", "r-1")
            .with_token(VaultToken::new("s.abc"))
            .with_body(json!({"lease_id": "l"}));

        let prepared = target.prepare(&request).unwrap();
        assert_eq!(prepared.method, ::reqwest::Method::PUT);
        assert_eq!(prepared.url.as_str(), "https://vault.example:8200/v1/sys/leases/renew");
        assert_eq!(prepared.path, "sys/leases/renew");
        assert_eq!(prepared.headers["x-vault-namespace"], "team-a");
        assert_eq!(prepared.headers["x-request-id"], "r-1");
        assert_eq!(prepared.headers["x-vault-token"], "s.abc");
        assert!(prepared.headers["x-vault-token"].is_sensitive());
        assert_eq!(prepared.body, Some(&json!({"lease_id": "l"})));

        let invalid = HttpRequest::get("secret/app").with_header("bad header", "x");
        assert!(matches!(target.prepare(&invalid), Err(VaultError::InvalidConfig(_))));
    }

    #[test]
    fn test_status_handling() {
        assert_eq!(finish(204, "sys/leases/revoke", "").unwrap(), Value::Null);
        assert!(matches!(
            finish(429, "secret/app", ""),
            Err(VaultError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_sends_token_namespace_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .and(header("X-Vault-Token", "s.abc"))
            .and(header("X-Vault-Namespace", "team-a"))
            .and(body_json(json!({"role_id": "r"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"auth": {"client_token": "t"}})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&config(&server).with_namespace("team-a")).unwrap();
        let request = HttpRequest::post("auth/{mount}/login")
            .with_variable("mount", "approle")
            .with_token(VaultToken::new("s.abc"))
            .with_body(json!({"role_id": "r"}));

        let body = transport.execute(&request).await.unwrap();
        assert_eq!(body["auth"]["client_token"], "t");
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/leases/revoke"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&config(&server)).unwrap();
        let body = transport
            .execute(&HttpRequest::put("sys/leases/revoke").with_body(json!({"lease_id": "x"})))
            .await
            .unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/app"))
            .respond_with(ResponseTemplate::new(503).set_body_string("sealed"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"k": "v"}})))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&config(&server)).unwrap();
        let body = transport.execute(&HttpRequest::get("secret/app")).await.unwrap();
        assert_eq!(body["data"]["k"], "v");
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/userpass/login/bob"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"errors": ["invalid username or password"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&config(&server)).unwrap();
        let err = transport
            .execute(&HttpRequest::post("auth/userpass/login/bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_blocking_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .and(header("X-Vault-Token", "s.abc"))
            .and(header("X-Vault-Namespace", "team-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"ttl": 60}})))
            .mount(&server)
            .await;

        let config = config(&server).with_namespace("team-a");
        let body = tokio::task::spawn_blocking(move || {
            let transport = BlockingReqwestTransport::new(&config)?;
            transport.execute(
                &HttpRequest::get("auth/token/lookup-self").with_token(VaultToken::new("s.abc")),
            )
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(body["data"]["ttl"], 60);
    }
}
