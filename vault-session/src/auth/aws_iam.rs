//! AWS IAM authentication.
//!
//! Vault verifies a signed `sts:GetCallerIdentity` request forwarded by the
//! client. Signing needs AWS credentials, so the SigV4 signer is supplied by
//! the application; it is invoked on every login.

use super::login_path;
use crate::error::{VaultError, VaultResult};
use crate::steps::{AuthenticationSteps, StepChain};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

const DEFAULT_PATH: &str = "aws";
const DEFAULT_ENDPOINT: &str = "https://sts.amazonaws.com/";
const REQUEST_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";
const SERVER_ID_HEADER: &str = "X-Vault-AWS-IAM-Server-ID";

/// Headers of the STS request, multi-valued.
pub type Headers = BTreeMap<String, Vec<String>>;

/// Request handed to the signer.
#[derive(Debug)]
pub struct IamSignRequest<'a> {
    /// STS endpoint
    pub url: &'a str,
    /// Form-encoded request body
    pub body: &'a str,
    /// Headers to sign
    pub headers: &'a Headers,
}

type Signer = Arc<dyn Fn(&IamSignRequest<'_>) -> VaultResult<Headers> + Send + Sync>;

/// `POST auth/{path}/login` with the base64-encoded signed request.
#[derive(Clone)]
pub struct AwsIamAuthentication {
    path: String,
    role: Option<String>,
    endpoint: String,
    server_id: Option<String>,
    signer: Signer,
}

impl AwsIamAuthentication {
    /// Login using `signer` to produce the signed STS headers.
    #[must_use]
    pub fn new<F>(signer: F) -> Self
    where
        F: Fn(&IamSignRequest<'_>) -> VaultResult<Headers> + Send + Sync + 'static,
    {
        Self {
            path: DEFAULT_PATH.to_string(),
            role: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            server_id: None,
            signer: Arc::new(signer),
        }
    }

    /// Use another mount.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Vault role to authenticate against.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Regional STS endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Value of the `X-Vault-AWS-IAM-Server-ID` header the mount requires.
    #[must_use]
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    /// Steps performing the login. Signing happens at interpretation time.
    #[must_use]
    pub fn steps(&self) -> AuthenticationSteps {
        let auth = self.clone();
        StepChain::from_supplier(move || auth.login_body()).login_at(login_path(&self.path))
    }

    fn login_body(&self) -> VaultResult<Value> {
        let mut headers = Headers::new();
        headers.insert("Content-Length".to_string(), vec![REQUEST_BODY.len().to_string()]);
        headers.insert(
            "Content-Type".to_string(),
            vec!["application/x-www-form-urlencoded; charset=utf-8".to_string()],
        );
        if let Some(server_id) = &self.server_id {
            headers.insert(SERVER_ID_HEADER.to_string(), vec![server_id.clone()]);
        }

        let signed = (self.signer)(&IamSignRequest {
            url: &self.endpoint,
            body: REQUEST_BODY,
            headers: &headers,
        })?;
        let signed_json = serde_json::to_string(&signed).map_err(VaultError::from)?;

        let mut body = Map::new();
        body.insert("iam_http_request_method".to_string(), "POST".into());
        body.insert("iam_request_url".to_string(), STANDARD.encode(&self.endpoint).into());
        body.insert("iam_request_body".to_string(), STANDARD.encode(REQUEST_BODY).into());
        body.insert("iam_request_headers".to_string(), STANDARD.encode(signed_json).into());
        if let Some(role) = &self.role {
            body.insert("role".to_string(), role.clone().into());
        }
        Ok(Value::Object(body))
    }
}

impl fmt::Debug for AwsIamAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsIamAuthentication")
            .field("path", &self.path)
            .field("role", &self.role)
            .field("endpoint", &self.endpoint)
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(request: &IamSignRequest<'_>) -> VaultResult<Headers> {
        let mut signed = request.headers.clone();
        signed.insert("Authorization".to_string(), vec!["AWS4-HMAC-SHA256 test".to_string()]);
        Ok(signed)
    }

    #[test]
    fn test_login_body_is_base64_encoded() {
        let auth = AwsIamAuthentication::new(signer)
            .with_role("web")
            .with_server_id("vault.example.com");
        let body = auth.login_body().unwrap();

        assert_eq!(body["iam_http_request_method"], "POST");
        assert_eq!(body["role"], "web");
        assert_eq!(
            body["iam_request_url"],
            STANDARD.encode("https://sts.amazonaws.com/")
        );
        assert_eq!(
            body["iam_request_body"],
            "QWN0aW9uPUdldENhbGxlcklkZW50aXR5JlZlcnNpb249MjAxMS0wNi0xNQ=="
        );

        let headers = STANDARD
            .decode(body["iam_request_headers"].as_str().unwrap())
            .unwrap();
        let headers: Headers = serde_json::from_slice(&headers).unwrap();
        assert_eq!(headers["X-Vault-AWS-IAM-Server-ID"], vec!["vault.example.com"]);
        assert_eq!(headers["Authorization"], vec!["AWS4-HMAC-SHA256 test"]);
    }

    #[test]
    fn test_signer_failure_propagates() {
        let auth = AwsIamAuthentication::new(|_| Err(VaultError::Credential("no credentials".into())));
        assert!(matches!(auth.login_body(), Err(VaultError::Credential(_))));
    }
}
