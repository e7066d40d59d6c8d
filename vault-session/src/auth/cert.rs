//! TLS client certificate authentication.
//!
//! The certificate itself is presented by the transport during the TLS
//! handshake; the login request only names the certificate role.

use super::login_path;
use crate::steps::{AuthenticationSteps, StepChain};
use serde_json::json;

const DEFAULT_PATH: &str = "cert";

/// `POST auth/{path}/login` with an optional `{name}` role.
#[derive(Debug, Clone, Default)]
pub struct ClientCertificateAuthentication {
    path: Option<String>,
    role: Option<String>,
}

impl ClientCertificateAuthentication {
    /// Login at the default `cert` mount, letting Vault pick the role.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another mount.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Authenticate against a specific certificate role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Steps performing the login.
    #[must_use]
    pub fn steps(&self) -> AuthenticationSteps {
        let body = self
            .role
            .as_ref()
            .map_or_else(|| json!({}), |role| json!({"name": role}));
        StepChain::just(body).login_at(login_path(self.path.as_deref().unwrap_or(DEFAULT_PATH)))
    }
}
