//! JWT and Kubernetes authentication.

use super::{login_path, CredentialSupplier};
use crate::steps::{AuthenticationSteps, StepChain};
use serde_json::json;

const DEFAULT_JWT_PATH: &str = "jwt";
const DEFAULT_KUBERNETES_PATH: &str = "kubernetes";

/// Projected service account token location.
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// `POST auth/{path}/login` with `{role, jwt}`.
///
/// The JWT is resolved on every login, so rotated service account tokens
/// are picked up.
#[derive(Debug, Clone)]
pub struct JwtAuthentication {
    path: String,
    role: String,
    jwt: CredentialSupplier,
}

impl JwtAuthentication {
    /// JWT login for `role` at the default `jwt` mount.
    #[must_use]
    pub fn new(role: impl Into<String>, jwt: CredentialSupplier) -> Self {
        Self {
            path: DEFAULT_JWT_PATH.to_string(),
            role: role.into(),
            jwt,
        }
    }

    /// Kubernetes login for `role` using the pod's service account token.
    #[must_use]
    pub fn kubernetes(role: impl Into<String>) -> Self {
        Self {
            path: DEFAULT_KUBERNETES_PATH.to_string(),
            ..Self::new(role, CredentialSupplier::file(SERVICE_ACCOUNT_TOKEN_PATH))
        }
    }

    /// Use another mount.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Use another JWT source.
    #[must_use]
    pub fn with_jwt(mut self, jwt: CredentialSupplier) -> Self {
        self.jwt = jwt;
        self
    }

    /// Mount path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Steps performing the login.
    #[must_use]
    pub fn steps(&self) -> AuthenticationSteps {
        let role = self.role.clone();
        let jwt = self.jwt.clone();
        StepChain::from_supplier(move || Ok(json!({"role": role, "jwt": jwt.resolve_string()?})))
            .login_at(login_path(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubernetes_defaults() {
        let auth = JwtAuthentication::kubernetes("web");
        assert_eq!(auth.path(), "kubernetes");
        assert!(matches!(auth.jwt, CredentialSupplier::File(ref p) if p.to_str() == Some(SERVICE_ACCOUNT_TOKEN_PATH)));
    }

    #[test]
    fn test_custom_mount() {
        let auth = JwtAuthentication::new("ci", CredentialSupplier::value("a.b.c")).with_path("gitlab");
        assert_eq!(auth.path(), "gitlab");
    }
}
