//! Authentication mechanisms.
//!
//! Each mechanism knows how to describe its login as
//! [`AuthenticationSteps`]; [`AuthMethod`] is the closed set of built-in
//! mechanisms and [`AuthRegistry`] maps mechanism names to step factories so
//! applications can add their own.

pub mod approle;
pub mod aws_iam;
pub mod cert;
pub mod cubbyhole;
pub mod jwt;
pub mod registry;
pub mod token;
pub mod userpass;

pub use approle::{AppRoleAuthentication, RoleId, SecretId};
pub use aws_iam::{AwsIamAuthentication, IamSignRequest};
pub use cert::ClientCertificateAuthentication;
pub use cubbyhole::{CubbyholeAuthentication, UnwrappingEndpoints};
pub use jwt::JwtAuthentication;
pub use registry::{AuthConfig, AuthRegistry};
pub use token::TokenAuthentication;
pub use userpass::UsernamePasswordAuthentication;

use crate::error::{VaultError, VaultResult};
use crate::steps::AuthenticationSteps;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Source of a credential resolved at interpretation time.
#[derive(Clone)]
pub enum CredentialSupplier {
    /// Fixed value.
    Static(SecretString),
    /// File read on every login, e.g. a projected service account token.
    File(PathBuf),
    /// Arbitrary provider.
    Fn(Arc<dyn Fn() -> VaultResult<SecretString> + Send + Sync>),
}

impl CredentialSupplier {
    /// Fixed credential.
    #[must_use]
    pub fn value(value: impl Into<String>) -> Self {
        Self::Static(SecretString::from(value.into()))
    }

    /// Credential read from `path`.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Credential computed by `provider`.
    #[must_use]
    pub fn from_fn<F>(provider: F) -> Self
    where
        F: Fn() -> VaultResult<SecretString> + Send + Sync + 'static,
    {
        Self::Fn(Arc::new(provider))
    }

    /// Resolve the credential. File contents are trimmed.
    ///
    /// # Errors
    ///
    /// Returns `Credential` if the file cannot be read or is empty, or the
    /// provider's error.
    pub fn resolve(&self) -> VaultResult<SecretString> {
        match self {
            Self::Static(value) => Ok(value.clone()),
            Self::File(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| VaultError::Credential(format!("{}: {e}", path.display())))?;
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    return Err(VaultError::Credential(format!("{} is empty", path.display())));
                }
                Ok(SecretString::from(trimmed.to_string()))
            }
            Self::Fn(provider) => provider(),
        }
    }

    /// Resolve and expose as an owned string for a request body.
    pub(crate) fn resolve_string(&self) -> VaultResult<String> {
        self.resolve().map(|secret| secret.expose_secret().to_string())
    }
}

impl fmt::Debug for CredentialSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Static([REDACTED])"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Fn(_) => f.write_str("Fn"),
        }
    }
}

/// Built-in authentication mechanisms.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Static token
    Token(TokenAuthentication),
    /// Username and password
    UsernamePassword(UsernamePasswordAuthentication),
    /// AppRole
    AppRole(AppRoleAuthentication),
    /// JWT/OIDC
    Jwt(JwtAuthentication),
    /// Kubernetes service account
    Kubernetes(JwtAuthentication),
    /// TLS client certificate
    ClientCertificate(ClientCertificateAuthentication),
    /// Response-wrapped or cubbyhole-stored token
    Cubbyhole(CubbyholeAuthentication),
    /// AWS IAM signed `GetCallerIdentity` request
    AwsIam(AwsIamAuthentication),
}

impl AuthMethod {
    /// Mechanism name, as used in errors and the registry.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::UsernamePassword(_) => "userpass",
            Self::AppRole(_) => "approle",
            Self::Jwt(_) => "jwt",
            Self::Kubernetes(_) => "kubernetes",
            Self::ClientCertificate(_) => "cert",
            Self::Cubbyhole(_) => "cubbyhole",
            Self::AwsIam(_) => "aws-iam",
        }
    }

    /// Steps performing the login.
    #[must_use]
    pub fn steps(&self) -> AuthenticationSteps {
        let steps = match self {
            Self::Token(auth) => auth.steps(),
            Self::UsernamePassword(auth) => auth.steps(),
            Self::AppRole(auth) => auth.steps(),
            Self::Jwt(auth) | Self::Kubernetes(auth) => auth.steps(),
            Self::ClientCertificate(auth) => auth.steps(),
            Self::Cubbyhole(auth) => auth.steps(),
            Self::AwsIam(auth) => auth.steps(),
        };
        steps.named(self.name())
    }
}

/// Login path for a mount: `auth/{mount}/login`.
pub(crate) fn login_path(mount: &str) -> String {
    format!("auth/{}/login", mount.trim_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_static_and_fn_suppliers() {
        let supplier = CredentialSupplier::value("jwt-value");
        assert_eq!(supplier.resolve_string().unwrap(), "jwt-value");

        let supplier = CredentialSupplier::from_fn(|| Ok(SecretString::from("computed".to_string())));
        assert_eq!(supplier.resolve_string().unwrap(), "computed");
    }

    #[test]
    fn test_file_supplier_reads_lazily_and_trims() {
        let path = std::env::temp_dir().join(format!("vault-session-jwt-{}", std::process::id()));
        let supplier = CredentialSupplier::file(&path);
        assert!(matches!(supplier.resolve(), Err(VaultError::Credential(_))));

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "  header.payload.sig  ").unwrap();
        assert_eq!(supplier.resolve_string().unwrap(), "header.payload.sig");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_debug_is_redacted() {
        let debug = format!("{:?}", CredentialSupplier::value("s3cr3t"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_steps_are_named_after_mechanism() {
        let method = AuthMethod::Token(TokenAuthentication::new("s.static"));
        assert_eq!(method.steps().backend(), "token");

        let method = AuthMethod::Kubernetes(JwtAuthentication::kubernetes("web"));
        assert_eq!(method.name(), "kubernetes");
        assert_eq!(method.steps().backend(), "kubernetes");
    }

    #[test]
    fn test_login_path() {
        assert_eq!(login_path("approle"), "auth/approle/login");
        assert_eq!(login_path("/my-jwt/"), "auth/my-jwt/login");
    }
}
