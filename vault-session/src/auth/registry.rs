//! Mechanism registry and environment-driven configuration.

use super::approle::{AppRoleAuthentication, RoleId, SecretId};
use super::cubbyhole::{CubbyholeAuthentication, UnwrappingEndpoints};
use super::jwt::{JwtAuthentication, SERVICE_ACCOUNT_TOKEN_PATH};
use super::{
    AuthMethod, ClientCertificateAuthentication, CredentialSupplier, TokenAuthentication,
    UsernamePasswordAuthentication,
};
use crate::error::{VaultError, VaultResult};
use crate::steps::AuthenticationSteps;
use crate::token::VaultToken;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Authentication settings, usually read from `VAULT_*` variables.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Mechanism name (`VAULT_AUTH_METHOD`, default `token`)
    pub method: String,
    /// Mount path override (`VAULT_AUTH_PATH`)
    pub path: Option<String>,
    /// Token, initial token or wrapping token (`VAULT_TOKEN`)
    pub token: Option<SecretString>,
    /// Role (`VAULT_ROLE`)
    pub role: Option<String>,
    /// Username (`VAULT_USERNAME`)
    pub username: Option<String>,
    /// Password (`VAULT_PASSWORD`)
    pub password: Option<SecretString>,
    /// One-time password (`VAULT_TOTP`)
    pub totp: Option<SecretString>,
    /// AppRole role id (`VAULT_ROLE_ID`)
    pub role_id: Option<String>,
    /// AppRole secret id (`VAULT_SECRET_ID`)
    pub secret_id: Option<SecretString>,
    /// Inline JWT (`VAULT_JWT`)
    pub jwt: Option<SecretString>,
    /// JWT file (`VAULT_JWT_PATH`)
    pub jwt_path: Option<PathBuf>,
    /// Cubbyhole path holding a stored token (`VAULT_CUBBYHOLE_PATH`)
    pub cubbyhole_path: Option<String>,
    /// Look tokens up after login (`VAULT_SELF_LOOKUP`, default true)
    pub self_lookup: bool,
}

impl AuthConfig {
    /// Read the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Empty values count as unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let secret = |key: &str| get(key).map(SecretString::from);

        Self {
            method: get("VAULT_AUTH_METHOD").unwrap_or_else(|| "token".to_string()),
            path: get("VAULT_AUTH_PATH"),
            token: secret("VAULT_TOKEN"),
            role: get("VAULT_ROLE"),
            username: get("VAULT_USERNAME"),
            password: secret("VAULT_PASSWORD"),
            totp: secret("VAULT_TOTP"),
            role_id: get("VAULT_ROLE_ID"),
            secret_id: secret("VAULT_SECRET_ID"),
            jwt: secret("VAULT_JWT"),
            jwt_path: get("VAULT_JWT_PATH").map(PathBuf::from),
            cubbyhole_path: get("VAULT_CUBBYHOLE_PATH"),
            self_lookup: get("VAULT_SELF_LOOKUP").is_none_or(|v| !v.eq_ignore_ascii_case("false")),
        }
    }

    fn required<'a, T>(value: Option<&'a T>, key: &str) -> VaultResult<&'a T> {
        value.ok_or_else(|| VaultError::InvalidConfig(format!("{key} is required")))
    }

    fn token(&self) -> VaultResult<VaultToken> {
        Self::required(self.token.as_ref(), "VAULT_TOKEN")
            .map(|token| VaultToken::new(token.expose_secret()))
    }

    fn jwt_supplier(&self, default_file: Option<&str>) -> VaultResult<CredentialSupplier> {
        if let Some(jwt) = &self.jwt {
            return Ok(CredentialSupplier::Static(jwt.clone()));
        }
        match (&self.jwt_path, default_file) {
            (Some(path), _) => Ok(CredentialSupplier::file(path)),
            (None, Some(path)) => Ok(CredentialSupplier::file(path)),
            (None, None) => Err(VaultError::InvalidConfig(
                "VAULT_JWT or VAULT_JWT_PATH is required".to_string(),
            )),
        }
    }
}

impl AuthMethod {
    /// Built-in mechanism selected by `config.method`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unknown mechanisms or missing settings.
    pub fn from_config(config: &AuthConfig) -> VaultResult<Self> {
        let method = match config.method.as_str() {
            "token" => {
                let auth = TokenAuthentication::new(config.token()?);
                Self::Token(if config.self_lookup {
                    auth.with_self_lookup()
                } else {
                    auth
                })
            }
            "userpass" => {
                let username = AuthConfig::required(config.username.as_ref(), "VAULT_USERNAME")?;
                let password = AuthConfig::required(config.password.as_ref(), "VAULT_PASSWORD")?;
                let mut auth = UsernamePasswordAuthentication::new(username.as_str(), password.clone());
                if let Some(totp) = &config.totp {
                    auth = auth.with_totp(totp.clone());
                }
                if let Some(path) = &config.path {
                    auth = auth.with_path(path.as_str());
                }
                Self::UsernamePassword(auth)
            }
            "approle" => {
                let role_id = match &config.role_id {
                    Some(id) => RoleId::Provided(id.clone()),
                    None => RoleId::Pull(config.token()?),
                };
                let secret_id = match &config.secret_id {
                    Some(secret) => SecretId::Provided(secret.clone()),
                    None if config.token.is_some() => SecretId::Pull(config.token()?),
                    None => SecretId::Absent,
                };
                let mut auth = AppRoleAuthentication::new(role_id, secret_id);
                if let Some(role) = &config.role {
                    auth = auth.with_app_role(role.as_str());
                }
                if let Some(path) = &config.path {
                    auth = auth.with_path(path.as_str());
                }
                auth.validate()?;
                Self::AppRole(auth)
            }
            "jwt" | "kubernetes" => {
                let role = AuthConfig::required(config.role.as_ref(), "VAULT_ROLE")?;
                let kubernetes = config.method == "kubernetes";
                let default_file = kubernetes.then_some(SERVICE_ACCOUNT_TOKEN_PATH);
                let base = if kubernetes {
                    JwtAuthentication::kubernetes(role.as_str())
                } else {
                    JwtAuthentication::new(role.as_str(), CredentialSupplier::value(""))
                };
                let mut auth = base.with_jwt(config.jwt_supplier(default_file)?);
                if let Some(path) = &config.path {
                    auth = auth.with_path(path.as_str());
                }
                if kubernetes {
                    Self::Kubernetes(auth)
                } else {
                    Self::Jwt(auth)
                }
            }
            "cert" => {
                let mut auth = ClientCertificateAuthentication::new();
                if let Some(role) = &config.role {
                    auth = auth.with_role(role.as_str());
                }
                if let Some(path) = &config.path {
                    auth = auth.with_path(path.as_str());
                }
                Self::ClientCertificate(auth)
            }
            "cubbyhole" => {
                let token = config.token()?;
                let auth = match &config.cubbyhole_path {
                    Some(path) => CubbyholeAuthentication::stored(token, path.as_str()),
                    None => CubbyholeAuthentication::wrapped(token, UnwrappingEndpoints::SysWrapping),
                };
                Self::Cubbyhole(if config.self_lookup {
                    auth
                } else {
                    auth.without_self_lookup()
                })
            }
            other => {
                return Err(VaultError::InvalidConfig(format!(
                    "unsupported authentication method: {other}"
                )));
            }
        };
        Ok(method)
    }
}

/// Builds steps for a mechanism from configuration.
pub type StepsFactory = Arc<dyn Fn(&AuthConfig) -> VaultResult<AuthenticationSteps> + Send + Sync>;

const BUILT_IN: [&str; 7] = [
    "token",
    "userpass",
    "approle",
    "jwt",
    "kubernetes",
    "cert",
    "cubbyhole",
];

/// Mechanism name to steps factory.
#[derive(Clone)]
pub struct AuthRegistry {
    factories: HashMap<String, StepsFactory>,
}

impl AuthRegistry {
    /// Registry with every built-in mechanism configurable from
    /// [`AuthConfig`].
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        for name in BUILT_IN {
            registry.register(name, |config| {
                AuthMethod::from_config(config).map(|method| method.steps())
            });
        }
        registry
    }

    /// Register or replace the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&AuthConfig) -> VaultResult<AuthenticationSteps> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Steps for `config.method`, named after the mechanism.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unregistered mechanisms, or the factory's
    /// error.
    pub fn steps(&self, config: &AuthConfig) -> VaultResult<AuthenticationSteps> {
        let factory = self.factories.get(&config.method).ok_or_else(|| {
            VaultError::InvalidConfig(format!(
                "unsupported authentication method: {}",
                config.method
            ))
        })?;
        factory(config).map(|steps| steps.named(&config.method))
    }
}

impl Default for AuthRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for AuthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("AuthRegistry").field("mechanisms", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> AuthConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AuthConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = config(&[]);
        assert_eq!(config.method, "token");
        assert!(config.self_lookup);
        assert!(config.token.is_none());

        let config = self::config(&[("VAULT_SELF_LOOKUP", "FALSE"), ("VAULT_ROLE", "")]);
        assert!(!config.self_lookup);
        assert!(config.role.is_none());
    }

    #[test]
    fn test_token_method() {
        let method = AuthMethod::from_config(&config(&[("VAULT_TOKEN", "s.abc")])).unwrap();
        assert_eq!(method.name(), "token");
        assert!(method.steps().self_lookup());

        assert!(matches!(
            AuthMethod::from_config(&config(&[])),
            Err(VaultError::InvalidConfig(msg)) if msg.contains("VAULT_TOKEN")
        ));
    }

    #[test]
    fn test_approle_pull_requires_role() {
        let err = AuthMethod::from_config(&config(&[
            ("VAULT_AUTH_METHOD", "approle"),
            ("VAULT_TOKEN", "initial"),
        ]))
        .unwrap_err();
        assert!(matches!(err, VaultError::InvalidConfig(_)));

        let method = AuthMethod::from_config(&config(&[
            ("VAULT_AUTH_METHOD", "approle"),
            ("VAULT_ROLE_ID", "role"),
            ("VAULT_SECRET_ID", "secret"),
        ]))
        .unwrap();
        assert_eq!(method.name(), "approle");
    }

    #[test]
    fn test_kubernetes_defaults_to_service_account_file() {
        let method = AuthMethod::from_config(&config(&[
            ("VAULT_AUTH_METHOD", "kubernetes"),
            ("VAULT_ROLE", "web"),
        ]))
        .unwrap();
        assert!(matches!(method, AuthMethod::Kubernetes(ref auth) if auth.path() == "kubernetes"));

        let err = AuthMethod::from_config(&config(&[("VAULT_AUTH_METHOD", "jwt"), ("VAULT_ROLE", "ci")]))
            .unwrap_err();
        assert!(err.to_string().contains("VAULT_JWT"));
    }

    #[test]
    fn test_registry_builtins_and_custom() {
        let mut registry = AuthRegistry::with_defaults();
        for name in BUILT_IN {
            assert!(registry.contains(name));
        }
        assert!(registry.steps(&config(&[("VAULT_AUTH_METHOD", "github")])).is_err());

        registry.register("github", |_| Ok(AuthenticationSteps::just(VaultToken::new("gh"))));
        let steps = registry
            .steps(&config(&[("VAULT_AUTH_METHOD", "github")]))
            .unwrap();
        assert_eq!(steps.backend(), "github");
    }
}
