//! Username and password authentication.

use super::login_path;
use crate::steps::{AuthenticationSteps, StepChain};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};

const DEFAULT_PATH: &str = "userpass";

/// `POST auth/{path}/login/{username}` with the password and optional TOTP.
#[derive(Debug, Clone)]
pub struct UsernamePasswordAuthentication {
    path: String,
    username: String,
    password: SecretString,
    totp: Option<SecretString>,
}

impl UsernamePasswordAuthentication {
    /// Authenticate `username` at the default `userpass` mount.
    #[must_use]
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            username: username.into(),
            password,
            totp: None,
        }
    }

    /// Use another mount, e.g. `ldap`.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Send a one-time password for MFA-enforced mounts.
    #[must_use]
    pub fn with_totp(mut self, totp: SecretString) -> Self {
        self.totp = Some(totp);
        self
    }

    /// Steps performing the login. The body is built at interpretation time.
    #[must_use]
    pub fn steps(&self) -> AuthenticationSteps {
        let password = self.password.clone();
        let totp = self.totp.clone();
        StepChain::from_supplier(move || {
            let mut body = Map::new();
            body.insert("password".to_string(), json!(password.expose_secret()));
            if let Some(totp) = &totp {
                body.insert("totp".to_string(), json!(totp.expose_secret()));
            }
            Ok(Value::Object(body))
        })
        .login_at(format!("{}/{}", login_path(&self.path), self.username))
    }
}
