//! AppRole authentication.
//!
//! Role id and secret id are each provided, pulled from the role using an
//! initial token, or unwrapped from a response-wrapping token. The two are
//! obtained by independent branches that the async interpreter runs
//! concurrently.

use super::cubbyhole::UnwrappingEndpoints;
use super::login_path;
use crate::error::{VaultError, VaultResult};
use crate::response::VaultResponse;
use crate::steps::{AuthenticationSteps, StepChain};
use crate::token::VaultToken;
use crate::transport::HttpRequest;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};

const DEFAULT_PATH: &str = "approle";

/// Source of the role id.
#[derive(Debug, Clone)]
pub enum RoleId {
    /// Known role id.
    Provided(String),
    /// Read from `auth/{path}/role/{role}/role-id` with the given token.
    Pull(VaultToken),
    /// Unwrapped from a response-wrapping token.
    Wrapped(VaultToken),
}

/// Source of the secret id.
#[derive(Debug, Clone)]
pub enum SecretId {
    /// Known secret id.
    Provided(SecretString),
    /// Generated via `auth/{path}/role/{role}/secret-id` with the given token.
    Pull(VaultToken),
    /// Unwrapped from a response-wrapping token.
    Wrapped(VaultToken),
    /// Role does not bind a secret id.
    Absent,
}

/// `POST auth/{path}/login` with `{role_id, secret_id}`.
#[derive(Debug, Clone)]
pub struct AppRoleAuthentication {
    path: String,
    role_id: RoleId,
    secret_id: SecretId,
    app_role: Option<String>,
    unwrapping: UnwrappingEndpoints,
}

impl AppRoleAuthentication {
    /// AppRole login at the default `approle` mount.
    #[must_use]
    pub fn new(role_id: RoleId, secret_id: SecretId) -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            role_id,
            secret_id,
            app_role: None,
            unwrapping: UnwrappingEndpoints::default(),
        }
    }

    /// Use another mount.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Role name, required when pulling ids.
    #[must_use]
    pub fn with_app_role(mut self, app_role: impl Into<String>) -> Self {
        self.app_role = Some(app_role.into());
        self
    }

    /// Endpoints used for wrapped ids.
    #[must_use]
    pub const fn with_unwrapping_endpoints(mut self, endpoints: UnwrappingEndpoints) -> Self {
        self.unwrapping = endpoints;
        self
    }

    /// Check that pulled ids have a role name to pull from.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if an id is pulled but no role name is set.
    pub fn validate(&self) -> VaultResult<()> {
        let pulls = matches!(self.role_id, RoleId::Pull(_)) || matches!(self.secret_id, SecretId::Pull(_));
        if pulls && self.app_role.is_none() {
            return Err(VaultError::InvalidConfig(
                "AppRole name is required to pull role or secret id".to_string(),
            ));
        }
        Ok(())
    }

    /// Steps performing the login.
    #[must_use]
    pub fn steps(&self) -> AuthenticationSteps {
        self.role_id_chain()
            .zip_with(self.secret_id_chain())
            .try_map(|pair| {
                let mut body = Map::new();
                body.insert("role_id".to_string(), pair_member(&pair, 0)?);
                let secret_id = pair_member(&pair, 1)?;
                if !secret_id.is_null() {
                    body.insert("secret_id".to_string(), secret_id);
                }
                Ok(Value::Object(body))
            })
            .login_at(login_path(&self.path))
    }

    fn role_request(&self, request: fn(String) -> HttpRequest, suffix: &str) -> HttpRequest {
        request(format!("auth/{}/role/{{role}}/{suffix}", self.path))
            .with_variable("role", self.app_role.clone().unwrap_or_default())
    }

    fn role_id_chain(&self) -> StepChain {
        match &self.role_id {
            RoleId::Provided(id) => StepChain::just(id.as_str()),
            RoleId::Pull(token) => StepChain::from_http_request(
                self.role_request(HttpRequest::get, "role-id")
                    .with_token(token.clone()),
            )
            .try_map(|body| data_field(body, "role_id")),
            RoleId::Wrapped(token) => self
                .unwrapping
                .unwrap_chain(token)
                .try_map(|body| data_field(body, "role_id")),
        }
    }

    fn secret_id_chain(&self) -> StepChain {
        match &self.secret_id {
            SecretId::Provided(secret) => {
                let secret = secret.clone();
                StepChain::from_supplier(move || Ok(json!(secret.expose_secret())))
            }
            SecretId::Pull(token) => StepChain::from_http_request(
                self.role_request(HttpRequest::post, "secret-id")
                    .with_token(token.clone()),
            )
            .try_map(|body| data_field(body, "secret_id")),
            SecretId::Wrapped(token) => self
                .unwrapping
                .unwrap_chain(token)
                .try_map(|body| data_field(body, "secret_id")),
            SecretId::Absent => StepChain::just(Value::Null),
        }
    }
}

fn data_field(body: Value, field: &str) -> VaultResult<Value> {
    let response = VaultResponse::parse(body)?;
    response
        .required_data()?
        .get(field)
        .filter(|value| value.is_string())
        .cloned()
        .ok_or_else(|| VaultError::malformed(format!("response data carries no {field}")))
}

fn pair_member(pair: &Value, index: usize) -> VaultResult<Value> {
    pair.get(index)
        .cloned()
        .ok_or_else(|| VaultError::malformed("zipped value is not a pair"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_role_name_for_pull() {
        let auth = AppRoleAuthentication::new(RoleId::Pull(VaultToken::new("t")), SecretId::Absent);
        assert!(matches!(auth.validate(), Err(VaultError::InvalidConfig(_))));
        assert!(auth.with_app_role("web").validate().is_ok());
    }

    #[test]
    fn test_role_path_expansion() {
        let auth = AppRoleAuthentication::new(RoleId::Provided("r".into()), SecretId::Absent)
            .with_path("my-approle")
            .with_app_role("web");
        let request = auth.role_request(HttpRequest::post, "secret-id");
        assert_eq!(request.path(), "auth/my-approle/role/web/secret-id");
        assert_eq!(request.method(), crate::transport::Method::Post);
    }

    #[test]
    fn test_data_field() {
        assert_eq!(
            data_field(json!({"data": {"secret_id": "s"}}), "secret_id").unwrap(),
            json!("s")
        );
        assert!(data_field(json!({"data": {}}), "secret_id").is_err());
        assert!(data_field(json!({}), "secret_id").is_err());
    }
}
