//! Cubbyhole authentication: obtain a token delivered through a
//! response-wrapped secret or stored in a cubbyhole.

use crate::error::{VaultError, VaultResult};
use crate::response::{login_token_from_auth, VaultResponse};
use crate::steps::{AuthenticationSteps, StepChain};
use crate::token::{Token, VaultToken};
use crate::transport::HttpRequest;
use serde_json::Value;

/// Endpoints used to unwrap a response-wrapping token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnwrappingEndpoints {
    /// `GET cubbyhole/response`; the wrapped response is a JSON string under
    /// `data.response`.
    Cubbyhole,
    /// `POST sys/wrapping/unwrap`; the body is the wrapped response.
    #[default]
    SysWrapping,
}

impl UnwrappingEndpoints {
    /// Request unwrapping the response wrapped by `token`.
    #[must_use]
    pub fn request(self, token: &VaultToken) -> HttpRequest {
        let request = match self {
            Self::Cubbyhole => HttpRequest::get("cubbyhole/response"),
            Self::SysWrapping => HttpRequest::post("sys/wrapping/unwrap"),
        };
        request.with_token(token.clone())
    }

    /// Extract the wrapped response from the unwrapping response `body`.
    ///
    /// # Errors
    ///
    /// Fails if the cubbyhole response carries no `data.response` string or
    /// the string is not JSON.
    pub fn unwrap_response(self, body: Value) -> VaultResult<Value> {
        match self {
            Self::SysWrapping => Ok(body),
            Self::Cubbyhole => {
                let response = VaultResponse::parse(body)?;
                let wrapped = response
                    .required_data()?
                    .get("response")
                    .and_then(Value::as_str)
                    .ok_or_else(|| VaultError::malformed("cubbyhole response carries no wrapped response"))?;
                serde_json::from_str(wrapped).map_err(VaultError::from)
            }
        }
    }

    /// Chain yielding the response wrapped by `token`.
    #[must_use]
    pub fn unwrap_chain(self, token: &VaultToken) -> StepChain {
        StepChain::from_http_request(self.request(token)).try_map(move |body| self.unwrap_response(body))
    }
}

#[derive(Debug, Clone)]
enum Source {
    Wrapped(UnwrappingEndpoints),
    Stored(String),
}

/// Token delivered through a cubbyhole.
#[derive(Debug, Clone)]
pub struct CubbyholeAuthentication {
    initial_token: VaultToken,
    source: Source,
    self_lookup: bool,
}

impl CubbyholeAuthentication {
    /// Unwrap a login response wrapped by `initial_token`.
    #[must_use]
    pub fn wrapped(initial_token: impl Into<VaultToken>, endpoints: UnwrappingEndpoints) -> Self {
        Self {
            initial_token: initial_token.into(),
            source: Source::Wrapped(endpoints),
            self_lookup: true,
        }
    }

    /// Read a token stored as the single entry at `path`.
    #[must_use]
    pub fn stored(initial_token: impl Into<VaultToken>, path: impl Into<String>) -> Self {
        Self {
            initial_token: initial_token.into(),
            source: Source::Stored(path.into()),
            self_lookup: true,
        }
    }

    /// Skip the self-lookup of the obtained token.
    #[must_use]
    pub const fn without_self_lookup(mut self) -> Self {
        self.self_lookup = false;
        self
    }

    /// Steps performing the login.
    #[must_use]
    pub fn steps(&self) -> AuthenticationSteps {
        let steps = match &self.source {
            Source::Wrapped(endpoints) => endpoints
                .unwrap_chain(&self.initial_token)
                .login(|response| login_token_from_auth(response).map(Token::Login)),
            Source::Stored(path) => {
                let path = path.clone();
                StepChain::from_http_request(
                    HttpRequest::get(path.clone()).with_token(self.initial_token.clone()),
                )
                .login(move |body| stored_token(&path, body))
            }
        };
        if self.self_lookup {
            steps.with_self_lookup()
        } else {
            steps
        }
    }
}

/// The single value stored in a cubbyhole secret.
fn stored_token(path: &str, body: Value) -> VaultResult<Token> {
    let response = VaultResponse::parse(body)?;
    let data = response
        .required_data()?
        .as_object()
        .ok_or_else(|| VaultError::malformed(format!("{path} data is not an object")))?;

    let mut values = data.values();
    match (values.next(), values.next()) {
        (None, _) => Err(VaultError::malformed(format!("{path} does not contain a token"))),
        (Some(Value::String(token)), None) => Ok(Token::Plain(VaultToken::new(token.as_str()))),
        (Some(_), None) => Err(VaultError::malformed(format!("{path} token is not a string"))),
        (Some(_), Some(_)) => Err(VaultError::malformed(format!(
            "{path} does not contain an unique token"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cubbyhole_unwrap_parses_string_response() {
        let inner = json!({"auth": {"client_token": "t", "lease_duration": 0}}).to_string();
        let unwrapped = UnwrappingEndpoints::Cubbyhole
            .unwrap_response(json!({"data": {"response": inner}}))
            .unwrap();
        assert_eq!(unwrapped["auth"]["client_token"], "t");

        assert!(UnwrappingEndpoints::Cubbyhole
            .unwrap_response(json!({"data": {}}))
            .is_err());
    }

    #[test]
    fn test_stored_token_requires_single_entry() {
        let token = stored_token("cubbyhole/token", json!({"data": {"mytoken": "s.abc"}})).unwrap();
        assert_eq!(token.expose(), "s.abc");

        let err = stored_token("cubbyhole/token", json!({"data": {}})).unwrap_err();
        assert!(err.to_string().contains("does not contain a token"));

        let err = stored_token("cubbyhole/token", json!({"data": {"a": "1", "b": "2"}})).unwrap_err();
        assert!(err.to_string().contains("unique token"));
    }

    #[test]
    fn test_self_lookup_default() {
        assert!(CubbyholeAuthentication::wrapped("w", UnwrappingEndpoints::Cubbyhole)
            .steps()
            .self_lookup());
        assert!(!CubbyholeAuthentication::stored("w", "cubbyhole/token")
            .without_self_lookup()
            .steps()
            .self_lookup());
    }
}
