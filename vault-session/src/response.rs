//! Vault response wire structures and token/lease extraction.

use crate::{
    error::{VaultError, VaultResult},
    lease::Lease,
    token::{LoginToken, VaultToken},
};
use serde::Deserialize;
use serde_json::Value;
use std::{fmt, time::Duration};

/// Generic Vault response envelope.
#[derive(Debug, Deserialize, Default)]
pub struct VaultResponse {
    /// Login result, present on `auth/*` endpoints
    #[serde(default)]
    pub auth: Option<AuthData>,
    /// Secret payload
    #[serde(default)]
    pub data: Option<Value>,
    /// Lease identifier, empty when not leased
    #[serde(default)]
    pub lease_id: Option<String>,
    /// Lease duration in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the lease is renewable
    #[serde(default)]
    pub renewable: bool,
    /// Request id assigned by Vault
    #[serde(default)]
    pub request_id: Option<String>,
    /// Response-wrapping information
    #[serde(default)]
    pub wrap_info: Option<WrapInfo>,
    /// Warnings attached by Vault
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// `auth` block of a login response.
#[derive(Deserialize)]
pub struct AuthData {
    /// Issued token
    pub client_token: String,
    /// Token accessor
    #[serde(default)]
    pub accessor: Option<String>,
    /// Attached policies
    #[serde(default)]
    pub policies: Option<Vec<String>>,
    /// TTL in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the token is renewable
    #[serde(default)]
    pub renewable: bool,
    /// `service` or `batch`
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthData")
            .field("client_token", &"[REDACTED]")
            .field("accessor", &self.accessor)
            .field("policies", &self.policies)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// `wrap_info` block of a wrapped response.
#[derive(Debug, Deserialize)]
pub struct WrapInfo {
    /// Wrapping token TTL in seconds
    #[serde(default)]
    pub ttl: u64,
    /// Path that created the wrapped response
    #[serde(default)]
    pub creation_path: Option<String>,
}

impl VaultResponse {
    /// Parse a raw JSON body.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the body is not a Vault envelope.
    pub fn parse(value: Value) -> VaultResult<Self> {
        serde_json::from_value(value).map_err(VaultError::from)
    }

    /// The `auth` block, which login endpoints must return.
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if the block is absent.
    pub fn required_auth(&self) -> VaultResult<&AuthData> {
        self.auth
            .as_ref()
            .ok_or_else(|| VaultError::malformed("auth field must not be empty"))
    }

    /// The `data` block, which secret endpoints must return.
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if the block is absent or null.
    pub fn required_data(&self) -> VaultResult<&Value> {
        self.data
            .as_ref()
            .filter(|data| !data.is_null())
            .ok_or_else(|| VaultError::malformed("data field must not be empty"))
    }

    /// Lease described by the top-level lease fields.
    #[must_use]
    pub fn lease(&self) -> Lease {
        let duration = Duration::from_secs(self.lease_duration);
        match self.lease_id.as_deref() {
            Some(id) if !id.is_empty() => Lease::of(id, duration, self.renewable),
            _ if duration.is_zero() => Lease::none(),
            _ => Lease::from_time_to_live(duration),
        }
    }
}

/// Build a [`LoginToken`] from a login response body.
///
/// # Errors
///
/// Fails if the body has no `auth` block or no `client_token`.
pub fn login_token_from_auth(body: Value) -> VaultResult<LoginToken> {
    let response = VaultResponse::parse(body)?;
    let auth = response.required_auth()?;
    Ok(login_token(auth))
}

fn login_token(auth: &AuthData) -> LoginToken {
    let duration = Duration::from_secs(auth.lease_duration);
    let token = if auth.renewable {
        LoginToken::renewable(auth.client_token.as_str(), duration)
    } else {
        LoginToken::new(auth.client_token.as_str(), duration)
    };
    match &auth.accessor {
        Some(accessor) => token.with_accessor(accessor.as_str()),
        None => token,
    }
}

/// Build a [`LoginToken`] for `token` from an `auth/token/lookup-self` body.
///
/// # Errors
///
/// Fails if the body has no `data` block.
pub fn login_token_from_lookup(token: &VaultToken, body: Value) -> VaultResult<LoginToken> {
    let response = VaultResponse::parse(body)?;
    let data = response.required_data()?;

    let ttl = Duration::from_secs(data.get("ttl").and_then(Value::as_u64).unwrap_or_default());
    let renewable = data
        .get("renewable")
        .and_then(Value::as_bool)
        .unwrap_or_default();

    let login = if renewable {
        LoginToken::renewable(token.clone(), ttl)
    } else {
        LoginToken::new(token.clone(), ttl)
    };
    Ok(match data.get("accessor").and_then(Value::as_str) {
        Some(accessor) => login.with_accessor(accessor),
        None => login,
    })
}

/// Lease metadata from an `auth/token/renew-self` body.
///
/// The `auth` block wins; a body carrying only top-level lease fields is
/// accepted as well.
///
/// # Errors
///
/// Fails if neither shape is present.
pub fn token_renewal(body: Value) -> VaultResult<(Duration, bool)> {
    let has_lease_fields = body.get("lease_duration").is_some();
    let response = VaultResponse::parse(body)?;
    if let Some(auth) = &response.auth {
        return Ok((Duration::from_secs(auth.lease_duration), auth.renewable));
    }
    if has_lease_fields {
        return Ok((Duration::from_secs(response.lease_duration), response.renewable));
    }
    Err(VaultError::malformed("renewal response carries no lease"))
}

/// Lease from a `sys/leases/renew` body; an empty id keeps `lease_id`.
///
/// # Errors
///
/// Fails if the body has no `lease_duration`.
pub fn lease_renewal(lease_id: &str, body: Value) -> VaultResult<Lease> {
    if body.get("lease_duration").is_none() {
        return Err(VaultError::malformed("lease renewal carries no lease_duration"));
    }
    let response = VaultResponse::parse(body)?;
    let id = match response.lease_id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => lease_id,
    };
    Ok(Lease::of(
        id,
        Duration::from_secs(response.lease_duration),
        response.renewable,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_token_from_auth() {
        let token = login_token_from_auth(json!({
            "auth": {"client_token": "t1", "renewable": true, "lease_duration": 10, "accessor": "acc"}
        }))
        .unwrap();
        assert_eq!(token.token().expose(), "t1");
        assert!(token.is_renewable());
        assert_eq!(token.lease_duration(), Duration::from_secs(10));
        assert_eq!(token.accessor(), Some("acc"));
    }

    #[test]
    fn test_login_without_metadata_defaults() {
        let token = login_token_from_auth(json!({"auth": {"client_token": "my-token"}})).unwrap();
        assert!(!token.is_renewable());
        assert_eq!(token.lease_duration(), Duration::ZERO);
    }

    #[test]
    fn test_missing_auth_is_malformed() {
        let err = login_token_from_auth(json!({"data": {}})).unwrap_err();
        assert!(matches!(err, VaultError::MalformedResponse(_)));

        let err = login_token_from_auth(json!({"auth": null})).unwrap_err();
        assert!(matches!(err, VaultError::MalformedResponse(_)));
    }

    #[test]
    fn test_lookup_self() {
        let token = VaultToken::new("s.abc");
        let login = login_token_from_lookup(
            &token,
            json!({"data": {"creation_ttl": 600, "renewable": false, "ttl": 456}}),
        )
        .unwrap();
        assert_eq!(login.token(), &token);
        assert!(!login.is_renewable());
        assert_eq!(login.lease_duration(), Duration::from_secs(456));
    }

    #[test]
    fn test_token_renewal_shapes() {
        let (ttl, renewable) = token_renewal(json!({
            "auth": {"client_token": "t1", "renewable": true, "lease_duration": 20}
        }))
        .unwrap();
        assert_eq!((ttl, renewable), (Duration::from_secs(20), true));

        let (ttl, renewable) =
            token_renewal(json!({"lease_id": "", "renewable": true, "lease_duration": 10})).unwrap();
        assert_eq!((ttl, renewable), (Duration::from_secs(10), true));

        assert!(token_renewal(json!({"data": {}})).is_err());
    }

    #[test]
    fn test_lease_renewal_keeps_id_when_empty() {
        let lease = lease_renewal(
            "database/creds/ro/abc",
            json!({"lease_id": "", "lease_duration": 30, "renewable": true}),
        )
        .unwrap();
        assert_eq!(lease.lease_id(), Some("database/creds/ro/abc"));
        assert_eq!(lease.lease_duration(), Duration::from_secs(30));

        assert!(lease_renewal("x", json!({})).is_err());
    }

    #[test]
    fn test_response_lease() {
        let response = VaultResponse::parse(json!({
            "lease_id": "pki/issue/web/123", "lease_duration": 60, "renewable": false, "data": {}
        }))
        .unwrap();
        assert_eq!(response.lease(), Lease::of("pki/issue/web/123", Duration::from_secs(60), false));

        let kv = VaultResponse::parse(json!({"lease_id": "", "lease_duration": 0, "data": {}})).unwrap();
        assert!(kv.lease().is_none());
    }
}
