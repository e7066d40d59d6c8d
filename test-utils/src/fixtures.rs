//! Vault response bodies for tests.

use serde_json::{json, Value};

/// Login response with an `auth` block.
#[must_use]
pub fn login_response(client_token: &str, renewable: bool, lease_duration: u64) -> Value {
    json!({
        "request_id": "5e6a0e0c-4b5c-8b3e-7c1f-1f7c2d0f5a11",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": null,
        "wrap_info": null,
        "warnings": null,
        "auth": {
            "client_token": client_token,
            "accessor": format!("accessor-{client_token}"),
            "policies": ["default"],
            "token_policies": ["default"],
            "metadata": {},
            "lease_duration": lease_duration,
            "renewable": renewable,
            "entity_id": "",
            "token_type": "service",
            "orphan": true
        }
    })
}

/// `auth/token/renew-self` response carrying top-level lease fields only.
#[must_use]
pub fn token_renewal_response(renewable: bool, lease_duration: u64) -> Value {
    json!({
        "lease_id": "",
        "renewable": renewable,
        "lease_duration": lease_duration
    })
}

/// `auth/token/lookup-self` response.
#[must_use]
pub fn lookup_self_response(ttl: u64, renewable: bool) -> Value {
    json!({
        "data": {
            "accessor": "lookup-accessor",
            "creation_ttl": ttl,
            "display_name": "token",
            "expire_time": null,
            "id": "redacted",
            "policies": ["default"],
            "renewable": renewable,
            "ttl": ttl
        }
    })
}

/// Leased secret response, e.g. from a database secrets engine.
#[must_use]
pub fn secret_response(lease_id: &str, renewable: bool, lease_duration: u64, data: Value) -> Value {
    json!({
        "request_id": "0c9b2b7e-2f43-4a53-a1f0-6a7d39b7e2c4",
        "lease_id": lease_id,
        "renewable": renewable,
        "lease_duration": lease_duration,
        "data": data,
        "wrap_info": null,
        "warnings": null,
        "auth": null
    })
}

/// Database credentials payload.
#[must_use]
pub fn database_credentials(username: &str) -> Value {
    json!({
        "username": username,
        "password": format!("{username}-password")
    })
}

/// `sys/leases/renew` response.
#[must_use]
pub fn lease_renewal_response(lease_id: &str, renewable: bool, lease_duration: u64) -> Value {
    json!({
        "lease_id": lease_id,
        "renewable": renewable,
        "lease_duration": lease_duration
    })
}

/// Response-wrapped unwrap result holding `data`.
#[must_use]
pub fn unwrapped_data(data: Value) -> Value {
    json!({ "data": data })
}

/// Vault error body.
#[must_use]
pub fn error_body(message: &str) -> Value {
    json!({ "errors": [message] })
}
