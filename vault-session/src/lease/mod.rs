//! Secret lease model and the lease renewal container.

pub mod container;

pub use container::{SecretLeaseContainer, SecretLeaseEvent};

use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// How a requested secret is kept fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Renew the lease; expiry ends the registration.
    Renew,
    /// Renew while possible, then fetch a new secret value.
    Rotate,
}

/// A secret requested by path and lifecycle mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestedSecret {
    path: String,
    mode: Mode,
}

impl RequestedSecret {
    /// Secret whose lease is renewed until it expires.
    #[must_use]
    pub fn renewable(path: impl Into<String>) -> Self {
        Self::new(path, Mode::Renew)
    }

    /// Secret that is rotated once its lease can no longer be renewed.
    #[must_use]
    pub fn rotating(path: impl Into<String>) -> Self {
        Self::new(path, Mode::Rotate)
    }

    /// Secret with an explicit mode. Leading slashes are dropped from `path`.
    #[must_use]
    pub fn new(path: impl Into<String>, mode: Mode) -> Self {
        let path = path.into();
        Self {
            path: path.trim_start_matches('/').to_string(),
            mode,
        }
    }

    /// Secret path relative to `v1/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Lifecycle mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }
}

/// Time-bounded grant attached to a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    lease_id: Option<String>,
    lease_duration: Duration,
    renewable: bool,
}

impl Lease {
    /// The "not leased" sentinel.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            lease_id: None,
            lease_duration: Duration::ZERO,
            renewable: false,
        }
    }

    /// Lease as reported by Vault. An empty id means "not leased".
    #[must_use]
    pub fn of(lease_id: impl Into<String>, lease_duration: Duration, renewable: bool) -> Self {
        let lease_id = lease_id.into();
        Self {
            lease_id: (!lease_id.is_empty()).then_some(lease_id),
            lease_duration,
            renewable,
        }
    }

    /// Lease without id that only carries a time to live.
    #[must_use]
    pub const fn from_time_to_live(lease_duration: Duration) -> Self {
        Self {
            lease_id: None,
            lease_duration,
            renewable: false,
        }
    }

    /// Lease identifier, if leased.
    #[must_use]
    pub fn lease_id(&self) -> Option<&str> {
        self.lease_id.as_deref()
    }

    /// Granted duration.
    #[must_use]
    pub const fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Whether Vault allows renewal.
    #[must_use]
    pub const fn is_renewable(&self) -> bool {
        self.renewable
    }

    /// Whether this is the "not leased" sentinel.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.lease_id.is_none() && self.lease_duration.is_zero()
    }

    /// Next lifecycle action for this lease under `mode`.
    pub(crate) fn next_action(&self, mode: Mode) -> Option<LeaseAction> {
        if self.is_none() {
            return None;
        }
        if self.renewable && self.lease_id.is_some() && !self.lease_duration.is_zero() {
            return Some(LeaseAction::Renew);
        }
        if mode == Mode::Rotate && !self.lease_duration.is_zero() {
            return Some(LeaseAction::Rotate);
        }
        None
    }
}

impl Default for Lease {
    fn default() -> Self {
        Self::none()
    }
}

/// Scheduled work for a registered secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaseAction {
    Renew,
    Rotate,
}

/// Secret payload (`data` of the Vault response). `Debug` is redacted.
#[derive(Clone, PartialEq)]
pub struct SecretBody(Value);

impl SecretBody {
    /// Wrap a response `data` object.
    #[must_use]
    pub const fn new(data: Value) -> Self {
        Self(data)
    }

    /// Full payload.
    #[must_use]
    pub const fn expose(&self) -> &Value {
        &self.0
    }

    /// Single string field of the payload.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl fmt::Debug for SecretBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBody([REDACTED])")
    }
}

/// Endpoints used for lease renewal and revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaseEndpoints {
    /// `sys/leases/renew` and `sys/leases/revoke` (Vault 0.8+).
    #[default]
    SysLeases,
    /// `sys/renew` and `sys/revoke`.
    Legacy,
}

impl LeaseEndpoints {
    /// Renewal path.
    #[must_use]
    pub const fn renew_path(self) -> &'static str {
        match self {
            Self::SysLeases => "sys/leases/renew",
            Self::Legacy => "sys/renew",
        }
    }

    /// Revocation path.
    #[must_use]
    pub const fn revoke_path(self) -> &'static str {
        match self {
            Self::SysLeases => "sys/leases/revoke",
            Self::Legacy => "sys/revoke",
        }
    }
}
