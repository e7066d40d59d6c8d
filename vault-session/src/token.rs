//! Token value types.
//!
//! Tokens compare by their credential value only; lease metadata never takes
//! part in equality so cached tokens can be matched against renewed ones.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Opaque Vault credential.
#[derive(Clone)]
pub struct VaultToken {
    value: SecretString,
}

impl VaultToken {
    /// Create a token from its credential value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::from(value.into()),
        }
    }

    /// Expose the credential, e.g. for the `X-Vault-Token` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Whether the credential is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl PartialEq for VaultToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for VaultToken {}

impl fmt::Debug for VaultToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultToken([REDACTED])")
    }
}

impl From<&str> for VaultToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VaultToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Token obtained through a login, carrying renewability and TTL.
#[derive(Clone)]
pub struct LoginToken {
    token: VaultToken,
    renewable: bool,
    lease_duration: Duration,
    issued_at: Instant,
    accessor: Option<String>,
}

impl LoginToken {
    /// Non-renewable login token. A zero `lease_duration` means no expiry.
    #[must_use]
    pub fn new(token: impl Into<VaultToken>, lease_duration: Duration) -> Self {
        Self {
            token: token.into(),
            renewable: false,
            lease_duration,
            issued_at: Instant::now(),
            accessor: None,
        }
    }

    /// Renewable login token.
    #[must_use]
    pub fn renewable(token: impl Into<VaultToken>, lease_duration: Duration) -> Self {
        Self {
            renewable: true,
            ..Self::new(token, lease_duration)
        }
    }

    /// Attach the token accessor reported by Vault.
    #[must_use]
    pub fn with_accessor(mut self, accessor: impl Into<String>) -> Self {
        self.accessor = Some(accessor.into());
        self
    }

    /// Override the issuance time.
    #[must_use]
    pub const fn with_issued_at(mut self, issued_at: Instant) -> Self {
        self.issued_at = issued_at;
        self
    }

    /// Credential value.
    #[must_use]
    pub const fn token(&self) -> &VaultToken {
        &self.token
    }

    /// Whether Vault allows this token to be renewed.
    #[must_use]
    pub const fn is_renewable(&self) -> bool {
        self.renewable
    }

    /// TTL granted at issuance.
    #[must_use]
    pub const fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// When the token (or its latest renewal) was obtained.
    #[must_use]
    pub const fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// Token accessor, safe to log.
    #[must_use]
    pub fn accessor(&self) -> Option<&str> {
        self.accessor.as_deref()
    }

    /// Remaining validity at `now`, `None` when the token does not expire.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.lease_duration.is_zero() {
            return None;
        }
        Some((self.issued_at + self.lease_duration).saturating_duration_since(now))
    }

    /// Whether the token's TTL has fully elapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining(now).is_some_and(|left| left.is_zero())
    }

    /// Same credential with lease metadata from a renewal response.
    #[must_use]
    pub fn renewed(&self, lease_duration: Duration, renewable: bool) -> Self {
        Self {
            token: self.token.clone(),
            renewable,
            lease_duration,
            issued_at: Instant::now(),
            accessor: self.accessor.clone(),
        }
    }
}

impl PartialEq for LoginToken {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for LoginToken {}

impl fmt::Debug for LoginToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginToken")
            .field("token", &"[REDACTED]")
            .field("renewable", &self.renewable)
            .field("lease_duration", &self.lease_duration)
            .field("accessor", &self.accessor)
            .finish_non_exhaustive()
    }
}

/// Session token as handed out to callers.
#[derive(Clone, Debug)]
pub enum Token {
    /// Token without lease metadata (e.g. statically configured).
    Plain(VaultToken),
    /// Token obtained through a login.
    Login(LoginToken),
}

impl Token {
    /// Credential value.
    #[must_use]
    pub const fn value(&self) -> &VaultToken {
        match self {
            Self::Plain(token) => token,
            Self::Login(login) => login.token(),
        }
    }

    /// Expose the credential value.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.value().expose()
    }

    /// Lease metadata, if any.
    #[must_use]
    pub const fn as_login(&self) -> Option<&LoginToken> {
        match self {
            Self::Plain(_) => None,
            Self::Login(login) => Some(login),
        }
    }

    /// Whether the token can be renewed.
    #[must_use]
    pub const fn is_renewable(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            Self::Login(login) => login.is_renewable(),
        }
    }

    /// Lease duration, zero for plain tokens.
    #[must_use]
    pub const fn lease_duration(&self) -> Duration {
        match self {
            Self::Plain(_) => Duration::ZERO,
            Self::Login(login) => login.lease_duration(),
        }
    }

    /// Accessor for logging, if known.
    #[must_use]
    pub fn accessor(&self) -> Option<&str> {
        self.as_login().and_then(LoginToken::accessor)
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl Eq for Token {}

impl From<VaultToken> for Token {
    fn from(token: VaultToken) -> Self {
        Self::Plain(token)
    }
}

impl From<LoginToken> for Token {
    fn from(token: LoginToken) -> Self {
        Self::Login(token)
    }
}
