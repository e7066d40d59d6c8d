//! Vault client configuration.

use crate::endpoint::VaultEndpoint;
use crate::error::VaultResult;
use crate::lease::LeaseEndpoints;
use crate::retry::RetryConfig;
use crate::trigger::FixedTimeoutRefreshTrigger;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ADDR: &str = "https://vault.vault.svc:8200";

/// HTTP client settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Request timeout (default: 30s)
    pub timeout: Duration,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
    /// PEM bundle (certificate and key) presented for TLS client
    /// certificate authentication
    pub client_identity: Option<PathBuf>,
    /// Additional PEM root certificate
    pub ca_certificate: Option<PathBuf>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: concat!("vault-session/", env!("CARGO_PKG_VERSION")).to_string(),
            client_identity: None,
            ca_certificate: None,
        }
    }
}

/// Session token renewal timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Renew this long before the token expires
    pub refresh_timeout: Duration,
    /// A renewed TTL at or below this counts as expiring
    pub expiry_threshold: Duration,
    /// Upper bound for the immediate re-check delay
    pub min_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let trigger = FixedTimeoutRefreshTrigger::default();
        Self {
            refresh_timeout: trigger.timeout(),
            expiry_threshold: trigger.valid_ttl_threshold(),
            min_delay: Duration::from_secs(1),
        }
    }
}

impl SessionSettings {
    /// Settings renewing `refresh_timeout` before expiry, with the derived
    /// expiry threshold.
    #[must_use]
    pub fn with_refresh_timeout(refresh_timeout: Duration) -> Self {
        let trigger = FixedTimeoutRefreshTrigger::new(refresh_timeout);
        Self {
            refresh_timeout,
            expiry_threshold: trigger.valid_ttl_threshold(),
            ..Self::default()
        }
    }

    /// Trigger for these settings.
    #[must_use]
    pub const fn trigger(&self) -> FixedTimeoutRefreshTrigger {
        FixedTimeoutRefreshTrigger::new(self.refresh_timeout).with_min_delay(self.min_delay)
    }
}

/// Secret lease renewal timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSettings {
    /// Renew this long before the lease expires
    pub expiry_threshold: Duration,
    /// Leases renewed to this TTL or less count as expiring; also the upper
    /// bound for the immediate re-check delay
    pub min_renewal: Duration,
    /// Retryable renewal failures tolerated before the lease is given up
    pub renewal_retry_limit: u32,
    /// Renew/revoke endpoint flavour
    pub endpoints: LeaseEndpoints,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            expiry_threshold: Duration::from_secs(60),
            min_renewal: Duration::from_secs(10),
            renewal_retry_limit: 3,
            endpoints: LeaseEndpoints::default(),
        }
    }
}

impl LeaseSettings {
    /// Trigger for these settings.
    #[must_use]
    pub const fn trigger(&self) -> FixedTimeoutRefreshTrigger {
        FixedTimeoutRefreshTrigger::new(self.expiry_threshold).with_min_delay(self.min_renewal)
    }

    /// Set the expiry threshold.
    #[must_use]
    pub const fn with_expiry_threshold(mut self, threshold: Duration) -> Self {
        self.expiry_threshold = threshold;
        self
    }

    /// Set the minimum renewal TTL.
    #[must_use]
    pub const fn with_min_renewal(mut self, min_renewal: Duration) -> Self {
        self.min_renewal = min_renewal;
        self
    }

    /// Set the retry limit (clamped to 0-10).
    #[must_use]
    pub fn with_renewal_retry_limit(mut self, limit: u32) -> Self {
        self.renewal_retry_limit = limit.min(10);
        self
    }

    /// Select the lease endpoints.
    #[must_use]
    pub const fn with_endpoints(mut self, endpoints: LeaseEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address
    pub addr: String,
    /// Vault Enterprise namespace
    pub namespace: Option<String>,
    /// HTTP client settings
    pub http: HttpSettings,
    /// Transport retry settings
    pub retry: RetryConfig,
    /// Session token renewal timing
    pub session: SessionSettings,
    /// Secret lease renewal timing
    pub lease: LeaseSettings,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl VaultConfig {
    /// Create a configuration for `addr`.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            namespace: None,
            http: HttpSettings::default(),
            retry: RetryConfig::default(),
            session: SessionSettings::default(),
            lease: LeaseSettings::default(),
        }
    }

    /// Read `VAULT_ADDR` and `VAULT_NAMESPACE` through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let addr = lookup("VAULT_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        Self {
            namespace: lookup("VAULT_NAMESPACE").filter(|ns| !ns.is_empty()),
            ..Self::new(addr)
        }
    }

    /// Parsed endpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the address does not parse.
    pub fn endpoint(&self) -> VaultResult<VaultEndpoint> {
        VaultEndpoint::from_url(&self.addr)
    }

    /// Set the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http.timeout = timeout;
        self
    }

    /// Present the PEM bundle at `path` as TLS client identity.
    #[must_use]
    pub fn with_client_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.http.client_identity = Some(path.into());
        self
    }

    /// Trust the PEM root certificate at `path`.
    #[must_use]
    pub fn with_ca_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.http.ca_certificate = Some(path.into());
        self
    }

    /// Set retry settings.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set session timing.
    #[must_use]
    pub const fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// Set lease timing.
    #[must_use]
    pub const fn with_lease(mut self, lease: LeaseSettings) -> Self {
        self.lease = lease;
        self
    }

    /// Set the session refresh timeout (clamped to 1s-1h) and the derived
    /// expiry threshold.
    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        let clamped = timeout.clamp(Duration::from_secs(1), Duration::from_secs(3600));
        self.session = SessionSettings {
            min_delay: self.session.min_delay,
            ..SessionSettings::with_refresh_timeout(clamped)
        };
        self
    }
}
