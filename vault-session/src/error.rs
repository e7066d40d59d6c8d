//! Vault error types using thiserror 2.0.
//!
//! Errors carry a retryability classification so the transports and the
//! lease container can tell transient transport failures apart from
//! authentication and malformed-response failures.

use std::sync::Arc;
use thiserror::Error;

/// Vault-specific errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Vault server unavailable
    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A login pipeline failed for the named mechanism
    #[error("Cannot login using {backend}: {source}")]
    Login {
        /// Authentication mechanism name
        backend: String,
        /// Underlying failure
        #[source]
        source: Box<VaultError>,
    },

    /// No session token could be obtained
    #[error("Cannot obtain session token: {0}")]
    SessionUnavailable(#[source] Arc<VaultError>),

    /// Secret not found
    #[error("Secret not found at path: {0}")]
    SecretNotFound(String),

    /// Lease renewal failed
    #[error("Lease renewal failed: {0}")]
    LeaseRenewalFailed(String),

    /// Response lacks a field the wire contract requires
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Credential could not be resolved at interpretation time
    #[error("Cannot resolve credential: {0}")]
    Credential(String),

    /// Vault answered with a non-success status not covered elsewhere
    #[error("Status {status} at {path}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Request path
        path: String,
        /// Error messages reported by Vault
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limited
    #[error("Rate limited")]
    RateLimited,

    /// Background scheduling is not possible
    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(String),
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Check if error is retryable.
    ///
    /// Login and session failures report the retryability of their cause.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::RateLimited | Self::Http(_) => true,
            Self::Login { source, .. } => source.is_retryable(),
            Self::SessionUnavailable(cause) => cause.is_retryable(),
            _ => false,
        }
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an authentication failed error.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create a secret not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::SecretNotFound(path.into())
    }

    /// Create a malformed response error.
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Wrap `self` as the failure of a login using `backend`.
    ///
    /// Already wrapped login errors are returned unchanged.
    #[must_use]
    pub fn into_login(self, backend: &str) -> Self {
        match self {
            Self::Login { .. } => self,
            other => Self::Login {
                backend: backend.to_string(),
                source: Box::new(other),
            },
        }
    }
}
