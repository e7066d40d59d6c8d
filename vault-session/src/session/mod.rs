//! Session token management.
//!
//! [`LifecycleAwareSessionManager`] caches the login token, renews it in the
//! background and falls back to a fresh login when renewal is impossible.
//! [`SimpleSessionManager`] is the blocking variant without renewal.

pub mod lifecycle;
pub mod simple;

pub use lifecycle::LifecycleAwareSessionManager;
pub use simple::SimpleSessionManager;

use crate::error::{VaultError, VaultResult};
use crate::token::Token;
use async_trait::async_trait;
use std::sync::Arc;

/// Token renewal endpoint.
pub const RENEW_SELF_PATH: &str = "auth/token/renew-self";

/// Token revocation endpoint.
pub const REVOKE_SELF_PATH: &str = "auth/token/revoke-self";

/// Source of the current session token.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Current token, logging in first if there is none.
    ///
    /// # Errors
    ///
    /// Returns `SessionUnavailable` wrapping the login failure.
    async fn session_token(&self) -> VaultResult<Token>;
}

#[async_trait]
impl<S: SessionManager + ?Sized> SessionManager for Arc<S> {
    async fn session_token(&self) -> VaultResult<Token> {
        (**self).session_token().await
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token cached.
    Empty,
    /// A login is in flight.
    Authenticating,
    /// A token is cached.
    Valid,
    /// A token is cached and being renewed.
    Renewing,
}

/// Session lifecycle notification.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A login produced a new token.
    AfterLogin {
        /// New token
        token: Token,
    },
    /// A login failed; no token is cached.
    LoginFailed {
        /// Cause
        error: Arc<VaultError>,
    },
    /// The token's lease was extended.
    AfterRenewed {
        /// Token with the renewed lease
        token: Token,
    },
    /// Renewal failed; a fresh login follows.
    RenewFailed {
        /// Token that could not be renewed
        token: Token,
        /// Cause
        error: Arc<VaultError>,
    },
    /// The token was dropped or revoked.
    Revoked {
        /// Dropped token
        token: Token,
    },
}
