//! Blocking session manager without background renewal.

use crate::error::{VaultError, VaultResult};
use crate::steps::{AuthenticationSteps, StepExecutor};
use crate::token::Token;
use crate::transport::BlockingTransport;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Caches the login token and logs in again once it has expired.
///
/// Callers block on the lock while a login is in progress, so concurrent
/// callers share a single login.
pub struct SimpleSessionManager<T> {
    executor: StepExecutor<T>,
    steps: AuthenticationSteps,
    token: Mutex<Option<Token>>,
}

impl<T: BlockingTransport> SimpleSessionManager<T> {
    /// Manager logging in with `steps` over `transport`.
    pub fn new(steps: AuthenticationSteps, transport: T) -> Self {
        Self {
            executor: StepExecutor::new(transport),
            steps,
            token: Mutex::new(None),
        }
    }

    /// Current token, logging in first if there is none or it has expired.
    ///
    /// # Errors
    ///
    /// Returns `SessionUnavailable` wrapping the login failure.
    pub fn session_token(&self) -> VaultResult<Token> {
        let mut cached = self.token.lock();
        if let Some(token) = cached.as_ref().filter(|token| !expired(token)) {
            return Ok(token.clone());
        }
        if cached.take().is_some() {
            debug!("Session token expired, logging in again");
        }

        let token = self
            .executor
            .login(&self.steps)
            .map_err(|e| VaultError::SessionUnavailable(Arc::new(e)))?;
        info!(
            backend = self.steps.backend(),
            accessor = token.accessor().unwrap_or("-"),
            "Logged in to Vault"
        );
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token.
    pub fn invalidate(&self) {
        self.token.lock().take();
    }
}

fn expired(token: &Token) -> bool {
    token
        .as_login()
        .is_some_and(|login| login.is_expired(Instant::now()))
}
