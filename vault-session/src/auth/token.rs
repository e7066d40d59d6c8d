//! Static token authentication.

use crate::steps::AuthenticationSteps;
use crate::token::VaultToken;

/// Uses a pre-issued token, optionally looking it up to learn its TTL.
#[derive(Debug, Clone)]
pub struct TokenAuthentication {
    token: VaultToken,
    self_lookup: bool,
}

impl TokenAuthentication {
    /// Authenticate with `token` as-is.
    #[must_use]
    pub fn new(token: impl Into<VaultToken>) -> Self {
        Self {
            token: token.into(),
            self_lookup: false,
        }
    }

    /// Look the token up so the session manager can renew it.
    #[must_use]
    pub const fn with_self_lookup(mut self) -> Self {
        self.self_lookup = true;
        self
    }

    /// Steps yielding the token.
    #[must_use]
    pub fn steps(&self) -> AuthenticationSteps {
        let steps = AuthenticationSteps::just(self.token.clone());
        if self.self_lookup {
            steps.with_self_lookup()
        } else {
            steps
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_lookup_flag() {
        assert!(!TokenAuthentication::new("s.a").steps().self_lookup());
        assert!(TokenAuthentication::new("s.a").with_self_lookup().steps().self_lookup());
    }
}
