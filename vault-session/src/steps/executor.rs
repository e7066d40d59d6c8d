//! Blocking interpreter.

use super::chain::{lookup_self_request, AuthenticationSteps, Node, Terminal};
use crate::error::VaultResult;
use crate::response::login_token_from_lookup;
use crate::token::Token;
use crate::transport::BlockingTransport;
use serde_json::Value;
use tracing::{debug, instrument};

/// Runs a chain on the calling thread, one HTTP call at a time.
#[derive(Debug, Clone)]
pub struct StepExecutor<T> {
    transport: T,
}

impl<T: BlockingTransport> StepExecutor<T> {
    /// Executor issuing requests through `transport`.
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Transport used for requests.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Interpret `steps` into a token.
    ///
    /// # Errors
    ///
    /// Any failing step aborts the chain; the error is wrapped as a login
    /// failure of the chain's backend.
    #[instrument(skip(self, steps), fields(backend = %steps.backend()))]
    pub fn login(&self, steps: &AuthenticationSteps) -> VaultResult<Token> {
        self.obtain(steps)
            .map_err(|e| e.into_login(steps.backend()))
    }

    fn obtain(&self, steps: &AuthenticationSteps) -> VaultResult<Token> {
        let token = match steps.terminal() {
            Terminal::Token(token) => token.clone(),
            Terminal::Login { node, factory } => factory(self.evaluate(node)?)?,
        };
        if !steps.self_lookup() {
            return Ok(token);
        }
        let body = self.transport.execute(&lookup_self_request(token.value()))?;
        login_token_from_lookup(token.value(), body).map(Token::Login)
    }

    fn evaluate(&self, node: &Node) -> VaultResult<Value> {
        match node {
            Node::Just(value) => Ok(value.clone()),
            Node::Supplier(supplier) => supplier(),
            Node::Map { upstream, mapper } => mapper(self.evaluate(upstream)?),
            Node::Zip { left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(Value::Array(vec![left, right]))
            }
            Node::Request { upstream, request } => {
                let request = match upstream {
                    Some(upstream) => match self.evaluate(upstream)? {
                        Value::Null => request.clone(),
                        body => request.clone().or_body(body),
                    },
                    None => request.clone(),
                };
                debug!(method = %request.method(), path = %request.path(), "Executing login step");
                self.transport.execute(&request)
            }
            Node::OnNext { upstream, inspector } => {
                let value = self.evaluate(upstream)?;
                inspector(&value);
                Ok(value)
            }
        }
    }
}
