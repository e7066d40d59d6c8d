//! Non-blocking interpreter.

use super::chain::{lookup_self_request, AuthenticationSteps, Node, Terminal};
use crate::error::VaultResult;
use crate::response::login_token_from_lookup;
use crate::token::Token;
use crate::transport::AsyncTransport;
use futures::future::{try_join, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, instrument};

/// Runs a chain over an async transport; zip branches run concurrently.
#[derive(Debug, Clone)]
pub struct StepOperator<T> {
    transport: T,
}

impl<T: AsyncTransport> StepOperator<T> {
    /// Operator issuing requests through `transport`.
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
    pub async fn login(&self, steps: &AuthenticationSteps) -> VaultResult<Token> {
        self.obtain(steps)
            .await
            .map_err(|e| e.into_login(steps.backend()))
    }

    async fn obtain(&self, steps: &AuthenticationSteps) -> VaultResult<Token> {
        let token = match steps.terminal() {
            Terminal::Token(token) => token.clone(),
            Terminal::Login { node, factory } => factory(self.evaluate(node).await?)?,
        };
        if !steps.self_lookup() {
            return Ok(token);
        }
        let body = self
            .transport
            .execute(&lookup_self_request(token.value()))
            .await?;
        login_token_from_lookup(token.value(), body).map(Token::Login)
    }

    fn evaluate<'a>(&'a self, node: &'a Node) -> BoxFuture<'a, VaultResult<Value>> {
        async move {
            match node {
                Node::Just(value) => Ok(value.clone()),
                Node::Supplier(supplier) => supplier(),
                Node::Map { upstream, mapper } => mapper(self.evaluate(upstream).await?),
                Node::Zip { left, right } => {
                    let (left, right) = try_join(self.evaluate(left), self.evaluate(right)).await?;
                    Ok(Value::Array(vec![left, right]))
                }
                Node::Request { upstream, request } => {
                    let request = match upstream {
                        Some(upstream) => match self.evaluate(upstream).await? {
                            Value::Null => request.clone(),
                            body => request.clone().or_body(body),
                        },
                        None => request.clone(),
                    };
                    debug!(method = %request.method(), path = %request.path(), "Executing login step");
                    self.transport.execute(&request).await
                }
                Node::OnNext { upstream, inspector } => {
                    let value = self.evaluate(upstream).await?;
                    inspector(&value);
                    Ok(value)
                }
            }
        }
        .boxed()
    }
}
