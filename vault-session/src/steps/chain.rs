//! Step chain description.
//!
//! A chain is plain data: building one performs no I/O and resolves no
//! credentials. Interpreters walk the same node tree, so a chain built
//! once from configuration can be replayed for every login.

use crate::error::VaultResult;
use crate::response::login_token_from_auth;
use crate::token::{Token, VaultToken};
use crate::transport::HttpRequest;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Deferred value source.
pub type Supplier = Arc<dyn Fn() -> VaultResult<Value> + Send + Sync>;
/// Value transformation.
pub type Mapper = Arc<dyn Fn(Value) -> VaultResult<Value> + Send + Sync>;
/// Side-channel observer of intermediate values.
pub type Inspector = Arc<dyn Fn(&Value) + Send + Sync>;
/// Terminal conversion of the accumulated value into a token.
pub type TokenFactory = Arc<dyn Fn(Value) -> VaultResult<Token> + Send + Sync>;

const DEFAULT_BACKEND: &str = "custom";

/// Token self-lookup endpoint.
pub const LOOKUP_SELF_PATH: &str = "auth/token/lookup-self";

/// One step of a chain.
#[derive(Clone)]
pub(crate) enum Node {
    Just(Value),
    Supplier(Supplier),
    Map { upstream: Box<Node>, mapper: Mapper },
    Zip { left: Box<Node>, right: Box<Node> },
    Request { upstream: Option<Box<Node>>, request: HttpRequest },
    OnNext { upstream: Box<Node>, inspector: Inspector },
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Just(_) => f.write_str("Just"),
            Self::Supplier(_) => f.write_str("Supplier"),
            Self::Map { upstream, .. } => write!(f, "{upstream:?} -> Map"),
            Self::Zip { left, right } => write!(f, "Zip({left:?}, {right:?})"),
            Self::Request { upstream: Some(upstream), request } => {
                write!(f, "{upstream:?} -> {} {}", request.method(), request.template())
            }
            Self::Request { upstream: None, request } => {
                write!(f, "{} {}", request.method(), request.template())
            }
            Self::OnNext { upstream, .. } => write!(f, "{upstream:?} -> OnNext"),
        }
    }
}

/// Chain under construction, not yet terminated by a login step.
#[derive(Clone, Debug)]
pub struct StepChain {
    node: Node,
}

impl StepChain {
    /// Chain always yielding `value`.
    #[must_use]
    pub fn just(value: impl Into<Value>) -> Self {
        Self {
            node: Node::Just(value.into()),
        }
    }

    /// Chain evaluating `supplier` at interpretation time.
    #[must_use]
    pub fn from_supplier<F>(supplier: F) -> Self
    where
        F: Fn() -> VaultResult<Value> + Send + Sync + 'static,
    {
        Self {
            node: Node::Supplier(Arc::new(supplier)),
        }
    }

    /// Chain starting with an HTTP call; yields the response body.
    #[must_use]
    pub fn from_http_request(request: HttpRequest) -> Self {
        Self {
            node: Node::Request {
                upstream: None,
                request,
            },
        }
    }

    /// Transform the upstream value.
    #[must_use]
    pub fn map<F>(self, mapper: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.try_map(move |value| Ok(mapper(value)))
    }

    /// Transform the upstream value with a fallible function.
    #[must_use]
    pub fn try_map<F>(self, mapper: F) -> Self
    where
        F: Fn(Value) -> VaultResult<Value> + Send + Sync + 'static,
    {
        Self {
            node: Node::Map {
                upstream: Box::new(self.node),
                mapper: Arc::new(mapper),
            },
        }
    }

    /// Pair this chain's value with `other`'s as a two-element array.
    ///
    /// The branches are independent; the async interpreter runs them
    /// concurrently.
    #[must_use]
    pub fn zip_with(self, other: Self) -> Self {
        Self {
            node: Node::Zip {
                left: Box::new(self.node),
                right: Box::new(other.node),
            },
        }
    }

    /// Issue `request`, using the upstream value as the body unless the
    /// request already carries one.
    #[must_use]
    pub fn request(self, request: HttpRequest) -> Self {
        Self {
            node: Node::Request {
                upstream: Some(Box::new(self.node)),
                request,
            },
        }
    }

    /// Observe the upstream value without altering it.
    #[must_use]
    pub fn on_next<F>(self, inspector: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self {
            node: Node::OnNext {
                upstream: Box::new(self.node),
                inspector: Arc::new(inspector),
            },
        }
    }

    /// Terminate the chain by converting its value into a token.
    #[must_use]
    pub fn login<F>(self, factory: F) -> AuthenticationSteps
    where
        F: Fn(Value) -> VaultResult<Token> + Send + Sync + 'static,
    {
        AuthenticationSteps {
            backend: Arc::from(DEFAULT_BACKEND),
            self_lookup: false,
            terminal: Terminal::Login {
                node: self.node,
                factory: Arc::new(factory),
            },
        }
    }

    /// POST the value to `path` and read the `auth` block of the response.
    #[must_use]
    pub fn login_at(self, path: impl Into<String>) -> AuthenticationSteps {
        self.request(HttpRequest::post(path))
            .login(|body| login_token_from_auth(body).map(Token::Login))
    }
}

#[derive(Clone)]
pub(crate) enum Terminal {
    Token(Token),
    Login { node: Node, factory: TokenFactory },
}

/// Complete, replayable description of how to obtain a token.
#[derive(Clone)]
pub struct AuthenticationSteps {
    backend: Arc<str>,
    self_lookup: bool,
    terminal: Terminal,
}

impl AuthenticationSteps {
    /// Steps yielding `token` without any I/O.
    #[must_use]
    pub fn just_token(token: impl Into<Token>) -> Self {
        Self {
            backend: Arc::from("token"),
            self_lookup: false,
            terminal: Terminal::Token(token.into()),
        }
    }

    /// Steps yielding `token` as a plain token.
    #[must_use]
    pub fn just(token: VaultToken) -> Self {
        Self::just_token(Token::Plain(token))
    }

    /// Name the authentication mechanism, used in login errors.
    #[must_use]
    pub fn named(mut self, backend: impl AsRef<str>) -> Self {
        self.backend = Arc::from(backend.as_ref());
        self
    }

    /// Look up the obtained token (`auth/token/lookup-self`) and replace it
    /// with a login token carrying the reported TTL and renewability.
    #[must_use]
    pub const fn with_self_lookup(mut self) -> Self {
        self.self_lookup = true;
        self
    }

    /// Mechanism name.
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Whether the token is looked up after login.
    #[must_use]
    pub const fn self_lookup(&self) -> bool {
        self.self_lookup
    }

    pub(crate) const fn terminal(&self) -> &Terminal {
        &self.terminal
    }
}

impl fmt::Debug for AuthenticationSteps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AuthenticationSteps");
        debug.field("backend", &self.backend);
        debug.field("self_lookup", &self.self_lookup);
        match &self.terminal {
            Terminal::Token(_) => debug.field("steps", &"Token"),
            Terminal::Login { node, .. } => debug.field("steps", node),
        };
        debug.finish()
    }
}

/// Self-lookup request authenticated with `token`.
pub(crate) fn lookup_self_request(token: &VaultToken) -> HttpRequest {
    HttpRequest::get(LOOKUP_SELF_PATH).with_token(token.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_building_does_not_evaluate_suppliers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let steps = StepChain::from_supplier(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!("jwt"))
        })
        .map(|jwt| json!({"jwt": jwt}))
        .login_at("auth/jwt/login");

        let _copy = steps.clone();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debug_describes_structure() {
        let steps = StepChain::just(json!({"role_id": "r"}))
            .zip_with(StepChain::from_http_request(HttpRequest::get("auth/approle/role/web/secret-id")))
            .login_at("auth/approle/login")
            .named("approle");

        let debug = format!("{steps:?}");
        assert!(debug.contains("approle"));
        assert!(debug.contains("Zip(Just, GET auth/approle/role/web/secret-id)"));
        assert!(debug.contains("POST auth/approle/login"));
    }

    #[test]
    fn test_just_token_backend() {
        let steps = AuthenticationSteps::just(VaultToken::new("s.static"));
        assert_eq!(steps.backend(), "token");
        assert!(matches!(steps.terminal(), Terminal::Token(t) if t.expose() == "s.static"));
        assert_eq!(steps.named("cubbyhole").backend(), "cubbyhole");
    }
}
