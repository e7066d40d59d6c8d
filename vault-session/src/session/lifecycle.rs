//! Lifecycle-aware session manager.
//!
//! State machine over `Empty`, `Authenticating`, `Valid` and `Renewing`.
//! Logins and renewals are single-flight: the task that moves the state out
//! of `Empty` or `Valid` installs a shared future, and every other caller
//! awaits that future instead of starting its own. Each flight also runs on
//! the scheduler's runtime, so it completes even when every caller awaiting
//! it goes away. Results are installed only if the session epoch is
//! unchanged, so an `invalidate` racing an in-flight login or renewal wins.

use super::{SessionEvent, SessionManager, SessionState, RENEW_SELF_PATH, REVOKE_SELF_PATH};
use crate::config::SessionSettings;
use crate::error::{VaultError, VaultResult};
use crate::events::EventPublisher;
use crate::response::token_renewal;
use crate::scheduler::{RenewalScheduler, ScheduledTask};
use crate::steps::{AuthenticationSteps, StepOperator};
use crate::token::{LoginToken, Token};
use crate::transport::{AsyncTransport, HttpRequest};
use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Clone)]
enum FlightOutcome {
    Installed(Token),
    Superseded,
    Failed(Arc<VaultError>),
}

type Flight = Shared<BoxFuture<'static, FlightOutcome>>;

enum State {
    Empty,
    Authenticating(Flight),
    Valid {
        token: Token,
        refresh_at: Option<Instant>,
        task: Option<ScheduledTask>,
    },
    Renewing {
        token: Token,
        flight: Flight,
    },
}

struct Session {
    state: State,
    epoch: u64,
}

struct Inner<T> {
    operator: StepOperator<T>,
    steps: AuthenticationSteps,
    scheduler: RenewalScheduler,
    settings: SessionSettings,
    session: Mutex<Session>,
    events: EventPublisher<SessionEvent>,
}

/// Session manager with background renewal and re-login fallback.
pub struct LifecycleAwareSessionManager<T> {
    inner: Arc<Inner<T>>,
}

impl<T: AsyncTransport + 'static> LifecycleAwareSessionManager<T> {
    /// Manager logging in with `steps` over `transport`, renewing on
    /// `scheduler`.
    pub fn new(
        steps: AuthenticationSteps,
        transport: T,
        scheduler: RenewalScheduler,
        settings: SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                operator: StepOperator::new(transport),
                steps,
                scheduler,
                settings,
                session: Mutex::new(Session {
                    state: State::Empty,
                    epoch: 0,
                }),
                events: EventPublisher::default(),
            }),
        }
    }

    /// Current token, logging in first if there is none.
    ///
    /// Concurrent callers share one login. While a renewal is in flight the
    /// still-valid token is returned; once renewal has fallen back to a
    /// login, callers wait for it.
    ///
    /// # Errors
    ///
    /// Returns `SessionUnavailable` wrapping the login failure.
    pub async fn session_token(&self) -> VaultResult<Token> {
        loop {
            let flight = {
                let mut session = self.inner.session.lock();
                let now = Instant::now();
                match &session.state {
                    State::Empty => self.inner.begin_login(&mut session),
                    State::Authenticating(flight) => flight.clone(),
                    State::Renewing { token, flight } => {
                        if !token_expired(token, now) {
                            return Ok(token.clone());
                        }
                        flight.clone()
                    }
                    State::Valid {
                        token,
                        refresh_at,
                        task,
                    } => {
                        let overdue = refresh_at.is_some_and(|at| at <= now);
                        if !(overdue && task.is_none()) && !token_expired(token, now) {
                            return Ok(token.clone());
                        }
                        debug!("Refreshing session token on access");
                        match self.inner.begin_refresh(&mut session) {
                            Some(flight) => flight,
                            None => continue,
                        }
                    }
                }
            };

            match flight.await {
                FlightOutcome::Installed(token) => return Ok(token),
                FlightOutcome::Superseded => {}
                FlightOutcome::Failed(error) => return Err(VaultError::SessionUnavailable(error)),
            }
        }
    }

    /// Drop the current token and cancel its scheduled renewal.
    ///
    /// The next [`session_token`](Self::session_token) logs in again. An
    /// in-flight login or renewal finishes but its result is discarded.
    pub fn invalidate(&self) {
        if let Some(token) = self.inner.reset() {
            info!(accessor = token.accessor().unwrap_or("-"), "Session token invalidated");
            self.inner.events.publish(SessionEvent::Revoked { token });
        }
    }

    /// Drop the current token and revoke it server-side if it came from a
    /// login. Revocation failures are logged.
    #[instrument(skip(self))]
    pub async fn destroy(&self) {
        let Some(token) = self.inner.reset() else {
            return;
        };
        if token.as_login().is_some() {
            let request = HttpRequest::post(REVOKE_SELF_PATH).with_token(token.value().clone());
            match self.inner.operator.transport().execute(&request).await {
                Ok(_) => info!(accessor = token.accessor().unwrap_or("-"), "Session token revoked"),
                Err(e) => warn!(error = %e, "Cannot revoke session token"),
            }
        }
        self.inner.events.publish(SessionEvent::Revoked { token });
    }

    /// Cached token without triggering a login.
    #[must_use]
    pub fn current_token(&self) -> Option<Token> {
        match &self.inner.session.lock().state {
            State::Valid { token, .. } | State::Renewing { token, .. } => Some(token.clone()),
            State::Empty | State::Authenticating(_) => None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match &self.inner.session.lock().state {
            State::Empty => SessionState::Empty,
            State::Authenticating(_) => SessionState::Authenticating,
            State::Valid { .. } => SessionState::Valid,
            State::Renewing { .. } => SessionState::Renewing,
        }
    }

    /// When the cached token is due for renewal or re-login.
    #[must_use]
    pub fn refresh_at(&self) -> Option<Instant> {
        match &self.inner.session.lock().state {
            State::Valid { refresh_at, .. } => *refresh_at,
            _ => None,
        }
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Register a synchronous event listener.
    pub fn add_listener(&self, listener: impl Fn(&SessionEvent) + Send + Sync + 'static) {
        self.inner.events.add_listener(listener);
    }
}

#[async_trait]
impl<T: AsyncTransport + 'static> SessionManager for LifecycleAwareSessionManager<T> {
    async fn session_token(&self) -> VaultResult<Token> {
        Self::session_token(self).await
    }
}

fn token_expired(token: &Token, now: Instant) -> bool {
    token.as_login().is_some_and(|login| login.is_expired(now))
}

impl<T: AsyncTransport + 'static> Inner<T> {
    /// Move to `Authenticating` with a new login flight.
    fn begin_login(self: &Arc<Self>, session: &mut Session) -> Flight {
        let epoch = session.epoch;
        let inner = Arc::clone(self);
        let flight = async move { inner.login(epoch).await }.boxed().shared();
        self.scheduler.detach("session-login", flight.clone().map(drop));
        session.state = State::Authenticating(flight.clone());
        flight
    }

    /// Leave `Valid` for `Renewing` (renewable login token) or
    /// `Authenticating` (anything else). `None` if the state is not `Valid`.
    fn begin_refresh(self: &Arc<Self>, session: &mut Session) -> Option<Flight> {
        let State::Valid { token, .. } = &session.state else {
            return None;
        };
        match token.as_login().filter(|login| login.is_renewable()).cloned() {
            Some(login) => {
                let epoch = session.epoch;
                let inner = Arc::clone(self);
                let flight = async move { inner.renew(epoch, login).await }.boxed().shared();
                self.scheduler.detach("session-renewal", flight.clone().map(drop));
                session.state = State::Renewing {
                    token: token.clone(),
                    flight: flight.clone(),
                };
                Some(flight)
            }
            None => {
                debug!("Session token is not renewable, logging in again");
                Some(self.begin_login(session))
            }
        }
    }

    async fn login(self: Arc<Self>, epoch: u64) -> FlightOutcome {
        let result = self.operator.login(&self.steps).await;

        let (outcome, event) = {
            let mut session = self.session.lock();
            if session.epoch != epoch {
                debug!("Discarding login result of invalidated session");
                return FlightOutcome::Superseded;
            }
            match result {
                Ok(token) => {
                    info!(
                        backend = self.steps.backend(),
                        accessor = token.accessor().unwrap_or("-"),
                        lease_secs = token.lease_duration().as_secs(),
                        renewable = token.is_renewable(),
                        "Logged in to Vault"
                    );
                    self.install(&mut session, token.clone());
                    (
                        FlightOutcome::Installed(token.clone()),
                        SessionEvent::AfterLogin { token },
                    )
                }
                Err(e) => {
                    warn!(backend = self.steps.backend(), error = %e, "Vault login failed");
                    session.state = State::Empty;
                    let error = Arc::new(e);
                    (
                        FlightOutcome::Failed(Arc::clone(&error)),
                        SessionEvent::LoginFailed { error },
                    )
                }
            }
        };
        self.events.publish(event);
        outcome
    }

    async fn renew(self: Arc<Self>, epoch: u64, login: LoginToken) -> FlightOutcome {
        let request = HttpRequest::post(RENEW_SELF_PATH).with_token(login.token().clone());
        let result = self
            .operator
            .transport()
            .execute(&request)
            .await
            .and_then(token_renewal);

        let (flight, failure) = {
            let mut session = self.session.lock();
            if session.epoch != epoch {
                debug!("Discarding renewal result of invalidated session");
                return FlightOutcome::Superseded;
            }
            match result {
                Ok((ttl, renewable)) if ttl > self.settings.expiry_threshold => {
                    let token = Token::Login(login.renewed(ttl, renewable));
                    debug!(
                        accessor = token.accessor().unwrap_or("-"),
                        lease_secs = ttl.as_secs(),
                        "Renewed session token"
                    );
                    self.install(&mut session, token.clone());
                    drop(session);
                    self.events.publish(SessionEvent::AfterRenewed {
                        token: token.clone(),
                    });
                    return FlightOutcome::Installed(token);
                }
                Ok((ttl, _)) => {
                    info!(lease_secs = ttl.as_secs(), "Session token reached its maximum TTL, logging in again");
                    (self.begin_login(&mut session), None)
                }
                Err(e) => {
                    warn!(error = %e, "Cannot renew session token, logging in again");
                    (self.begin_login(&mut session), Some(Arc::new(e)))
                }
            }
        };

        if let Some(error) = failure {
            self.events.publish(SessionEvent::RenewFailed {
                token: Token::Login(login),
                error,
            });
        }
        flight.await
    }

    /// Cache `token` as `Valid` and schedule its refresh.
    fn install(self: &Arc<Self>, session: &mut Session, token: Token) {
        session.epoch += 1;
        let epoch = session.epoch;

        let lease = token.lease_duration();
        let refresh_at = token
            .as_login()
            .filter(|_| !lease.is_zero())
            .map(|_| self.settings.trigger().next_execution(lease, Instant::now()));

        let task = refresh_at.and_then(|at| {
            let weak = Arc::downgrade(self);
            match self.scheduler.schedule("session-refresh", at, refresh_due(weak, epoch)) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(error = %e, "Cannot schedule session refresh, refreshing on access");
                    None
                }
            }
        });

        session.state = State::Valid {
            token,
            refresh_at,
            task,
        };
    }

    /// Move to `Empty`, returning the dropped token.
    fn reset(&self) -> Option<Token> {
        let mut session = self.session.lock();
        session.epoch += 1;
        match std::mem::replace(&mut session.state, State::Empty) {
            State::Valid { token, .. } | State::Renewing { token, .. } => Some(token),
            State::Empty | State::Authenticating(_) => None,
        }
    }
}

async fn refresh_due<T: AsyncTransport + 'static>(inner: Weak<Inner<T>>, epoch: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let flight = {
        let mut session = inner.session.lock();
        if session.epoch != epoch {
            return;
        }
        inner.begin_refresh(&mut session)
    };
    if let Some(flight) = flight {
        // Outcomes are published as events.
        let _ = flight.await;
    }
}
