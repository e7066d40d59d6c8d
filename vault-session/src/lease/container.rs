//! Lease renewal for many independent secrets.
//!
//! Every registered secret owns an entry with its own lock. Scheduled work
//! carries the entry generation it was scheduled for; the generation moves
//! on every reschedule, rotation, expiry and unregistration, so work that
//! wakes up for an outdated generation does nothing and results of work that
//! was overtaken are discarded.

use super::{Lease, LeaseAction, Mode, RequestedSecret, SecretBody};
use crate::config::LeaseSettings;
use crate::error::{VaultError, VaultResult};
use crate::events::EventPublisher;
use crate::response::{lease_renewal, VaultResponse};
use crate::scheduler::{RenewalScheduler, ScheduledTask};
use crate::session::SessionManager;
use crate::transport::{AsyncTransport, HttpRequest};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Lease lifecycle notification.
#[derive(Debug, Clone)]
pub enum SecretLeaseEvent {
    /// A secret was fetched on registration.
    Created {
        /// Secret
        requested: RequestedSecret,
        /// Initial lease
        lease: Lease,
        /// Secret payload
        body: SecretBody,
    },
    /// A lease was extended.
    Renewed {
        /// Secret
        requested: RequestedSecret,
        /// Renewed lease
        lease: Lease,
    },
    /// A new secret value replaced the previous one.
    Rotated {
        /// Secret
        requested: RequestedSecret,
        /// Lease of the replaced value
        previous: Lease,
        /// Lease of the new value
        lease: Lease,
        /// New payload
        body: SecretBody,
    },
    /// The lease ran out and the secret is no longer registered.
    Expired {
        /// Secret
        requested: RequestedSecret,
        /// Last known lease
        lease: Lease,
    },
    /// The secret was unregistered and its lease revoked.
    Revoked {
        /// Secret
        requested: RequestedSecret,
        /// Revoked lease
        lease: Lease,
    },
    /// Renewal or rotation failed.
    Error {
        /// Secret
        requested: RequestedSecret,
        /// Cause
        error: Arc<VaultError>,
        /// Consecutive failures so far
        attempt: u32,
    },
}

impl SecretLeaseEvent {
    /// Secret the event refers to.
    #[must_use]
    pub const fn requested(&self) -> &RequestedSecret {
        match self {
            Self::Created { requested, .. }
            | Self::Renewed { requested, .. }
            | Self::Rotated { requested, .. }
            | Self::Expired { requested, .. }
            | Self::Revoked { requested, .. }
            | Self::Error { requested, .. } => requested,
        }
    }
}

struct EntryState {
    lease: Lease,
    body: SecretBody,
    generation: u64,
    renewing: bool,
    rotate_pending: bool,
    attempts: u32,
    task: Option<ScheduledTask>,
}

struct LeaseEntry {
    requested: RequestedSecret,
    state: Mutex<EntryState>,
}

/// What a claimed entry does next.
enum Step {
    Renew(Lease),
    Rotate,
    Expire,
    Done,
}

struct ContainerInner<T> {
    transport: T,
    session: Arc<dyn SessionManager>,
    scheduler: RenewalScheduler,
    settings: LeaseSettings,
    entries: RwLock<HashMap<RequestedSecret, Arc<LeaseEntry>>>,
    events: EventPublisher<SecretLeaseEvent>,
}

/// Fetches leased secrets and keeps their leases alive.
pub struct SecretLeaseContainer<T> {
    inner: Arc<ContainerInner<T>>,
}

impl<T: AsyncTransport + 'static> SecretLeaseContainer<T> {
    /// Container reading secrets over `transport` with tokens from `session`.
    pub fn new(
        transport: T,
        session: Arc<dyn SessionManager>,
        scheduler: RenewalScheduler,
        settings: LeaseSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                transport,
                session,
                scheduler,
                settings,
                entries: RwLock::new(HashMap::new()),
                events: EventPublisher::default(),
            }),
        }
    }

    /// Fetch `requested` and keep its lease alive.
    ///
    /// Registering a secret twice returns the lease of the first
    /// registration.
    ///
    /// # Errors
    ///
    /// Fails if no session token is available, the read fails or the
    /// response has no `data`.
    #[instrument(skip(self, requested), fields(path = requested.path()))]
    pub async fn register(&self, requested: RequestedSecret) -> VaultResult<Lease> {
        if let Some(entry) = self.inner.entry(&requested) {
            return Ok(entry.state.lock().lease.clone());
        }

        let (lease, body) = self.inner.fetch(&requested).await?;
        let entry = Arc::new(LeaseEntry {
            requested: requested.clone(),
            state: Mutex::new(EntryState {
                lease: lease.clone(),
                body: body.clone(),
                generation: 0,
                renewing: false,
                rotate_pending: false,
                attempts: 0,
                task: None,
            }),
        });

        let existing = {
            let mut entries = self.inner.entries.write();
            match entries.get(&requested) {
                Some(existing) => Some(Arc::clone(existing)),
                None => {
                    entries.insert(requested.clone(), Arc::clone(&entry));
                    None
                }
            }
        };
        if let Some(existing) = existing {
            debug!("Secret registered concurrently, revoking duplicate lease");
            if let Err(e) = self.inner.revoke(&lease).await {
                warn!(error = %e, "Cannot revoke duplicate lease");
            }
            return Ok(existing.state.lock().lease.clone());
        }

        {
            let mut state = entry.state.lock();
            let at = self.inner.next_check(&requested, &state.lease);
            self.inner.reschedule(&requested, &mut state, at);
        }
        info!(
            lease_id = lease.lease_id().unwrap_or("-"),
            lease_secs = lease.lease_duration().as_secs(),
            renewable = lease.is_renewable(),
            "Registered secret"
        );
        self.inner.events.publish(SecretLeaseEvent::Created {
            requested,
            lease: lease.clone(),
            body,
        });
        Ok(lease)
    }

    /// Stop renewing `requested` and revoke its lease.
    ///
    /// Returns `false` if the secret was not registered. Revocation failures
    /// are logged.
    #[instrument(skip(self, requested), fields(path = requested.path()))]
    pub async fn unregister(&self, requested: &RequestedSecret) -> bool {
        let Some(entry) = self.inner.entries.write().remove(requested) else {
            return false;
        };
        self.inner.retire(&entry).await;
        true
    }

    /// Fetch a new value for `requested` right away.
    ///
    /// # Errors
    ///
    /// Returns `SecretNotFound` if the secret is not registered, or the
    /// fetch error. A failed fetch keeps the current value and schedule.
    #[instrument(skip(self, requested), fields(path = requested.path()))]
    pub async fn rotate(&self, requested: &RequestedSecret) -> VaultResult<Lease> {
        let entry = self
            .inner
            .entry(requested)
            .ok_or_else(|| VaultError::not_found(requested.path()))?;

        let generation = {
            let mut state = entry.state.lock();
            state.generation += 1;
            state.task = None;
            state.renewing = true;
            state.rotate_pending = false;
            state.generation
        };

        match self.inner.fetch(requested).await {
            Ok((lease, body)) => {
                self.inner.commit_rotation(&entry, generation, lease.clone(), body);
                Ok(lease)
            }
            Err(e) => {
                let mut state = entry.state.lock();
                if state.generation == generation {
                    let at = self.inner.next_check(requested, &state.lease);
                    self.inner.reschedule(requested, &mut state, at);
                }
                Err(e)
            }
        }
    }

    /// Current lease and payload of `requested`.
    #[must_use]
    pub fn current(&self, requested: &RequestedSecret) -> Option<(Lease, SecretBody)> {
        self.inner.entry(requested).map(|entry| {
            let state = entry.state.lock();
            (state.lease.clone(), state.body.clone())
        })
    }

    /// Whether `requested` is registered.
    #[must_use]
    pub fn contains(&self, requested: &RequestedSecret) -> bool {
        self.inner.entries.read().contains_key(requested)
    }

    /// Number of registered secrets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether no secret is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Unregister every secret, revoking their leases.
    pub async fn destroy(&self) {
        let entries: Vec<_> = self.inner.entries.write().drain().map(|(_, e)| e).collect();
        info!(count = entries.len(), "Revoking registered secrets");
        for entry in entries {
            self.inner.retire(&entry).await;
        }
    }

    /// Subscribe to lease events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SecretLeaseEvent> {
        self.inner.events.subscribe()
    }

    /// Register a synchronous event listener.
    pub fn add_listener(&self, listener: impl Fn(&SecretLeaseEvent) + Send + Sync + 'static) {
        self.inner.events.add_listener(listener);
    }
}

impl<T: AsyncTransport + 'static> ContainerInner<T> {
    fn entry(&self, requested: &RequestedSecret) -> Option<Arc<LeaseEntry>> {
        self.entries.read().get(requested).cloned()
    }

    async fn fetch(&self, requested: &RequestedSecret) -> VaultResult<(Lease, SecretBody)> {
        let token = self.session.session_token().await?;
        let request = HttpRequest::get(requested.path()).with_token(token.value().clone());
        let response = VaultResponse::parse(self.transport.execute(&request).await?)?;
        let data = response.required_data()?.clone();
        Ok((response.lease(), SecretBody::new(data)))
    }

    async fn renew_lease(&self, lease: &Lease) -> VaultResult<Lease> {
        let lease_id = lease
            .lease_id()
            .ok_or_else(|| VaultError::LeaseRenewalFailed("lease has no id".to_string()))?;
        let token = self.session.session_token().await?;
        let request = HttpRequest::put(self.settings.endpoints.renew_path())
            .with_token(token.value().clone())
            .with_body(json!({
                "lease_id": lease_id,
                "increment": lease.lease_duration().as_secs(),
            }));
        lease_renewal(lease_id, self.transport.execute(&request).await?)
    }

    async fn revoke(&self, lease: &Lease) -> VaultResult<()> {
        let Some(lease_id) = lease.lease_id() else {
            return Ok(());
        };
        let token = self.session.session_token().await?;
        let request = HttpRequest::put(self.settings.endpoints.revoke_path())
            .with_token(token.value().clone())
            .with_body(json!({ "lease_id": lease_id }));
        self.transport.execute(&request).await.map(|_| ())
    }

    /// Invalidate a removed entry, revoke its lease and publish `Revoked`.
    async fn retire(&self, entry: &LeaseEntry) {
        let lease = {
            let mut state = entry.state.lock();
            state.generation += 1;
            state.task = None;
            state.lease.clone()
        };
        match self.revoke(&lease).await {
            Ok(()) => debug!(path = entry.requested.path(), "Revoked lease"),
            Err(e) => warn!(path = entry.requested.path(), error = %e, "Cannot revoke lease"),
        }
        self.events.publish(SecretLeaseEvent::Revoked {
            requested: entry.requested.clone(),
            lease,
        });
    }

    /// When to look at `lease` next, `None` if it needs no attention.
    fn next_check(&self, requested: &RequestedSecret, lease: &Lease) -> Option<Instant> {
        lease.next_action(requested.mode()).map(|_| {
            self.settings
                .trigger()
                .next_execution(lease.lease_duration(), Instant::now())
        })
    }

    /// Release the claim and schedule the entry's next check at `at`.
    fn reschedule(
        self: &Arc<Self>,
        requested: &RequestedSecret,
        state: &mut EntryState,
        at: Option<Instant>,
    ) {
        state.generation += 1;
        state.renewing = false;
        let generation = state.generation;
        state.task = at.and_then(|at| {
            let weak = Arc::downgrade(self);
            match self
                .scheduler
                .schedule("lease-renewal", at, due(weak, requested.clone(), generation))
            {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(path = requested.path(), error = %e, "Cannot schedule lease renewal");
                    None
                }
            }
        });
    }

    /// Step after the lease can no longer be renewed.
    const fn after_expiry(mode: Mode) -> Step {
        match mode {
            Mode::Rotate => Step::Rotate,
            Mode::Renew => Step::Expire,
        }
    }

    async fn renew(self: &Arc<Self>, entry: &LeaseEntry, generation: u64, lease: Lease) -> Step {
        let requested = &entry.requested;
        match self.renew_lease(&lease).await {
            Ok(renewed) if renewed.lease_duration() > self.settings.min_renewal => {
                {
                    let mut state = entry.state.lock();
                    if state.generation != generation {
                        return Step::Done;
                    }
                    state.lease = renewed.clone();
                    state.attempts = 0;
                    let at = self.next_check(requested, &renewed);
                    self.reschedule(requested, &mut state, at);
                }
                debug!(
                    path = requested.path(),
                    lease_secs = renewed.lease_duration().as_secs(),
                    "Renewed lease"
                );
                self.events.publish(SecretLeaseEvent::Renewed {
                    requested: requested.clone(),
                    lease: renewed,
                });
                Step::Done
            }
            Ok(renewed) => {
                info!(
                    path = requested.path(),
                    lease_secs = renewed.lease_duration().as_secs(),
                    "Lease reached its maximum TTL"
                );
                Self::after_expiry(requested.mode())
            }
            Err(e) => self.failed(entry, generation, e, false),
        }
    }

    async fn rotate(self: &Arc<Self>, entry: &LeaseEntry, generation: u64) -> Step {
        match self.fetch(&entry.requested).await {
            Ok((lease, body)) => {
                self.commit_rotation(entry, generation, lease, body);
                Step::Done
            }
            Err(e) => self.failed(entry, generation, e, true),
        }
    }

    fn commit_rotation(
        self: &Arc<Self>,
        entry: &LeaseEntry,
        generation: u64,
        lease: Lease,
        body: SecretBody,
    ) {
        let requested = &entry.requested;
        let previous = {
            let mut state = entry.state.lock();
            if state.generation != generation {
                return;
            }
            let previous = std::mem::replace(&mut state.lease, lease.clone());
            state.body = body.clone();
            state.attempts = 0;
            state.rotate_pending = false;
            let at = self.next_check(requested, &lease);
            self.reschedule(requested, &mut state, at);
            previous
        };
        info!(
            path = requested.path(),
            lease_id = lease.lease_id().unwrap_or("-"),
            "Rotated secret"
        );
        self.events.publish(SecretLeaseEvent::Rotated {
            requested: requested.clone(),
            previous,
            lease,
            body,
        });
    }

    /// Record a failure and either schedule a re-check or give up.
    fn failed(
        self: &Arc<Self>,
        entry: &LeaseEntry,
        generation: u64,
        error: VaultError,
        rotating: bool,
    ) -> Step {
        let requested = &entry.requested;
        let error = Arc::new(error);
        let (attempt, retry) = {
            let mut state = entry.state.lock();
            if state.generation != generation {
                return Step::Done;
            }
            state.attempts += 1;
            let attempt = state.attempts;
            let retry = error.is_retryable() && attempt <= self.settings.renewal_retry_limit;
            if retry {
                state.rotate_pending = rotating;
                let recheck = state
                    .lease
                    .lease_duration()
                    .min(self.settings.expiry_threshold);
                let at = self.settings.trigger().next_execution(recheck, Instant::now());
                self.reschedule(requested, &mut state, Some(at));
            }
            (attempt, retry)
        };

        warn!(path = requested.path(), attempt, retry, error = %error, "Lease refresh failed");
        self.events.publish(SecretLeaseEvent::Error {
            requested: requested.clone(),
            error,
            attempt,
        });

        match (retry, rotating) {
            (true, _) => Step::Done,
            (false, true) => Step::Expire,
            (false, false) => Self::after_expiry(requested.mode()),
        }
    }

    /// Drop the entry from the registry and publish `Expired`.
    fn expire(&self, entry: &Arc<LeaseEntry>, generation: u64) {
        let lease = {
            let mut state = entry.state.lock();
            if state.generation != generation {
                return;
            }
            state.generation += 1;
            state.renewing = false;
            state.task = None;
            state.lease.clone()
        };
        {
            let mut entries = self.entries.write();
            if entries
                .get(&entry.requested)
                .is_some_and(|current| Arc::ptr_eq(current, entry))
            {
                entries.remove(&entry.requested);
            }
        }
        info!(path = entry.requested.path(), "Lease expired");
        self.events.publish(SecretLeaseEvent::Expired {
            requested: entry.requested.clone(),
            lease,
        });
    }
}

async fn due<T: AsyncTransport + 'static>(
    inner: Weak<ContainerInner<T>>,
    requested: RequestedSecret,
    generation: u64,
) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let Some(entry) = inner.entry(&requested) else {
        return;
    };

    let mut step = {
        let mut state = entry.state.lock();
        if state.generation != generation || state.renewing {
            return;
        }
        let action = if state.rotate_pending {
            Some(LeaseAction::Rotate)
        } else {
            state.lease.next_action(requested.mode())
        };
        match action {
            Some(LeaseAction::Renew) => {
                state.renewing = true;
                Step::Renew(state.lease.clone())
            }
            Some(LeaseAction::Rotate) => {
                state.renewing = true;
                Step::Rotate
            }
            None => return,
        }
    };

    loop {
        step = match step {
            Step::Renew(lease) => inner.renew(&entry, generation, lease).await,
            Step::Rotate => inner.rotate(&entry, generation).await,
            Step::Expire => {
                inner.expire(&entry, generation);
                Step::Done
            }
            Step::Done => return,
        };
    }
}
