//! Vault session and secret lease lifecycle for Auth Platform.
//!
//! Logins are described as [`AuthenticationSteps`] and run by a blocking
//! ([`StepExecutor`]) or async ([`StepOperator`]) interpreter. The
//! [`LifecycleAwareSessionManager`] caches the resulting token and renews it
//! in the background; the [`SecretLeaseContainer`] does the same for leased
//! secrets.

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod lease;
pub mod response;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod steps;
pub mod telemetry;
pub mod token;
pub mod transport;
pub mod trigger;

pub use auth::{AuthConfig, AuthMethod, AuthRegistry, CredentialSupplier};
pub use config::{HttpSettings, LeaseSettings, SessionSettings, VaultConfig};
pub use endpoint::VaultEndpoint;
pub use error::{VaultError, VaultResult};
pub use lease::{Lease, Mode, RequestedSecret, SecretBody, SecretLeaseContainer, SecretLeaseEvent};
pub use scheduler::{RenewalScheduler, ScheduledTask};
pub use session::{
    LifecycleAwareSessionManager, SessionEvent, SessionManager, SessionState, SimpleSessionManager,
};
pub use steps::{AuthenticationSteps, StepChain, StepExecutor, StepOperator};
pub use token::{LoginToken, Token, VaultToken};
pub use transport::{
    AsyncTransport, BlockingReqwestTransport, BlockingTransport, HttpRequest, Method,
    ReqwestTransport,
};
pub use trigger::FixedTimeoutRefreshTrigger;
