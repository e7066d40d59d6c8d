//! Shared proptest generators for vault-session types.

use proptest::prelude::*;
use std::time::Duration;
use vault_session::lease::{Lease, Mode, RequestedSecret};

/// Generate token values in Vault's service token shape.
pub fn token_value_strategy() -> impl Strategy<Value = String> {
    "(hvs|s)\\.[A-Za-z0-9]{24}"
}

/// Generate lease durations from zero to one day.
pub fn lease_duration_strategy() -> impl Strategy<Value = Duration> {
    (0u64..=86_400).prop_map(Duration::from_secs)
}

/// Generate refresh timeouts between one second and one hour.
pub fn refresh_timeout_strategy() -> impl Strategy<Value = Duration> {
    (1u64..=3600).prop_map(Duration::from_secs)
}

/// Generate secret paths such as `database/creds/readonly`.
pub fn secret_path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{3,10}".prop_map(|role| format!("database/creds/{role}")),
        "[a-z]{3,10}".prop_map(|role| format!("aws/creds/{role}")),
        ("[a-z]{3,8}", "[a-z]{3,8}").prop_map(|(mount, key)| format!("{mount}/data/{key}")),
    ]
}

/// Generate lease modes.
pub fn mode_strategy() -> impl Strategy<Value = Mode> {
    prop_oneof![Just(Mode::Renew), Just(Mode::Rotate)]
}

/// Generate requested secrets.
pub fn requested_secret_strategy() -> impl Strategy<Value = RequestedSecret> {
    (secret_path_strategy(), mode_strategy()).prop_map(|(path, mode)| RequestedSecret::new(path, mode))
}

/// Generate leases, including the "not leased" sentinel.
pub fn lease_strategy() -> impl Strategy<Value = Lease> {
    prop_oneof![
        Just(Lease::none()),
        lease_duration_strategy().prop_map(Lease::from_time_to_live),
        ("[a-z]{4,8}/creds/[a-z]{4}/[A-Za-z0-9]{12}", lease_duration_strategy(), any::<bool>())
            .prop_map(|(id, duration, renewable)| Lease::of(id, duration, renewable)),
    ]
}
