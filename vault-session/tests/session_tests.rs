//! Session lifecycle against a scripted Vault on paused time.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::fixtures::{error_body, login_response, token_renewal_response};
use test_utils::{MockReply, MockTransport};
use tokio::sync::broadcast::Receiver;
use tokio::time::Instant;
use vault_session::auth::TokenAuthentication;
use vault_session::session::{RENEW_SELF_PATH, REVOKE_SELF_PATH};
use vault_session::{
    AuthMethod, AuthenticationSteps, LifecycleAwareSessionManager, Method, RenewalScheduler,
    SessionEvent, SessionSettings, SessionState, SimpleSessionManager, StepChain, VaultError,
};

const LOGIN_PATH: &str = "auth/userpass/login/alice";

fn userpass() -> AuthenticationSteps {
    StepChain::just(json!({"password": "wonderland"}))
        .login_at(LOGIN_PATH)
        .named("userpass")
}

fn manager(mock: &MockTransport) -> LifecycleAwareSessionManager<MockTransport> {
    manager_on(mock, RenewalScheduler::current().unwrap())
}

fn manager_on(
    mock: &MockTransport,
    scheduler: RenewalScheduler,
) -> LifecycleAwareSessionManager<MockTransport> {
    LifecycleAwareSessionManager::new(userpass(), mock.clone(), scheduler, SessionSettings::default())
}

fn drain(events: &mut Receiver<SessionEvent>) -> Vec<&'static str> {
    std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| match event {
            SessionEvent::AfterLogin { .. } => "after-login",
            SessionEvent::LoginFailed { .. } => "login-failed",
            SessionEvent::AfterRenewed { .. } => "after-renewed",
            SessionEvent::RenewFailed { .. } => "renew-failed",
            SessionEvent::Revoked { .. } => "revoked",
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_access_logs_in_once() {
    let mock = MockTransport::new();
    mock.set_delay(Duration::from_millis(50));
    mock.on(Method::Post, LOGIN_PATH, login_response("t1", true, 3600));

    let manager = Arc::new(manager(&mock));
    let callers: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.session_token().await })
        })
        .collect();

    for caller in callers {
        assert_eq!(caller.await.unwrap().unwrap().expose(), "t1");
    }
    assert_eq!(mock.calls(Method::Post, LOGIN_PATH), 1);
    assert_eq!(manager.state(), SessionState::Valid);
}

#[tokio::test(start_paused = true)]
async fn test_renewal_keeps_token_and_reschedules() {
    let mock = MockTransport::new();
    mock.on(Method::Post, LOGIN_PATH, login_response("t1", true, 10))
        .on(Method::Post, RENEW_SELF_PATH, token_renewal_response(true, 10));

    let manager = manager(&mock);
    let mut events = manager.subscribe();
    let start = Instant::now();

    let token = manager.session_token().await.unwrap();
    assert_eq!(token.expose(), "t1");
    assert_eq!(manager.refresh_at(), Some(start + Duration::from_secs(5)));

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(mock.calls(Method::Post, RENEW_SELF_PATH), 1);
    assert_eq!(manager.refresh_at(), Some(start + Duration::from_secs(10)));

    let renewed = manager.session_token().await.unwrap();
    assert_eq!(renewed.expose(), "t1");
    let login = renewed.as_login().unwrap();
    assert_eq!(login.lease_duration(), Duration::from_secs(10));
    assert!(login.is_renewable());
    assert_eq!(mock.calls(Method::Post, LOGIN_PATH), 1);

    let renew = mock
        .requests()
        .into_iter()
        .find(|r| r.path == RENEW_SELF_PATH)
        .unwrap();
    assert_eq!(renew.token.as_deref(), Some("t1"));
    assert_eq!(drain(&mut events), ["after-login", "after-renewed"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_renewal_logs_in_again_once() {
    let mock = MockTransport::new();
    mock.once(Method::Post, LOGIN_PATH, login_response("t1", true, 10))
        .on(Method::Post, LOGIN_PATH, login_response("t2", true, 3600))
        .on(
            Method::Post,
            RENEW_SELF_PATH,
            MockReply::Status(403, error_body("permission denied")),
        );

    let manager = manager(&mock);
    let mut events = manager.subscribe();
    assert_eq!(manager.session_token().await.unwrap().expose(), "t1");

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(mock.calls(Method::Post, RENEW_SELF_PATH), 1);
    assert_eq!(mock.calls(Method::Post, LOGIN_PATH), 2);
    assert_eq!(manager.session_token().await.unwrap().expose(), "t2");
    assert_eq!(drain(&mut events), ["after-login", "renew-failed", "after-login"]);
}

#[tokio::test(start_paused = true)]
async fn test_non_renewable_token_is_never_renewed() {
    let mock = MockTransport::new();
    mock.once(Method::Post, LOGIN_PATH, login_response("t1", false, 10))
        .on(Method::Post, LOGIN_PATH, login_response("t2", false, 3600));

    let manager = manager(&mock);
    assert_eq!(manager.session_token().await.unwrap().expose(), "t1");

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(mock.calls(Method::Post, RENEW_SELF_PATH), 0);
    assert_eq!(mock.calls(Method::Post, LOGIN_PATH), 2);
    assert_eq!(manager.session_token().await.unwrap().expose(), "t2");
}

#[tokio::test(start_paused = true)]
async fn test_max_ttl_reached_logs_in_again() {
    let mock = MockTransport::new();
    mock.once(Method::Post, LOGIN_PATH, login_response("t1", true, 10))
        .on(Method::Post, LOGIN_PATH, login_response("t2", true, 3600))
        .on(Method::Post, RENEW_SELF_PATH, token_renewal_response(true, 5));

    let manager = manager(&mock);
    manager.session_token().await.unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(mock.calls(Method::Post, RENEW_SELF_PATH), 1);
    assert_eq!(manager.current_token().unwrap().expose(), "t2");
}

#[tokio::test(start_paused = true)]
async fn test_missing_auth_fails_and_next_call_retries() {
    let mock = MockTransport::new();
    mock.once(Method::Post, LOGIN_PATH, json!({"data": {}}))
        .on(Method::Post, LOGIN_PATH, login_response("t1", true, 3600));

    let manager = manager(&mock);
    let mut events = manager.subscribe();

    let err = manager.session_token().await.unwrap_err();
    match err {
        VaultError::SessionUnavailable(cause) => {
            assert!(matches!(&*cause, VaultError::Login { backend, .. } if backend == "userpass"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(manager.state(), SessionState::Empty);
    assert!(manager.current_token().is_none());

    assert_eq!(manager.session_token().await.unwrap().expose(), "t1");
    assert_eq!(mock.calls(Method::Post, LOGIN_PATH), 2);
    assert_eq!(drain(&mut events), ["login-failed", "after-login"]);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_forces_login() {
    let mock = MockTransport::new();
    mock.once(Method::Post, LOGIN_PATH, login_response("t1", true, 3600))
        .on(Method::Post, LOGIN_PATH, login_response("t2", true, 3600));

    let manager = manager(&mock);
    let mut events = manager.subscribe();
    assert_eq!(manager.session_token().await.unwrap().expose(), "t1");

    manager.invalidate();
    assert_eq!(manager.state(), SessionState::Empty);
    assert_eq!(manager.session_token().await.unwrap().expose(), "t2");
    assert_eq!(drain(&mut events), ["after-login", "revoked", "after-login"]);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_discards_in_flight_login() {
    let mock = MockTransport::new();
    mock.set_delay(Duration::from_millis(100));
    mock.once(Method::Post, LOGIN_PATH, login_response("t1", true, 3600))
        .on(Method::Post, LOGIN_PATH, login_response("t2", true, 3600));

    let manager = Arc::new(manager(&mock));
    let caller = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.session_token().await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.state(), SessionState::Authenticating);
    manager.invalidate();

    assert_eq!(caller.await.unwrap().unwrap().expose(), "t2");
    assert_eq!(mock.calls(Method::Post, LOGIN_PATH), 2);
    assert_eq!(manager.current_token().unwrap().expose(), "t2");
}

#[tokio::test(start_paused = true)]
async fn test_refreshes_on_access_without_scheduler() {
    let mock = MockTransport::new();
    mock.on(Method::Post, LOGIN_PATH, login_response("t1", true, 10))
        .on(Method::Post, RENEW_SELF_PATH, token_renewal_response(true, 10));

    let scheduler = RenewalScheduler::current().unwrap();
    scheduler.shutdown();
    let manager = manager_on(&mock, scheduler);

    manager.session_token().await.unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(mock.calls(Method::Post, RENEW_SELF_PATH), 0);

    let token = manager.session_token().await.unwrap();
    assert_eq!(token.expose(), "t1");
    assert_eq!(mock.calls(Method::Post, RENEW_SELF_PATH), 1);
    assert_eq!(mock.calls(Method::Post, LOGIN_PATH), 1);
}

#[tokio::test(start_paused = true)]
async fn test_renewal_completes_after_caller_goes_away() {
    let mock = MockTransport::new();
    mock.set_delay(Duration::from_millis(100));
    mock.on(Method::Post, LOGIN_PATH, login_response("t1", true, 10))
        .on(Method::Post, RENEW_SELF_PATH, token_renewal_response(true, 10));

    let scheduler = RenewalScheduler::current().unwrap();
    scheduler.shutdown();
    let manager = manager_on(&mock, scheduler);
    let mut events = manager.subscribe();
    manager.session_token().await.unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;
    let abandoned = tokio::time::timeout(Duration::from_millis(10), manager.session_token()).await;
    assert!(abandoned.is_err());
    assert_eq!(manager.state(), SessionState::Renewing);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(manager.state(), SessionState::Valid);
    assert_eq!(mock.calls(Method::Post, RENEW_SELF_PATH), 1);
    assert_eq!(manager.session_token().await.unwrap().expose(), "t1");
    assert_eq!(drain(&mut events), ["after-login", "after-renewed"]);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_discards_in_flight_renewal() {
    let mock = MockTransport::new();
    mock.once(Method::Post, LOGIN_PATH, login_response("t1", true, 10))
        .on(Method::Post, LOGIN_PATH, login_response("t2", true, 3600))
        .on(Method::Post, RENEW_SELF_PATH, token_renewal_response(true, 3600));

    let manager = manager(&mock);
    let mut events = manager.subscribe();
    assert_eq!(manager.session_token().await.unwrap().expose(), "t1");

    // Renewal starts at 5s and answers at 7s.
    mock.set_delay(Duration::from_secs(2));
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(manager.state(), SessionState::Renewing);
    manager.invalidate();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mock.calls(Method::Post, RENEW_SELF_PATH), 1);
    assert_eq!(manager.state(), SessionState::Empty);
    assert!(manager.current_token().is_none());

    assert_eq!(manager.session_token().await.unwrap().expose(), "t2");
    assert_eq!(mock.calls(Method::Post, LOGIN_PATH), 2);
    assert_eq!(drain(&mut events), ["after-login", "revoked", "after-login"]);
}

#[tokio::test(start_paused = true)]
async fn test_plain_token_is_not_scheduled() {
    let mock = MockTransport::new();
    let steps = AuthMethod::Token(TokenAuthentication::new("s.static")).steps();
    let manager = LifecycleAwareSessionManager::new(
        steps,
        mock.clone(),
        RenewalScheduler::current().unwrap(),
        SessionSettings::default(),
    );

    assert_eq!(manager.session_token().await.unwrap().expose(), "s.static");
    assert_eq!(manager.refresh_at(), None);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(mock.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_destroy_revokes_token() {
    let mock = MockTransport::new();
    mock.on(Method::Post, LOGIN_PATH, login_response("t1", true, 3600))
        .on(Method::Post, REVOKE_SELF_PATH, json!(null));

    let manager = manager(&mock);
    let mut events = manager.subscribe();
    manager.session_token().await.unwrap();

    manager.destroy().await;

    let revoke = mock
        .requests()
        .into_iter()
        .find(|r| r.path == REVOKE_SELF_PATH)
        .unwrap();
    assert_eq!(revoke.token.as_deref(), Some("t1"));
    assert_eq!(manager.state(), SessionState::Empty);
    assert_eq!(drain(&mut events), ["after-login", "revoked"]);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(mock.calls(Method::Post, RENEW_SELF_PATH), 0);
}

#[test]
fn test_simple_manager_caches_token() {
    let mock = MockTransport::new();
    mock.once(Method::Post, LOGIN_PATH, login_response("t1", true, 3600))
        .on(Method::Post, LOGIN_PATH, login_response("t2", true, 3600));

    let manager = SimpleSessionManager::new(userpass(), mock.clone());
    assert_eq!(manager.session_token().unwrap().expose(), "t1");
    assert_eq!(manager.session_token().unwrap().expose(), "t1");
    assert_eq!(mock.calls(Method::Post, LOGIN_PATH), 1);

    manager.invalidate();
    assert_eq!(manager.session_token().unwrap().expose(), "t2");
}

#[test]
fn test_simple_manager_wraps_login_failure() {
    let mock = MockTransport::new();
    let manager = SimpleSessionManager::new(userpass(), mock);
    let err = manager.session_token().unwrap_err();
    assert!(matches!(err, VaultError::SessionUnavailable(_)));
}
