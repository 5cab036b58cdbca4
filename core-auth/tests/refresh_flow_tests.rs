//! End-to-end tests for authenticated requests and token refresh.
//!
//! This suite verifies:
//! - Bearer token attachment and removal on sign-out
//! - Refresh and single replay on 401
//! - Coalescing of concurrent 401s into one refresh
//! - Session teardown when the refresh fails
//! - Timeouts surfacing without touching the session

mod common;

use common::{client, session, FakeBackend, RefreshReply};
use core_auth::{AuthError, RefreshStatus, RequestOptions};
use core_runtime::events::{AuthEvent, CoreEvent, Receiver};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_bearer_header_tracks_current_token() {
    let c = client(FakeBackend::new("T1", RefreshReply::Issue("T2")));
    c.manager.credential_store().save(&session("T1")).await.unwrap();

    let _: Value = c.manager.transport().get("/clubs").await.unwrap();
    assert_eq!(
        c.backend.seen("/clubs")[0].authorization.as_deref(),
        Some("Bearer T1")
    );

    c.manager.credential_store().clear().await.unwrap();
    let err = c.manager.transport().get::<Value>("/clubs").await.unwrap_err();

    assert_eq!(c.backend.seen("/clubs")[1].authorization, None);
    assert_eq!(err, AuthError::AuthenticationFailed("Token expired".into()));
    assert_eq!(c.backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_refresh_replays_with_new_token() {
    let c = client(FakeBackend::new("T2", RefreshReply::Issue("T2")));
    c.manager.credential_store().save(&session("T1")).await.unwrap();

    let clubs: Value = c.manager.transport().get("/clubs").await.unwrap();
    assert_eq!(clubs[0]["name"], "Hiking");

    let seen = c.backend.seen("/clubs");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer T1"));
    assert_eq!(seen[1].authorization.as_deref(), Some("Bearer T2"));

    let refresh = &c.backend.seen("/refresh-token")[0];
    assert_eq!(refresh.authorization, None);
    assert_eq!(refresh.body.as_ref().unwrap()["refreshToken"], "R1");

    let _: Value = c.manager.transport().get("/clubs").await.unwrap();
    assert_eq!(
        c.backend.seen("/clubs")[2].authorization.as_deref(),
        Some("Bearer T2")
    );

    let stored = c.manager.session().await.unwrap();
    assert_eq!(stored.tokens.access_token, "T2");
    assert_eq!(stored.tokens.refresh_token, "R1");
    assert_eq!(c.backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_second_401_is_terminal() {
    let c = client(FakeBackend::new("T2", RefreshReply::Issue("T2")).rejecting_everything());
    c.manager.credential_store().save(&session("T1")).await.unwrap();

    let err = c.manager.transport().get::<Value>("/clubs").await.unwrap_err();

    assert_eq!(err, AuthError::AuthenticationFailed("Token expired".into()));
    assert!(err.is_terminal());
    assert_eq!(c.backend.refresh_calls(), 1);
    assert_eq!(c.backend.seen("/clubs").len(), 2);
}

#[tokio::test]
async fn test_refresh_failure_ends_session() {
    let c = client(FakeBackend::new(
        "T2",
        RefreshReply::Reject(401, "Refresh token expired"),
    ));
    c.manager.credential_store().save(&session("T1")).await.unwrap();
    let mut events = c.events.subscribe();

    let err = c.manager.transport().get::<Value>("/clubs").await.unwrap_err();

    assert_eq!(
        err,
        AuthError::AuthenticationFailed("Refresh token expired".into())
    );
    c.manager.credential_store().invalidate_cache().await;
    assert!(c.manager.credential_store().load().await.is_none());
    assert_eq!(c.navigator.current().as_deref(), Some("/login"));
    assert!(matches!(
        c.manager.refresh_coordinator().status().await,
        RefreshStatus::Failed(_)
    ));

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::TokenRefreshing)
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::SessionExpired {
            reason: "Refresh token expired".into()
        })
    );
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let c = client(FakeBackend::new("T2", RefreshReply::Issue("T2")));
    c.manager.credential_store().save(&session("T1")).await.unwrap();
    let transport = c.manager.transport();

    let (first, second) = tokio::join!(
        transport.get::<Value>("/clubs"),
        transport.get::<Value>("/clubs")
    );

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(c.backend.refresh_calls(), 1);

    let replays: Vec<_> = c
        .backend
        .seen("/clubs")
        .into_iter()
        .filter_map(|seen| seen.authorization)
        .filter(|auth| auth == "Bearer T2")
        .collect();
    assert_eq!(replays.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_401s_on_multithreaded_runtime() {
    let c = client(FakeBackend::new("T2", RefreshReply::Issue("T2")));
    c.manager.credential_store().save(&session("T1")).await.unwrap();
    let manager = std::sync::Arc::new(c.manager);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.transport().get::<Value>("/clubs").await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(c.backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_timeout_does_not_refresh() {
    let c = client(FakeBackend::new("T1", RefreshReply::Issue("T2")));
    c.manager.credential_store().save(&session("T1")).await.unwrap();

    let err = c.manager.transport().get::<Value>("/slow").await.unwrap_err();

    assert!(matches!(err, AuthError::Timeout(_)));
    assert!(!err.is_terminal());
    assert_eq!(c.backend.refresh_calls(), 0);
    assert!(c.manager.is_logged_in().await);
}

#[tokio::test]
async fn test_refresh_disabled_request_fails_without_refresh() {
    let c = client(FakeBackend::new("T2", RefreshReply::Issue("T2")));
    c.manager.credential_store().save(&session("T1")).await.unwrap();

    let err = c
        .manager
        .transport()
        .request::<(), Value>(
            bridge_traits::http::HttpMethod::Get,
            "/clubs",
            None,
            RequestOptions::without_refresh(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::AuthenticationFailed(_)));
    assert_eq!(c.backend.refresh_calls(), 0);
}

#[tokio::test]
async fn test_login_after_failed_refresh_resets_coordinator() {
    let c = client(FakeBackend::new(
        "T2",
        RefreshReply::Reject(401, "Refresh token expired"),
    ));
    c.manager.credential_store().save(&session("T1")).await.unwrap();
    assert!(c.manager.transport().get::<Value>("/clubs").await.is_err());
    assert!(matches!(
        c.manager.refresh_coordinator().status().await,
        RefreshStatus::Failed(_)
    ));

    let user = c.manager.login("jung@club.io", "pw").await.unwrap();
    assert_eq!(user.id, Some(6));
    assert_eq!(c.manager.refresh_coordinator().status().await, RefreshStatus::Idle);

    let clubs: Value = c.manager.transport().get("/clubs").await.unwrap();
    assert!(clubs.is_array());
}

#[tokio::test]
async fn test_oauth_after_failed_refresh_resets_coordinator() {
    let c = client(FakeBackend::new(
        "T2",
        RefreshReply::Reject(401, "Refresh token expired"),
    ));
    c.manager.credential_store().save(&session("T1")).await.unwrap();
    assert!(c.manager.transport().get::<Value>("/clubs").await.is_err());

    c.manager
        .complete_oauth("/oauth/callback/kakao?code=K-7&state=st")
        .await
        .unwrap();

    assert_eq!(c.manager.refresh_coordinator().status().await, RefreshStatus::Idle);
    let clubs: Value = c.manager.transport().get("/clubs").await.unwrap();
    assert!(clubs.is_array());
    assert_eq!(c.navigator.current().as_deref(), Some("/"));
}

#[tokio::test]
async fn test_logout_during_refresh_abandons_request() {
    let c = client(
        FakeBackend::new("T2", RefreshReply::Issue("T2"))
            .with_refresh_delay(Duration::from_millis(100)),
    );
    c.manager.credential_store().save(&session("T1")).await.unwrap();
    let mut events = c.events.subscribe();
    let manager = Arc::new(c.manager);

    let request = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.transport().get::<Value>("/clubs").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.logout().await.unwrap();

    let err = request.await.unwrap().unwrap_err();

    assert_eq!(err, AuthError::NotAuthenticated);
    assert_eq!(c.backend.refresh_calls(), 1);
    assert_eq!(c.backend.seen("/clubs").len(), 1);

    manager.credential_store().invalidate_cache().await;
    assert!(manager.credential_store().load().await.is_none());
    assert_eq!(manager.refresh_coordinator().status().await, RefreshStatus::Idle);
    assert_eq!(c.navigator.current().as_deref(), Some("/login"));
    assert!(!drain(&mut events).iter().any(|event| matches!(
        event,
        CoreEvent::Auth(AuthEvent::SessionExpired { .. } | AuthEvent::TokenRefreshed)
    )));
}

#[tokio::test]
async fn test_refresh_failure_after_new_login_keeps_new_session() {
    let c = client(
        FakeBackend::new("T2", RefreshReply::Reject(401, "Refresh token expired"))
            .with_refresh_delay(Duration::from_millis(100)),
    );
    c.manager.credential_store().save(&session("T1")).await.unwrap();
    let mut events = c.events.subscribe();
    let manager = Arc::new(c.manager);

    let request = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.transport().get::<Value>("/clubs").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.login("jung@club.io", "pw").await.unwrap();

    let err = request.await.unwrap().unwrap_err();

    assert_eq!(err, AuthError::NotAuthenticated);
    assert_eq!(c.backend.seen("/clubs").len(), 1);
    assert_eq!(
        manager.credential_store().access_token().await.as_deref(),
        Some("T2")
    );
    assert_eq!(manager.refresh_coordinator().status().await, RefreshStatus::Idle);
    assert_eq!(c.navigator.current().as_deref(), Some("/"));
    assert!(!drain(&mut events)
        .iter()
        .any(|event| matches!(event, CoreEvent::Auth(AuthEvent::SessionExpired { .. }))));

    let clubs: Value = manager.transport().get("/clubs").await.unwrap();
    assert!(clubs.is_array());
}

fn drain(events: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}
