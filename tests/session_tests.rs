mod common;

use common::MockTransport;
use serde_json::json;
use std::sync::Arc;

use sentryview_client::errors::ApiError;
use sentryview_client::session::store::{CredentialStore, SessionStatus, TokenPair};
use sentryview_client::session::transport::ApiRequest;
use sentryview_client::session::ApiClient;

fn authed_client(transport: Arc<MockTransport>) -> ApiClient {
    let store = CredentialStore::in_memory();
    store.set(TokenPair {
        access_token: "stale".to_string(),
        refresh_token: "refresh-ok".to_string(),
    });
    ApiClient::with_transport(transport, store)
}

#[tokio::test]
async fn attaches_bearer_to_authenticated_requests() {
    let transport = MockTransport::new();
    transport.handle("/profile", |_| (200, json!({"email": "a@b.c"})));

    let client = authed_client(transport.clone());
    client.send(ApiRequest::get("/profile")).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bearer.as_deref(), Some("stale"));
}

#[tokio::test]
async fn no_credentials_means_no_bearer() {
    let transport = MockTransport::new();
    transport.handle("/auth/login", |_| {
        (200, json!({"access_token": "a", "refresh_token": "r"}))
    });

    let store = CredentialStore::in_memory();
    let client = ApiClient::with_transport(transport.clone(), store);
    client
        .send(ApiRequest::post_json("/auth/login", json!({})))
        .await
        .unwrap();

    assert!(transport.calls()[0].bearer.is_none());
}

#[tokio::test]
async fn refresh_and_retry_exactly_once_on_401() {
    let transport = MockTransport::new();
    transport.handle("/profile", |call| {
        if call.bearer.as_deref() == Some("fresh") {
            (200, json!({"email": "a@b.c"}))
        } else {
            (401, json!({"message": "token expired"}))
        }
    });
    transport.handle("/refresh", |call| {
        assert_eq!(call.bearer.as_deref(), Some("refresh-ok"));
        (200, json!({"access_token": "fresh"}))
    });

    let client = authed_client(transport.clone());
    let response = client.send(ApiRequest::get("/profile")).await.unwrap();
    assert_eq!(response.status, 200);

    assert_eq!(transport.calls_to("/profile"), 2);
    assert_eq!(transport.calls_to("/refresh"), 1);
    // The new token is installed for all subsequent requests.
    assert_eq!(client.store().access_token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn concurrent_401s_share_a_single_refresh() {
    let transport = MockTransport::new();
    transport.handle("/detection/status/7", |call| {
        if call.bearer.as_deref() == Some("fresh") {
            (200, json!({"status": "processing", "progress": 10}))
        } else {
            (401, json!({"message": "token expired"}))
        }
    });
    transport.handle("/refresh", |_| (200, json!({"access_token": "fresh"})));

    let client = authed_client(transport.clone());

    let (a, b, c, d) = tokio::join!(
        client.send(ApiRequest::get("/detection/status/7")),
        client.send(ApiRequest::get("/detection/status/7")),
        client.send(ApiRequest::get("/detection/status/7")),
        client.send(ApiRequest::get("/detection/status/7")),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok() && d.is_ok());
    assert_eq!(transport.calls_to("/refresh"), 1);
}

#[tokio::test]
async fn second_401_after_refresh_expires_the_session() {
    let transport = MockTransport::new();
    // Rejects every token, fresh or stale.
    transport.handle("/profile", |_| (401, json!({"message": "nope"})));
    transport.handle("/refresh", |_| (200, json!({"access_token": "fresh"})));

    let client = authed_client(transport.clone());
    let mut status = client.store().subscribe();

    let err = client.send(ApiRequest::get("/profile")).await.unwrap_err();
    assert!(matches!(err, ApiError::SessionExpired));

    assert_eq!(transport.calls_to("/profile"), 2);
    assert_eq!(transport.calls_to("/refresh"), 1);
    assert!(!client.store().is_authenticated());
    assert_eq!(*status.borrow_and_update(), SessionStatus::Expired);
}

#[tokio::test]
async fn expired_refresh_token_clears_session_with_no_further_requests() {
    let transport = MockTransport::new();
    transport.handle("/profile", |_| (401, json!({"message": "token expired"})));
    transport.handle("/refresh", |_| (401, json!({"message": "refresh expired"})));

    let client = authed_client(transport.clone());
    let err = client.send(ApiRequest::get("/profile")).await.unwrap_err();

    assert!(matches!(err, ApiError::SessionExpired));
    assert!(!client.store().is_authenticated());
    // No retry went out carrying the dead token.
    assert_eq!(transport.calls_to("/profile"), 1);
    assert_eq!(transport.calls_to("/refresh"), 1);
    assert_eq!(client.store().status(), SessionStatus::Expired);
}

#[tokio::test]
async fn missing_refresh_token_propagates_401_unchanged() {
    let transport = MockTransport::new();
    transport.handle("/profile", |_| (401, json!({"message": "unauthorized"})));

    let store = CredentialStore::in_memory();
    let client = ApiClient::with_transport(transport.clone(), store);
    let err = client.send(ApiRequest::get("/profile")).await.unwrap_err();

    match err {
        ApiError::Server { status, .. } => assert_eq!(status, 401),
        other => panic!("expected Server 401, got {:?}", other),
    }
    assert_eq!(transport.calls_to("/refresh"), 0);
}

#[tokio::test]
async fn non_auth_failures_pass_through_without_retry() {
    let transport = MockTransport::new();
    transport.enqueue("/detection/upload", 500, json!({"error": "disk full"}));

    let client = authed_client(transport.clone());
    let err = client
        .send(ApiRequest::post_json("/detection/upload", json!({})))
        .await
        .unwrap_err();

    match err {
        ApiError::Server { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "disk full");
        }
        other => panic!("expected Server 500, got {:?}", other),
    }
    assert_eq!(transport.calls_to("/detection/upload"), 1);
    assert_eq!(transport.calls_to("/refresh"), 0);
}

#[tokio::test]
async fn auth_override_skips_the_refresh_path() {
    let transport = MockTransport::new();
    transport.handle("/refresh", |_| (401, json!({"message": "bad refresh"})));

    let client = authed_client(transport.clone());
    let err = client
        .send(ApiRequest::post("/refresh").with_auth_override("some-refresh"))
        .await
        .unwrap_err();

    // The override request fails flat; no recursive refresh attempt.
    assert!(matches!(err, ApiError::Server { status: 401, .. }));
    assert_eq!(transport.calls_to("/refresh"), 1);
}
