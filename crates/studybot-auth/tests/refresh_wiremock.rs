//! Integration tests for the token refresh path using wiremock
//!
//! These tests mock the backend's refresh endpoint to verify the HTTP exchange
//! and what ends up in the credential store.

use std::sync::Arc;
use studybot_auth::{
    CredentialStore, FileCredentialStore, HttpRefreshEndpoint, MemoryCredentialStore,
    RefreshEndpoint, TokenConfig, TokenManager,
};
use studybot_core::StreamError;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn expired_store(refresh_token: &str) -> Arc<MemoryCredentialStore> {
    let keys = TokenConfig::default().keys;
    let store = Arc::new(MemoryCredentialStore::new());
    store.set(&keys.access_token, "stale-token").await.unwrap();
    store.set(&keys.refresh_token, refresh_token).await.unwrap();
    store
        .set(&keys.expires_at, &(now_ms() - 60_000).to_string())
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_refresh_success_with_expires_in() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(serde_json::json!({ "refreshToken": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "access-2",
            "expiresIn": 900
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = expired_store("refresh-1").await;
    let endpoint = Arc::new(HttpRefreshEndpoint::new(
        reqwest::Client::new(),
        &mock_server.uri(),
        "/auth/refresh",
    ));
    let manager = TokenManager::new(store.clone(), endpoint, TokenConfig::default());

    let before = now_ms();
    let token = manager.get_valid_access_token().await.unwrap();
    assert_eq!(token, "access-2");

    let record = manager.current_record().await.unwrap();
    assert_eq!(record.access_token.as_deref(), Some("access-2"));
    assert_eq!(record.refresh_token.as_deref(), Some("refresh-1"));
    let expires_at = record.expires_at.unwrap();
    assert!(expires_at >= before + 900_000);
    assert!(expires_at <= now_ms() + 900_000);

    // second call uses the cached token, the mock expects exactly one hit
    assert_eq!(manager.get_valid_access_token().await.unwrap(), "access-2");
}

#[tokio::test]
async fn test_refresh_rotates_refresh_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": "access-2",
            "refreshToken": "refresh-2",
            "expiresAt": 4_102_444_800_000_i64
        })))
        .mount(&mock_server)
        .await;

    let store = expired_store("refresh-1").await;
    let endpoint = Arc::new(HttpRefreshEndpoint::new(
        reqwest::Client::new(),
        &mock_server.uri(),
        "/auth/refresh",
    ));
    let manager = TokenManager::new(store, endpoint, TokenConfig::default());

    manager.get_valid_access_token().await.unwrap();
    let record = manager.current_record().await.unwrap();
    assert_eq!(record.refresh_token.as_deref(), Some("refresh-2"));
    assert_eq!(record.expires_at, Some(4_102_444_800_000));
}

#[tokio::test]
async fn test_refresh_rejected_clears_file_store() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid refresh token"))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileCredentialStore::new(temp_dir.path().join("credentials.json")));
    let keys = TokenConfig::default().keys;
    store.set(&keys.access_token, "stale").await.unwrap();
    store.set(&keys.refresh_token, "revoked").await.unwrap();
    store.set(&keys.expires_at, "0").await.unwrap();

    let endpoint = Arc::new(HttpRefreshEndpoint::new(
        reqwest::Client::new(),
        &mock_server.uri(),
        "/auth/refresh",
    ));
    let manager = TokenManager::new(store.clone(), endpoint, TokenConfig::default());

    let err = manager.get_valid_access_token().await.unwrap_err();
    assert!(matches!(err, StreamError::RefreshRejected(ref msg) if msg.contains("401")));

    assert_eq!(store.get(&keys.access_token).await.unwrap(), None);
    assert_eq!(store.get(&keys.refresh_token).await.unwrap(), None);
    assert_eq!(store.get(&keys.expires_at).await.unwrap(), None);
}

#[tokio::test]
async fn test_refresh_malformed_response_is_rejection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let endpoint = HttpRefreshEndpoint::new(reqwest::Client::new(), &mock_server.uri(), "/auth/refresh");
    let err = endpoint.refresh("refresh-1").await.unwrap_err();
    assert!(matches!(err, StreamError::RefreshRejected(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_rejection() {
    // Nothing listens on this port once the listener is dropped
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let store = expired_store("refresh-1").await;
    let endpoint = Arc::new(HttpRefreshEndpoint::new(reqwest::Client::new(), &uri, "/auth/refresh"));
    let manager = TokenManager::new(store.clone(), endpoint, TokenConfig::default());

    let err = manager.get_valid_access_token().await.unwrap_err();
    assert!(matches!(err, StreamError::RefreshRejected(_)));
    assert!(store.is_empty());
}
