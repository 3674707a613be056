//! Refresh policy and refresh failure handling against a mock provider.

mod common;

use std::time::Duration;

use common::{config, headless_client, mock_idp, seed_credentials, token_response};
use loopauth_client::{NoBrowser, OidcClient, RefreshOutcome};
use loopauth_core::AuthError;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

fn access_token(generation: u32) -> String {
    token_response("alice", generation)["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_refresh_not_due_at_40_percent() {
    let server = mock_idp().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("alice", 1)))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let seeded = seed_credentials(&dir.path().join("oidc_credentials.json"), 40, 100);

    let client = headless_client(&server, dir.path()).await;
    assert!(client.is_logged());
    assert_eq!(client.refresh().await.unwrap(), RefreshOutcome::Skipped);
    assert_eq!(client.snapshot(), Some(seeded));
}

#[tokio::test]
async fn test_refresh_due_at_60_percent() {
    let server = mock_idp().await;
    Mock::given(method("POST"))
        .and(path("/realms/dev/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=cli"))
        .and(body_string_contains("scope=openid+profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("alice", 1)))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("oidc_credentials.json");
    let seeded = seed_credentials(&file, 60, 100);

    // Construction runs the refresh check.
    let client = headless_client(&server, dir.path()).await;
    let current = client.snapshot().unwrap();
    assert_eq!(current.access_token.encoded, access_token(1));
    assert_eq!(current.access_token_expiration, 300);
    assert!(current.timestamp > seeded.timestamp);

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(stored["access_token"]["encoded"], json!(access_token(1)));

    // Fresh credentials: nothing more to do.
    assert_eq!(client.refresh().await.unwrap(), RefreshOutcome::Skipped);
}

#[tokio::test]
async fn test_refresh_reports_exchange() {
    let server = mock_idp().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("alice", 1)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("alice", 2)))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    seed_credentials(&dir.path().join("oidc_credentials.json"), 60, 100);

    let client = OidcClient::builder(config(&server, dir.path()))
        .refresh_threshold(0.0)
        .browser(NoBrowser)
        .build()
        .await
        .unwrap();
    assert_eq!(client.snapshot().unwrap().access_token.encoded, access_token(1));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.access_token().await.unwrap(), access_token(2));
}

#[tokio::test]
async fn test_refresh_failure_keeps_credentials() {
    let server = mock_idp().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(2)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("oidc_credentials.json");
    let seeded = seed_credentials(&file, 60, 100);

    // The startup refresh fails too, without preventing construction.
    let client = headless_client(&server, dir.path()).await;
    assert_eq!(client.snapshot(), Some(seeded.clone()));

    let err = client.refresh().await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Refresh { status: Some(503), session_expired: false, .. }
    ));
    assert_eq!(client.snapshot(), Some(seeded));
    assert!(file.exists());
}

#[tokio::test]
async fn test_rejected_refresh_token_logs_out() {
    let server = mock_idp().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token is not active"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("oidc_credentials.json");
    seed_credentials(&file, 60, 100);

    let client = headless_client(&server, dir.path()).await;
    assert!(client.is_logged());

    let err = client.refresh().await.unwrap_err();
    assert!(matches!(err, AuthError::Refresh { session_expired: true, .. }));
    assert!(err.requires_login());
    assert!(!client.is_logged());
    assert!(!file.exists());
}

#[tokio::test]
async fn test_rejected_refresh_token_adopts_rotated_file() {
    let server = mock_idp().await;
    // First client's startup refresh.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    // Second client's startup refresh rotates the shared refresh token.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("alice", 1)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    // The old refresh token is no longer valid.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Stale token"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("oidc_credentials.json");
    let seeded = seed_credentials(&file, 60, 100);

    let stale = headless_client(&server, dir.path()).await;
    assert_eq!(stale.snapshot(), Some(seeded));
    let rotating = headless_client(&server, dir.path()).await;
    let rotated = rotating.snapshot().unwrap();
    assert_eq!(rotated.access_token.encoded, access_token(1));

    assert_eq!(stale.refresh().await.unwrap(), RefreshOutcome::Refreshed);
    assert_eq!(stale.snapshot(), Some(rotated.clone()));
    assert!(file.exists());

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(stored["refresh_token"]["encoded"], json!(rotated.refresh_token.encoded));
}

#[tokio::test]
async fn test_rejected_refresh_token_kept_when_file_is_locked() {
    let server = mock_idp().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("oidc_credentials.json");
    let seeded = seed_credentials(&file, 60, 100);

    let client = OidcClient::builder(config(&server, dir.path()))
        .lock_timeout(Duration::from_millis(100))
        .browser(NoBrowser)
        .build()
        .await
        .unwrap();
    std::fs::write(client.store().lock_path(), "OWNED BY PID 1").unwrap();

    let err = client.refresh().await.unwrap_err();
    assert!(err.is_lock_error());
    assert_eq!(client.snapshot(), Some(seeded));
    assert!(file.exists());
}

#[tokio::test]
async fn test_rejected_refresh_token_at_startup() {
    let server = mock_idp().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("oidc_credentials.json");
    seed_credentials(&file, 60, 100);

    let client = headless_client(&server, dir.path()).await;
    assert!(!client.is_logged());
    assert!(!file.exists());
}

#[tokio::test]
async fn test_two_clients_share_one_file() {
    let server = mock_idp().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("alice", 1)))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    seed_credentials(&dir.path().join("oidc_credentials.json"), 60, 100);

    let (a, b) = tokio::join!(
        headless_client(&server, dir.path()),
        headless_client(&server, dir.path())
    );
    assert!(a.is_logged());
    assert!(b.is_logged());
    assert!(!a.store().lock_path().exists());
}
