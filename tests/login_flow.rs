//! Integration tests for login, logout, registration, and rehydration
//! against a mock identity endpoint.

use std::sync::Arc;

use finbank_session::{
    ApiRequest, Config, CredentialPair, CredentialStore, Error, MemoryStore, NewAccount, Phase,
    SessionManager, UserId, UserProfile,
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use time::{Duration, OffsetDateTime};

fn config_for(server: &ServerGuard) -> Config {
    Config::new(server.url().parse().unwrap())
}

fn seeded_store(access: &str, refresh: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let pair = CredentialPair {
        access_token: access.into(),
        refresh_token: refresh.into(),
        expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
    };
    let profile = UserProfile::new(UserId(1), "a@b.com", "Ada", "Bell")
        .with_roles(vec!["ROLE_USER".into()]);
    store.set(&pair, &profile);
    store
}

fn login_success_body() -> String {
    json!({
        "success": true,
        "message": "ok",
        "data": {
            "tokenType": "Bearer",
            "accessToken": "acc-1",
            "refreshToken": "ref-1",
            "expiresIn": 3600,
            "id": 1,
            "email": "a@b.com",
            "firstName": "Ada",
            "lastName": "Bell",
            "roles": ["ROLE_USER"]
        },
        "timestamp": "2025-01-01T00:00:00Z",
        "status": 200
    })
    .to_string()
}

#[tokio::test]
async fn login_success_persists_pair_and_profile() {
    let mut server = Server::new_async().await;
    let login_mock = server
        .mock("POST", "/auth/login")
        .match_body(Matcher::PartialJson(json!({
            "email": "a@b.com",
            "password": "x"
        })))
        .with_status(200)
        .with_body(login_success_body())
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::new(config_for(&server), store.clone()).unwrap();
    assert!(!manager.is_authenticated());

    let profile = manager.login("a@b.com", "x").await.unwrap();

    login_mock.assert_async().await;
    assert_eq!(profile.email, "a@b.com");
    assert_eq!(manager.current_user().unwrap().email, "a@b.com");
    assert_eq!(manager.phase(), Phase::Authenticated);
    assert!(manager.has_role("ROLE_USER"));
    assert!(!manager.is_admin());

    let record = store.get().unwrap();
    assert!(!record.access_token.is_empty());
    assert_eq!(record.refresh_token, "ref-1");
    assert_eq!(record.user.email, "a@b.com");
}

#[tokio::test]
async fn rejected_login_surfaces_invalid_credentials() {
    let mut server = Server::new_async().await;
    let login_mock = server
        .mock("POST", "/auth/login")
        .with_status(401)
        .with_body(
            json!({"success": false, "message": "bad credentials", "status": 401}).to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::new(config_for(&server), store.clone()).unwrap();

    let err = manager.login("a@b.com", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::InvalidCredentials));

    login_mock.assert_async().await;
    assert_eq!(manager.phase(), Phase::Anonymous);
    assert!(store.get().is_none());
}

#[tokio::test]
async fn malformed_input_is_rejected_locally() {
    let server = Server::new_async().await;
    let manager = SessionManager::in_memory(config_for(&server)).unwrap();

    assert!(matches!(
        manager.login("", "pw").await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        manager.login("not-an-email", "pw").await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        manager.login("a@b.com", "").await,
        Err(Error::Validation(_))
    ));
    assert_eq!(manager.phase(), Phase::Anonymous);
}

#[tokio::test]
async fn duplicate_registration_surfaces_server_message() {
    let mut server = Server::new_async().await;
    let register_mock = server
        .mock("POST", "/auth/register")
        .match_body(Matcher::PartialJson(json!({"email": "a@b.com"})))
        .with_status(409)
        .with_body(
            json!({"success": false, "message": "email already registered", "status": 409})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let manager = SessionManager::in_memory(config_for(&server)).unwrap();
    let account = NewAccount::new("Ada", "Bell", "a@b.com", "pw", "5550001", "1 Main St");

    match manager.register(&account).await {
        Err(Error::Validation(message)) => assert_eq!(message, "email already registered"),
        other => panic!("expected validation error, got {other:?}"),
    }
    register_mock.assert_async().await;
}

#[tokio::test]
async fn registration_success_does_not_sign_in() {
    let mut server = Server::new_async().await;
    let register_mock = server
        .mock("POST", "/auth/register")
        .with_status(200)
        .with_body(
            json!({"success": true, "message": "registered", "data": "OK", "status": 200})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let manager = SessionManager::in_memory(config_for(&server)).unwrap();
    let account = NewAccount::new("Ada", "Bell", "a@b.com", "pw", "5550001", "1 Main St");

    manager.register(&account).await.unwrap();
    register_mock.assert_async().await;
    assert!(!manager.is_authenticated());
    assert!(manager.current_user().is_none());
}

#[tokio::test]
async fn logout_fails_closed_when_revocation_errors() {
    let mut server = Server::new_async().await;
    let revoke_mock = server
        .mock("POST", "/auth/logout")
        .match_query(Matcher::UrlEncoded("refreshToken".into(), "ref-1".into()))
        .with_status(500)
        .with_body(json!({"success": false, "message": "boom", "status": 500}).to_string())
        .expect(1)
        .create_async()
        .await;

    let store = seeded_store("acc-1", "ref-1");
    let manager = SessionManager::new(config_for(&server), store.clone()).unwrap();
    assert!(manager.is_authenticated());

    manager.logout().await;

    revoke_mock.assert_async().await;
    assert!(!manager.is_authenticated());
    assert_eq!(manager.phase(), Phase::Anonymous);
    assert!(store.get().is_none());
}

#[tokio::test]
async fn rehydration_authenticates_without_network() {
    // Unreachable endpoint: any wire call would fail the test with a
    // network error, so a clean pass proves no call was made.
    let config = Config::new("http://127.0.0.1:1/".parse().unwrap());
    let store = seeded_store("acc-1", "ref-1");

    let manager = SessionManager::new(config, store).unwrap();

    assert!(manager.is_authenticated());
    assert_eq!(manager.phase(), Phase::Authenticated);
    assert_eq!(manager.current_user().unwrap().email, "a@b.com");
}

#[tokio::test]
async fn observers_see_every_transition_in_order() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/login")
        .with_status(200)
        .with_body(login_success_body())
        .create_async()
        .await;
    server
        .mock("POST", "/auth/logout")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"success": true, "data": "OK", "status": 200}).to_string())
        .create_async()
        .await;

    let manager = SessionManager::in_memory(config_for(&server)).unwrap();
    let mut transitions = manager.subscribe();

    manager.login("a@b.com", "x").await.unwrap();
    manager.logout().await;

    let expected = [
        (Phase::Anonymous, Phase::Authenticating),
        (Phase::Authenticating, Phase::Authenticated),
        (Phase::Authenticated, Phase::Anonymous),
    ];
    for (from, to) in expected {
        let t = transitions.recv().await.unwrap();
        assert_eq!((t.from, t.to), (from, to));
    }
    assert!(transitions.try_recv().is_err());
}

#[tokio::test]
async fn fetch_profile_replaces_stored_copy() {
    let mut server = Server::new_async().await;
    let me_mock = server
        .mock("GET", "/auth/me")
        .match_header("authorization", "Bearer acc-1")
        .with_status(200)
        .with_body(
            json!({
                "success": true,
                "data": {
                    "id": 1,
                    "email": "a@b.com",
                    "firstName": "Adeline",
                    "lastName": "Bell",
                    "roles": ["ROLE_USER", "ROLE_ADMIN"]
                },
                "status": 200
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let store = seeded_store("acc-1", "ref-1");
    let manager = SessionManager::new(config_for(&server), store.clone()).unwrap();

    let profile = manager.fetch_profile().await.unwrap();

    me_mock.assert_async().await;
    assert_eq!(profile.first_name, "Adeline");
    assert_eq!(manager.current_user().unwrap().first_name, "Adeline");
    assert!(manager.is_admin());
    assert_eq!(store.get().unwrap().user.first_name, "Adeline");
}

#[tokio::test]
async fn logout_all_clears_local_state() {
    let mut server = Server::new_async().await;
    let revoke_all_mock = server
        .mock("POST", "/auth/logout-all")
        .match_header("authorization", "Bearer acc-1")
        .with_status(200)
        .with_body(json!({"success": true, "data": "OK", "status": 200}).to_string())
        .expect(1)
        .create_async()
        .await;

    let store = seeded_store("acc-1", "ref-1");
    let manager = SessionManager::new(config_for(&server), store.clone()).unwrap();

    manager.logout_all().await;

    revoke_all_mock.assert_async().await;
    assert!(!manager.is_authenticated());
    assert!(store.get().is_none());
}

#[tokio::test]
async fn guarded_request_without_session_is_expired() {
    let server = Server::new_async().await;
    let manager = SessionManager::in_memory(config_for(&server)).unwrap();

    let err = manager
        .gateway()
        .send(ApiRequest::get("accounts"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SessionExpired));
}
