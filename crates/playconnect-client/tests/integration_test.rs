use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{EncodingKey, Header};
use playconnect_client::poller::TickOutcome;
use playconnect_client::storage::{KeyValueStore, MemoryStore, SESSION_KEYS};
use playconnect_client::{AppContext, ClientConfig, ClientError, SessionEvent, SessionManager};
use playconnect_common::token::is_token_expired;
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_ID: i64 = 12;

fn mint(exp: i64) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        &json!({ "sub": USER_ID.to_string(), "exp": exp }),
        &EncodingKey::from_secret(b"integration"),
    )
    .unwrap()
}

struct TestClient {
    ctx: AppContext,
    store: Arc<MemoryStore>,
    clock_offset: Arc<AtomicI64>,
}

/// Context against `server` whose session clock can be moved forward
fn test_client(server: &MockServer) -> TestClient {
    let config = ClientConfig {
        api_base_url: server.uri(),
        ..Default::default()
    };
    let store = Arc::new(MemoryStore::new());
    let clock_offset = Arc::new(AtomicI64::new(0));
    let offset = clock_offset.clone();
    let session = Arc::new(
        SessionManager::new(
            &config.api_base_url,
            store.clone(),
            config.session.expiry_check_interval(),
        )
        .with_clock(move || Utc::now() + ChronoDuration::seconds(offset.load(Ordering::SeqCst))),
    );
    TestClient {
        ctx: AppContext::with_session(config, session),
        store,
        clock_offset,
    }
}

async fn login(server: &MockServer, client: &TestClient, token: &str) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "bearer",
            "user_id": USER_ID,
            "role": "player"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"user_id": USER_ID, "email": "ana@example.com", "first_name": "Ana", "last_name": "Silva"}
        ])))
        .mount(server)
        .await;

    let outcome = client
        .ctx
        .session
        .login("ana@example.com", "secret")
        .await
        .unwrap();
    assert!(outcome.is_success(), "login failed: {:?}", outcome);
}

fn notification(id: i64, kind: &str, message: &str) -> serde_json::Value {
    json!({
        "notification_id": id,
        "user_id": USER_ID,
        "type": kind,
        "message": message,
        "is_read": false,
        "created_at": "2024-05-01T18:00:00"
    })
}

/// Wait until `server` has seen `count` requests to `method_name path`
async fn wait_for_requests(server: &MockServer, method_name: &str, request_path: &str, count: usize) {
    for _ in 0..200 {
        let seen = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == method_name && r.url.path() == request_path)
            .count();
        if seen >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} {} was not requested {} times", method_name, request_path, count);
}

#[tokio::test]
async fn test_expired_token_rejects_without_network() {
    let server = MockServer::start().await;
    let client = test_client(&server);
    login(&server, &client, &mint((Utc::now() + ChronoDuration::hours(1)).timestamp())).await;

    Mock::given(method("GET"))
        .and(path("/notifications/unread_count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unread_count": 1 })))
        .expect(0)
        .mount(&server)
        .await;

    let stale = mint((Utc::now() - ChronoDuration::seconds(10)).timestamp());
    assert!(is_token_expired(&stale));

    // Move the session clock past the token's expiry
    client.clock_offset.store(3_600 + 10, Ordering::SeqCst);
    let mut events = client.ctx.session.subscribe();

    let err = client.ctx.api.unread_count(USER_ID).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(!client.ctx.session.is_authenticated());
    for key in SESSION_KEYS {
        assert!(client.store.get(key).is_none(), "{} should be cleared", key);
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut { .. }
    ));
}

#[tokio::test]
async fn test_poll_ticks_toast_only_new_notifications() {
    let server = MockServer::start().await;
    let client = test_client(&server);
    login(&server, &client, &mint((Utc::now() + ChronoDuration::hours(1)).timestamp())).await;

    Mock::given(method("GET"))
        .and(path("/notifications"))
        .and(query_param("user_id", USER_ID.to_string()))
        .and(query_param("unread_only", "true"))
        .and(query_param_is_missing("since_id"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([notification(5, "reminder", "m")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .and(query_param("since_id", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            notification(5, "reminder", "m"),
            notification(6, "game_full", "Saturday futsal is full")
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/5/read"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/6/read"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let poller = client.ctx.poller(USER_ID);
    let mut bumps = client.ctx.signal.subscribe();

    // First tick: no cursor, nothing seen
    assert_eq!(poller.tick().await, TickOutcome::Delivered(vec![5]));
    let toasts = client.ctx.toasts.visible();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].title, "Reminder");
    assert_eq!(toasts[0].body.as_deref(), Some("m"));
    assert_eq!(client.ctx.dedupe.cursor(USER_ID), Some(5));
    assert!(client.ctx.dedupe.snapshot(USER_ID).contains(5));
    assert!(bumps.try_recv().is_ok());
    wait_for_requests(&server, "PATCH", "/notifications/5/read", 1).await;

    // Second tick re-delivers 5 alongside 6; only 6 is new
    assert_eq!(poller.tick().await, TickOutcome::Delivered(vec![6]));
    let toasts = client.ctx.toasts.visible();
    assert_eq!(toasts.len(), 2);
    assert_eq!(toasts[0].title, "Game full");
    assert_eq!(toasts[1].title, "Reminder");
    assert_eq!(client.ctx.dedupe.cursor(USER_ID), Some(6));
    wait_for_requests(&server, "PATCH", "/notifications/6/read", 1).await;
}

#[tokio::test]
async fn test_mark_all_read_survives_partial_failure() {
    let server = MockServer::start().await;
    let client = test_client(&server);
    login(&server, &client, &mint((Utc::now() + ChronoDuration::hours(1)).timestamp())).await;

    Mock::given(method("GET"))
        .and(path("/notifications/unread_count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unread_count": 2 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .and(query_param("limit", "30"))
        .and(query_param_is_missing("unread_only"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            notification(8, "waitlist", "You moved up the waitlist"),
            notification(7, "game_update", "Kickoff moved to 7pm")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/7/read"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/8/read"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let bell = client.ctx.mount_bell(USER_ID).await;
    assert_eq!(bell.badge().as_deref(), Some("2"));
    assert!(bell.toggle().await);
    assert_eq!(bell.items().len(), 2);

    let mut marked = bell.mark_all_read();
    marked.sort_unstable();
    assert_eq!(marked, vec![7, 8]);
    assert!(bell.items().iter().all(|n| n.is_read));
    assert_eq!(bell.unread_count(), 0);

    wait_for_requests(&server, "PATCH", "/notifications/7/read", 1).await;
    wait_for_requests(&server, "PATCH", "/notifications/8/read", 1).await;

    // The failed call for 8 changes nothing locally and keeps the session
    assert!(bell.items().iter().all(|n| n.is_read));
    assert_eq!(bell.unread_count(), 0);
    assert!(client.ctx.session.is_authenticated());
}

#[tokio::test]
async fn test_unauthorized_poll_logs_out_once() {
    let server = MockServer::start().await;
    let client = test_client(&server);
    login(&server, &client, &mint((Utc::now() + ChronoDuration::hours(1)).timestamp())).await;

    Mock::given(method("GET"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notifications/unread_count"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut events = client.ctx.session.subscribe();
    let poller = client.ctx.poller(USER_ID);
    let (tick, count) = tokio::join!(poller.tick(), client.ctx.api.unread_count(USER_ID));
    assert_eq!(tick, TickOutcome::Failed);
    assert!(count.is_err());

    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut { .. }
    ));
    assert!(events.try_recv().is_err());
    assert!(!client.ctx.session.is_authenticated());
    assert!(client.ctx.toasts.is_empty());
}
