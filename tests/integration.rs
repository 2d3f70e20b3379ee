#![cfg(test)]

use std::sync::Arc;

use activity_feed::{
    base::{
        config::{Config, ConfigInner},
        types::{EventKind, NormalizedEvent, Res, Void},
    },
    runtime::Runtime,
    service::{
        db::{EventQuery, EventStore, GenericEventStore, SortOrder},
        http::{EVENT_HEADER, router},
    },
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use mockall::mock;
use serde_json::{Value, json};
use tower::ServiceExt;

// Mocks.

// Mock event store for exercising storage failures.

mock! {
    pub Store {}

    #[async_trait]
    impl GenericEventStore for Store {
        async fn insert(&self, event: &NormalizedEvent) -> Void;
        async fn query(&self, query: &EventQuery) -> Res<Vec<NormalizedEvent>>;
    }
}

fn get_failing_store() -> MockStore {
    let mut mock = MockStore::new();

    mock.expect_insert().returning(|_| Err(anyhow::anyhow!("connection refused")));
    mock.expect_query().returning(|_| Err(anyhow::anyhow!("connection refused")));

    mock
}

// Helpers.

fn test_config() -> Config {
    Config {
        inner: Arc::new(ConfigInner {
            bind_address: "127.0.0.1:0".to_string(),
            db_endpoint: "mem://".to_string(),
            ..Default::default()
        }),
    }
}

/// Helper function to setup the test environment.
async fn setup_test_environment() -> (Router, EventStore) {
    let store = EventStore::surreal_memory().await.expect("Failed to create event store");
    let runtime = Runtime { config: test_config(), store: store.clone() };

    (router(runtime), store)
}

fn setup_failing_environment() -> Router {
    let store = EventStore::new(Arc::new(get_failing_store()));
    router(Runtime { config: test_config(), store })
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

async fn post_webhook(app: &Router, event_type: Option<&str>, body: &str) -> (StatusCode, Value) {
    let mut request = Request::builder().method("POST").uri("/webhook").header("content-type", "application/json");

    if let Some(event_type) = event_type {
        request = request.header(EVENT_HEADER, event_type);
    }

    let response = app.clone().oneshot(request.body(Body::from(body.to_string())).unwrap()).await.unwrap();
    let status = response.status();

    (status, read_json(response).await)
}

async fn get_events(app: &Router, query: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(format!("/events{query}")).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    (status, read_json(response).await)
}

fn push_body(author: &str, git_ref: &str, timestamp: &str) -> String {
    json!({
        "pusher": { "name": author },
        "ref": git_ref,
        "head_commit": { "timestamp": timestamp }
    })
    .to_string()
}

fn merged_pull_request_body() -> String {
    json!({
        "action": "closed",
        "pull_request": {
            "user": { "login": "carol" },
            "head": { "ref": "feature" },
            "base": { "ref": "main" },
            "merged": true,
            "merged_by": { "login": "bob" },
            "merged_at": "2024-02-01T10:00:00Z",
            "created_at": "2024-01-31T09:00:00Z",
            "updated_at": "2024-02-01T10:00:01Z"
        }
    })
    .to_string()
}

async fn all_events(store: &EventStore) -> Vec<NormalizedEvent> {
    let query = EventQuery {
        order: SortOrder::Ascending,
        limit: None,
        after: None,
    };

    store.query(&query).await.expect("Failed to query store")
}

// Tests.

#[tokio::test]
async fn test_push_is_stored_and_polled() {
    let (app, store) = setup_test_environment().await;

    let (status, body) = post_webhook(&app, Some("push"), &push_body("alice", "refs/heads/main", "2024-01-01T00:00:00Z")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "event received" }));
    assert_eq!(all_events(&store).await.len(), 1);

    let (status, body) = get_events(&app, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{ "message": "alice pushed to main on 2024-01-01T00:00:00Z", "timestamp": "2024-01-01T00:00:00Z" }])
    );
}

#[tokio::test]
async fn test_merged_pull_request_stores_two_records() {
    let (app, store) = setup_test_environment().await;

    let (status, body) = post_webhook(&app, Some("pull_request"), &merged_pull_request_body()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "event received");

    let events = all_events(&store).await;
    assert_eq!(events.len(), 2);

    let merge = events.iter().find(|e| e.event_type == EventKind::Merge).expect("No merge record");
    assert_eq!(merge.author.as_deref(), Some("bob"));
    assert!(events.iter().any(|e| e.event_type == EventKind::PullRequest && e.action.as_deref() == Some("closed")));

    let (_, body) = get_events(&app, "").await;
    assert_eq!(
        body,
        json!([
            { "message": "bob merged branch feature to main on 2024-02-01T10:00:00Z", "timestamp": "2024-02-01T10:00:00Z" },
            { "message": "carol submitted a pull request from feature to main on 2024-02-01T10:00:01Z", "timestamp": "2024-02-01T10:00:01Z" }
        ])
    );
}

#[tokio::test]
async fn test_opened_pull_request_stores_one_record() {
    let (app, store) = setup_test_environment().await;

    let body = json!({
        "action": "opened",
        "pull_request": {
            "user": { "login": "carol" },
            "head": { "ref": "feature" },
            "base": { "ref": "main" },
            "merged": false,
            "created_at": "2024-01-31T09:00:00Z"
        }
    });

    let (status, _) = post_webhook(&app, Some("pull_request"), &body.to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let events = all_events(&store).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventKind::PullRequest);
    assert_eq!(events[0].merged, Some(false));
}

#[tokio::test]
async fn test_ping_and_missing_header_are_ignored() {
    let (app, store) = setup_test_environment().await;
    let body = json!({ "zen": "Design for failure.", "hook_id": 1 }).to_string();

    let (status, response) = post_webhook(&app, Some("ping"), &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({ "status": "ignored" }));

    let (status, response) = post_webhook(&app, None, &push_body("alice", "refs/heads/main", "2024-01-01T00:00:00Z")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({ "status": "ignored" }));

    let (status, response) = post_webhook(&app, Some("push"), "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({ "status": "ignored" }));

    assert!(all_events(&store).await.is_empty());
}

#[tokio::test]
async fn test_unrecognized_event_type_is_dropped() {
    let (app, store) = setup_test_environment().await;

    let (status, response) = post_webhook(&app, Some("issues"), &json!({ "action": "opened" }).to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({ "status": "event received" }));
    assert!(all_events(&store).await.is_empty());
}

#[tokio::test]
async fn test_malformed_push_still_acknowledged() {
    let (app, store) = setup_test_environment().await;

    let body = json!({ "ref": "refs/heads/main", "head_commit": null }).to_string();
    let (status, response) = post_webhook(&app, Some("push"), &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({ "status": "event received" }));
    assert!(all_events(&store).await.is_empty());
}

#[tokio::test]
async fn test_invalid_json_is_rejected() {
    let (app, store) = setup_test_environment().await;

    let (status, response) = post_webhook(&app, Some("push"), "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, json!({ "error": "No payload" }));
    assert!(all_events(&store).await.is_empty());
}

#[tokio::test]
async fn test_polling_returns_latest_ten_in_order() {
    let (app, _) = setup_test_environment().await;

    for minute in 0..12 {
        let timestamp = format!("2024-01-01T00:{minute:02}:00Z");
        let (status, _) = post_webhook(&app, Some("push"), &push_body(&format!("dev{minute}"), "refs/heads/main", &timestamp)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = get_events(&app, "").await;
    assert_eq!(status, StatusCode::OK);

    let messages = body.as_array().expect("Expected an array");
    assert_eq!(messages.len(), 10);

    let stamps: Vec<&str> = messages.iter().map(|m| m["timestamp"].as_str().unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(stamps.first(), Some(&"2024-01-01T00:02:00Z"));
    assert_eq!(stamps.last(), Some(&"2024-01-01T00:11:00Z"));
    assert_eq!(messages[0]["message"], "dev2 pushed to main on 2024-01-01T00:02:00Z");

    // Stateless: a second poll sees the same window.
    let (_, again) = get_events(&app, "").await;
    assert_eq!(again, body);
}

#[tokio::test]
async fn test_polling_preserves_insertion_order() {
    let (app, _) = setup_test_environment().await;
    let authors = ["ann", "ben", "cat", "dan"];

    for (i, author) in authors.iter().enumerate() {
        let timestamp = format!("2024-05-0{}T12:00:00Z", i + 1);
        post_webhook(&app, Some("push"), &push_body(author, "refs/heads/dev", &timestamp)).await;
    }

    let (_, body) = get_events(&app, "").await;
    let polled: Vec<String> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap().split(' ').next().unwrap().to_string())
        .collect();

    assert_eq!(polled, authors);
}

#[tokio::test]
async fn test_polling_with_cursor() {
    let (app, _) = setup_test_environment().await;

    for day in 1..=3 {
        let timestamp = format!("2024-03-0{day}T00:00:00Z");
        post_webhook(&app, Some("push"), &push_body("alice", "refs/heads/main", &timestamp)).await;
    }

    let (status, body) = get_events(&app, "?after=2024-03-01T00:00:00Z").await;
    assert_eq!(status, StatusCode::OK);

    let stamps: Vec<&str> = body.as_array().unwrap().iter().map(|m| m["timestamp"].as_str().unwrap()).collect();
    assert_eq!(stamps, ["2024-03-02T00:00:00Z", "2024-03-03T00:00:00Z"]);

    let (_, body) = get_events(&app, "?after=2024-03-03T00:00:00Z").await;
    assert_eq!(body, json!([]));

    let (status, _) = get_events(&app, "?after=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Cursors compare as strings, like the stored timestamps.
    let (status, body) = get_events(&app, "?after=2024-03-02").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_push_timestamp_without_offset_is_stored_as_received() {
    let (app, store) = setup_test_environment().await;

    let (status, body) = post_webhook(&app, Some("push"), &push_body("alice", "refs/heads/main", "2024-01-01T12:00:00")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "event received" }));

    let events = all_events(&store).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].timestamp, "2024-01-01T12:00:00");

    let (_, body) = get_events(&app, "").await;
    assert_eq!(body[0]["message"], "alice pushed to main on 2024-01-01T12:00:00");
}

#[tokio::test]
async fn test_large_webhook_body_is_accepted() {
    let (app, store) = setup_test_environment().await;

    // Past axum's 2 MB default, well under GitHub's 25 MB cap.
    let body = json!({
        "pusher": { "name": "alice" },
        "ref": "refs/heads/main",
        "head_commit": { "timestamp": "2024-01-01T00:00:00Z", "message": "x".repeat(3 * 1024 * 1024) }
    })
    .to_string();

    let (status, body) = post_webhook(&app, Some("push"), &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "event received" }));
    assert_eq!(all_events(&store).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_and_polls() {
    let (app, store) = setup_test_environment().await;
    let mut tasks = tokio::task::JoinSet::new();

    for i in 0..40 {
        let post_app = app.clone();
        tasks.spawn(async move {
            let timestamp = format!("2024-06-01T00:00:{i:02}Z");
            let (status, body) = post_webhook(&post_app, Some("push"), &push_body(&format!("dev{i}"), "refs/heads/main", &timestamp)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({ "status": "event received" }));
        });

        let poll_app = app.clone();
        tasks.spawn(async move {
            let (status, body) = get_events(&poll_app, "").await;
            assert_eq!(status, StatusCode::OK);

            let stamps: Vec<&str> = body.as_array().unwrap().iter().map(|m| m["timestamp"].as_str().unwrap()).collect();
            assert!(stamps.len() <= 10);
            assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        });
    }

    while let Some(result) = tasks.join_next().await {
        result.expect("Task panicked");
    }

    let mut stamps: Vec<String> = all_events(&store).await.into_iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps.len(), 40);
    stamps.dedup();
    assert_eq!(stamps.len(), 40);

    let (_, body) = get_events(&app, "").await;
    let polled: Vec<&str> = body.as_array().unwrap().iter().map(|m| m["timestamp"].as_str().unwrap()).collect();
    let expected: Vec<String> = (30..40).map(|i| format!("2024-06-01T00:00:{i:02}Z")).collect();
    assert_eq!(polled, expected);
}

#[tokio::test]
async fn test_store_failure_surfaces_as_server_error() {
    let app = setup_failing_environment();

    let (status, body) = post_webhook(&app, Some("push"), &push_body("alice", "refs/heads/main", "2024-01-01T00:00:00Z")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "internal server error" }));

    let (status, _) = get_events(&app, "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_ignored_delivery_never_touches_store() {
    // The failing store would turn any write into a 500.
    let app = setup_failing_environment();

    let (status, body) = post_webhook(&app, Some("ping"), &json!({ "zen": "Practicality beats purity." }).to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn test_health_and_landing_page() {
    let (app, _) = setup_test_environment().await;

    let response = app.clone().oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({ "status": "ok" }));

    let response = app.clone().oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("/events"));
}
