use std::path::PathBuf;
use std::time::Duration;

use http::StatusCode;
use poem::test::{TestClient, TestResponse};
use poem::Endpoint;
use serde_json::json;
use todogate_common::{
    QueueProcessingOrder, RateLimitingConfig, Secret, TodoConfig, TodoConfigStore,
    TokenBucketConfig,
};
use todogate_core::Services;
use tokio::time::Instant;

use crate::make_app;

fn bucket(token_limit: u32, replenishment_period: Duration, queue_limit: u32) -> TokenBucketConfig {
    TokenBucketConfig {
        token_limit,
        tokens_per_period: 1,
        replenishment_period,
        auto_replenishment: true,
        queue_limit,
        queue_processing_order: QueueProcessingOrder::OldestFirst,
    }
}

fn generous() -> TokenBucketConfig {
    bucket(1000, Duration::from_secs(1), 0)
}

async fn client(read: TokenBucketConfig, write: TokenBucketConfig) -> TestClient<impl Endpoint> {
    let config = TodoConfig {
        store: TodoConfigStore {
            database_url: Secret::new("sqlite::memory:"),
            http: Default::default(),
            rate_limiting: RateLimitingConfig { read, write },
        },
        paths_relative_to: PathBuf::from("."),
    };
    let services = Services::new(config).await.unwrap();
    TestClient::new(make_app(&services).await)
}

async fn register(cli: &TestClient<impl Endpoint>, username: &str) -> String {
    let credentials = json!({ "username": username, "password": "correct horse" });

    cli.post("/api/users")
        .body_json(&credentials)
        .send()
        .await
        .assert_status(StatusCode::CREATED);

    let resp = cli.post("/api/auth/token").body_json(&credentials).send().await;
    resp.assert_status(StatusCode::CREATED);
    let json = resp.json().await;
    let token = json.value().object().get("token").string().to_owned();
    format!("Bearer {token}")
}

async fn create_todo(
    cli: &TestClient<impl Endpoint>,
    authorization: &str,
    title: &str,
) -> TestResponse {
    cli.post("/api/todos")
        .header("Authorization", authorization)
        .body_json(&json!({ "title": title }))
        .send()
        .await
}

fn retry_after(resp: &TestResponse) -> u64 {
    resp.0
        .headers()
        .get(http::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap()
}

#[tokio::test]
async fn test_todo_lifecycle() {
    let cli = client(generous(), generous()).await;
    let alice = register(&cli, "alice").await;

    let resp = create_todo(&cli, &alice, "  buy milk ").await;
    resp.assert_status(StatusCode::CREATED);
    let json = resp.json().await;
    let todo = json.value().object();
    todo.get("title").assert_string("buy milk");
    todo.get("is_complete").assert_bool(false);
    let id = todo.get("id").i64();

    create_todo(&cli, &alice, "walk the dog")
        .await
        .assert_status(StatusCode::CREATED);

    let resp = cli.get("/api/todos").header("Authorization", &alice).send().await;
    resp.assert_status_is_ok();
    let json = resp.json().await;
    let todos = json.value().array();
    todos.assert_len(2);
    todos.get(0).object().get("id").assert_i64(id);

    let resp = cli
        .put(format!("/api/todos/{id}/complete"))
        .header("Authorization", &alice)
        .send()
        .await;
    resp.assert_status_is_ok();
    resp.json().await.value().object().get("is_complete").assert_bool(true);

    let resp = cli
        .put(format!("/api/todos/{id}"))
        .header("Authorization", &alice)
        .body_json(&json!({ "title": "buy oat milk", "is_complete": false }))
        .send()
        .await;
    resp.assert_status_is_ok();
    let json = resp.json().await;
    json.value().object().get("title").assert_string("buy oat milk");
    json.value().object().get("is_complete").assert_bool(false);

    cli.delete(format!("/api/todos/{id}"))
        .header("Authorization", &alice)
        .send()
        .await
        .assert_status(StatusCode::NO_CONTENT);

    cli.get(format!("/api/todos/{id}"))
        .header("Authorization", &alice)
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let resp = cli.delete("/api/todos").header("Authorization", &alice).send().await;
    resp.assert_status_is_ok();
    resp.json().await.value().object().get("deleted").assert_i64(1);
}

#[tokio::test]
async fn test_empty_title_is_rejected() {
    let cli = client(generous(), generous()).await;
    let alice = register(&cli, "alice").await;

    create_todo(&cli, &alice, "   ")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_todos_require_authorization() {
    let cli = client(generous(), generous()).await;

    cli.get("/api/todos")
        .send()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    cli.get("/api/todos")
        .header("Authorization", "Bearer not-a-token")
        .send()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_todos_are_scoped_to_owner() {
    let cli = client(generous(), generous()).await;
    let alice = register(&cli, "alice").await;
    let bob = register(&cli, "bob").await;

    let resp = create_todo(&cli, &alice, "secret plan").await;
    let id = resp.json().await.value().object().get("id").i64();

    cli.get(format!("/api/todos/{id}"))
        .header("Authorization", &bob)
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);

    cli.delete(format!("/api/todos/{id}"))
        .header("Authorization", &bob)
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let resp = cli.get("/api/todos").header("Authorization", &bob).send().await;
    resp.json().await.value().array().assert_len(0);
}

#[tokio::test]
async fn test_user_registration_rules() {
    let cli = client(generous(), generous()).await;

    cli.post("/api/users")
        .body_json(&json!({ "username": "alice", "password": "short" }))
        .send()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    cli.post("/api/users")
        .body_json(&json!({ "username": "alice", "password": "long enough" }))
        .send()
        .await
        .assert_status(StatusCode::CREATED);

    cli.post("/api/users")
        .body_json(&json!({ "username": "alice", "password": "long enough" }))
        .send()
        .await
        .assert_status(StatusCode::CONFLICT);

    cli.post("/api/auth/token")
        .body_json(&json!({ "username": "alice", "password": "wrong password" }))
        .send()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_login() {
    let cli = client(generous(), generous()).await;
    register(&cli, "alice").await;

    let resp = cli
        .post("/api/auth/login")
        .body_json(&json!({ "username": "alice", "password": "correct horse" }))
        .send()
        .await;
    resp.assert_status(StatusCode::CREATED);
    let cookie = resp
        .0
        .headers()
        .get(http::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_owned();

    let resp = cli.get("/api/info").header("Cookie", &cookie).send().await;
    resp.assert_status_is_ok();
    resp.json().await.value().object().get("username").assert_string("alice");

    cli.get("/api/todos")
        .header("Cookie", &cookie)
        .send()
        .await
        .assert_status_is_ok();

    cli.post("/api/auth/logout")
        .header("Cookie", &cookie)
        .send()
        .await
        .assert_status(StatusCode::CREATED);

    cli.get("/api/todos")
        .header("Cookie", &cookie)
        .send()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_login_is_rejected() {
    let cli = client(generous(), generous()).await;
    register(&cli, "alice").await;

    cli.post("/api/auth/login")
        .body_json(&json!({ "username": "alice", "password": "incorrect horse" }))
        .send()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_write_limit_rejects_with_retry_after() {
    let cli = client(generous(), bucket(1, Duration::from_secs(3600), 0)).await;
    let alice = register(&cli, "alice").await;
    let bob = register(&cli, "bob").await;

    create_todo(&cli, &alice, "one")
        .await
        .assert_status(StatusCode::CREATED);

    let resp = create_todo(&cli, &alice, "two").await;
    resp.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert!(retry_after(&resp) >= 1);
    let body: serde_json::Value =
        serde_json::from_slice(&resp.0.into_body().into_vec().await.unwrap()).unwrap();
    assert_eq!(
        body,
        json!({
            "title": "Too Many Requests",
            "detail": "Too many requests.",
            "status": 429,
        })
    );

    // Reads have their own budget
    cli.get("/api/todos")
        .header("Authorization", &alice)
        .send()
        .await
        .assert_status_is_ok();

    // Other users are unaffected
    create_todo(&cli, &bob, "bob's")
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_read_limit_is_per_user() {
    let cli = client(bucket(2, Duration::from_secs(3600), 0), generous()).await;
    let alice = register(&cli, "alice").await;

    for _ in 0..2 {
        cli.get("/api/todos")
            .header("Authorization", &alice)
            .send()
            .await
            .assert_status_is_ok();
    }
    cli.get("/api/todos")
        .header("Authorization", &alice)
        .send()
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    // Writes are still allowed
    create_todo(&cli, &alice, "still writable")
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_anonymous_requests_are_not_limited() {
    let limited = bucket(1, Duration::from_secs(3600), 0);
    let cli = client(limited.clone(), limited).await;

    for _ in 0..20 {
        cli.get("/api/info").send().await.assert_status_is_ok();
    }
}

#[tokio::test]
async fn test_write_admitted_after_replenishment() {
    let cli = client(generous(), bucket(1, Duration::from_secs(1), 0)).await;
    let alice = register(&cli, "alice").await;

    create_todo(&cli, &alice, "first")
        .await
        .assert_status(StatusCode::CREATED);

    let resp = create_todo(&cli, &alice, "second").await;
    resp.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(retry_after(&resp), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    create_todo(&cli, &alice, "third")
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_queued_write_waits_for_token() {
    let period = Duration::from_millis(300);
    let cli = client(generous(), bucket(1, period, 1)).await;
    let alice = register(&cli, "alice").await;

    // The write bucket is created by the first request and holds one token,
    // so the second write is only served by a refill one period later
    let started = Instant::now();
    create_todo(&cli, &alice, "first")
        .await
        .assert_status(StatusCode::CREATED);

    create_todo(&cli, &alice, "second")
        .await
        .assert_status(StatusCode::CREATED);
    assert!(started.elapsed() >= period - Duration::from_millis(20));
}
