//! Route-level tests: the full router driven through `tower::ServiceExt::oneshot`
//! against a temporary JSON store.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use democrm_api::crypto::sign_token;
use democrm_api::service::{AccountCredentials, now_unix};
use democrm_core::testing;
use democrm_server::storage::ClientStore;
use democrm_server::{AppConfig, AppState, build_router};

const SECRET: &str = "route-test-secret";

struct Harness {
    app: Router,
    store: ClientStore,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = ClientStore::open(dir.path().join("db.json")).await.unwrap();
    let state = AppState {
        store: store.clone(),
        config: AppConfig {
            jwt_secret: SECRET.into(),
            account: AccountCredentials {
                email: "admin@demo.com".into(),
                password: "@Passw0rd".into(),
            },
            token_ttl_secs: 1800,
        },
    };
    Harness {
        app: build_router(state),
        store,
        _dir: dir,
    }
}

async fn seed(store: &ClientStore, records: Vec<democrm_core::Record>) {
    store
        .mutate(move |clients| {
            clients.extend(records);
            Ok(())
        })
        .await
        .unwrap();
}

fn bearer() -> String {
    format!("Bearer {}", sign_token("admin@demo.com", SECRET, now_unix(), 1800))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, header::HeaderMap, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, bearer())
        .body(Body::empty())
        .unwrap()
}

fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn new_client(name: &str, email: &str, phone: &str) -> Value {
    json!({
        "name": name,
        "email": email,
        "phone": phone,
        "industry": "Finance",
        "monthlySpend": 120,
        "lifetimeValue": 1440
    })
}

// ---------------------------------------------------------------------------
// Public routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_public() {
    let h = harness().await;
    let req = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn login_issues_a_working_token() {
    let h = harness().await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"email": "admin@demo.com", "password": "@Passw0rd"}).to_string(),
        ))
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expiresIn"], 1800);

    let token = body["token"].as_str().unwrap();
    let req = Request::builder()
        .uri("/api/auth/verify")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], "admin@demo.com");
}

#[tokio::test]
async fn login_failures_carry_distinct_codes() {
    let h = harness().await;
    for (email, password, code) in [
        ("ghost@demo.com", "@Passw0rd", "email_not_found"),
        ("admin@demo.com", "hunter2", "incorrect_password"),
    ] {
        let req = Request::builder()
            .method("POST")
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"email": email, "password": password}).to_string()))
            .unwrap();
        let (status, _, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], code);
    }
}

// ---------------------------------------------------------------------------
// Auth gateway
// ---------------------------------------------------------------------------

#[tokio::test]
async fn protected_routes_require_a_token() {
    let h = harness().await;
    seed(&h.store, testing::named_records("A", 3)).await;

    for uri in ["/api/clients", "/api/clients/all", "/api/clients/a-0000"] {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "missing_token");
        assert!(!body.to_string().contains("a0@mail.test"));
    }
}

#[tokio::test]
async fn expired_or_forged_tokens_are_rejected() {
    let h = harness().await;
    seed(&h.store, testing::named_records("A", 3)).await;

    let expired = sign_token("admin@demo.com", SECRET, now_unix() - 3600, 1800);
    let forged = sign_token("admin@demo.com", "other-secret", now_unix(), 1800);
    for token in [expired, forged, "garbage".to_string()] {
        let req = Request::builder()
            .uri("/api/clients")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_or_expired_token");
        assert!(body.get("items").is_none());
        assert!(!body.to_string().contains("mail.test"));
    }
}

#[tokio::test]
async fn rejected_writes_do_not_mutate() {
    let h = harness().await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/clients")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            new_client("Sneaky", "s@mail.test", "5551112222").to_string(),
        ))
        .unwrap();
    let (status, _, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(h.store.load().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Paginated query endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn eleven_records_paginate_as_ten_then_one() {
    let h = harness().await;
    let mut records = testing::named_records("A", 11);
    records.reverse();
    seed(&h.store, records).await;

    let (status, headers, page1) = send(&h.app, get("/api/clients?_page=1&_limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-total-count"], "11");
    assert_eq!(page1.as_array().unwrap().len(), 10);
    assert_eq!(page1[0]["name"], "A0");
    assert_eq!(page1[1]["name"], "A1");
    assert_eq!(page1[2]["name"], "A10");

    let (_, headers, page2) = send(&h.app, get("/api/clients?_page=2&_limit=10")).await;
    assert_eq!(headers["x-total-count"], "11");
    assert_eq!(page2.as_array().unwrap().len(), 1);
    assert_eq!(page2[0]["name"], "A9");
}

#[tokio::test]
async fn defaults_are_first_page_of_ten() {
    let h = harness().await;
    seed(&h.store, testing::named_records("B", 15)).await;
    let (_, headers, body) = send(&h.app, get("/api/clients")).await;
    assert_eq!(body.as_array().unwrap().len(), 10);
    assert_eq!(headers["x-total-count"], "15");
}

#[tokio::test]
async fn filter_narrows_and_counts_matches() {
    let h = harness().await;
    let mut records = testing::named_records("C", 5);
    records[3].email = "unique.KASSULKE@mail.test".into();
    seed(&h.store, records).await;

    let (_, headers, body) = send(&h.app, get("/api/clients?q=kassulke")).await;
    assert_eq!(headers["x-total-count"], "1");
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], "c-0003");
}

#[tokio::test]
async fn page_past_the_end_is_empty_not_an_error() {
    let h = harness().await;
    seed(&h.store, testing::named_records("D", 3)).await;
    let (status, headers, body) = send(&h.app, get("/api/clients?_page=9")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-total-count"], "3");
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn zero_page_is_a_bad_request() {
    let h = harness().await;
    let (status, _, body) = send(&h.app, get("/api/clients?_page=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn identical_requests_are_byte_identical() {
    let h = harness().await;
    let mut records = testing::named_records("E", 6);
    for r in &mut records {
        r.name = "Same".into();
    }
    seed(&h.store, records).await;

    let a = h.app.clone().oneshot(get("/api/clients?_limit=4&q=same")).await.unwrap();
    let b = h.app.clone().oneshot(get("/api/clients?_limit=4&q=same")).await.unwrap();
    let a = axum::body::to_bytes(a.into_body(), usize::MAX).await.unwrap();
    let b = axum::body::to_bytes(b.into_body(), usize::MAX).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn all_returns_the_whole_collection() {
    let h = harness().await;
    seed(&h.store, testing::named_records("F", 23)).await;
    let (status, headers, body) = send(&h.app, get("/api/clients/all")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-total-count"], "23");
    assert_eq!(body.as_array().unwrap().len(), 23);
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_assigns_id_and_defaults() {
    let h = harness().await;
    let (status, _, body) = send(
        &h.app,
        with_json(
            "POST",
            "/api/clients",
            new_client("Acme", "acme@mail.test", "5551234567"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!body["id"].as_str().unwrap().is_empty());
    assert_eq!(body["status"], "prospect");

    let id = body["id"].as_str().unwrap().to_string();
    let (status, _, fetched) = send(&h.app, get(&format!("/api/clients/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Acme");
}

#[tokio::test]
async fn create_with_duplicate_email_is_rejected_before_mutation() {
    let h = harness().await;
    seed(&h.store, testing::named_records("G", 2)).await;

    let (status, _, body) = send(
        &h.app,
        with_json(
            "POST",
            "/api/clients",
            new_client("Copycat", "G1@MAIL.TEST", "5559998888"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_field");
    assert_eq!(body["duplicate"]["field"], "email");
    assert_eq!(body["duplicate"]["conflictingId"], "g-0001");
    assert_eq!(h.store.load().await.unwrap().len(), 2);
}

#[tokio::test]
async fn create_with_invalid_fields_lists_each_failure() {
    let h = harness().await;
    let (status, _, body) = send(
        &h.app,
        with_json("POST", "/api/clients", new_client("A", "not-an-email", "12")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_failed");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "email", "phone"]);
    assert!(h.store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_keeps_own_email_and_uses_path_id() {
    let h = harness().await;
    seed(&h.store, testing::named_records("H", 2)).await;

    let mut body = new_client("H0 Renamed", "h0@mail.test", "5550000000");
    body["id"] = json!("something-else");
    let (status, _, updated) =
        send(&h.app, with_json("PUT", "/api/clients/h-0000", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["id"], "h-0000");
    assert_eq!(updated["name"], "H0 Renamed");

    let stored = h.store.load().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|r| r.name == "H0 Renamed"));
}

#[tokio::test]
async fn update_into_another_records_phone_conflicts() {
    let h = harness().await;
    seed(&h.store, testing::named_records("I", 2)).await;
    let (status, _, body) = send(
        &h.app,
        with_json(
            "PUT",
            "/api/clients/i-0000",
            new_client("I0", "i0@mail.test", "5550000001"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["duplicate"]["field"], "phone");
}

#[tokio::test]
async fn update_and_delete_unknown_ids_are_not_found() {
    let h = harness().await;
    let (status, _, _) = send(
        &h.app,
        with_json(
            "PUT",
            "/api/clients/missing",
            new_client("Nobody", "n@mail.test", "5550001111"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/clients/missing")
        .header(header::AUTHORIZATION, bearer())
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn delete_removes_the_record() {
    let h = harness().await;
    seed(&h.store, testing::named_records("J", 2)).await;
    let req = Request::builder()
        .method("DELETE")
        .uri("/api/clients/j-0001")
        .header(header::AUTHORIZATION, bearer())
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(h.store.load().await.unwrap().len(), 1);
}
