use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use pixur_api::middleware::REQUEST_ID_HEADER;
use pixur_api::{AppStateInner, router};
use pixur_db::adapter::sqlite::SqliteAdapter;
use pixur_db::{DbAdapter, migrations};
use pixur_tasks::TaskRunner;
use pixur_types::{Configuration, Context};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> Router {
    app_with_timeout(None)
}

fn app_with_timeout(request_timeout: Option<Duration>) -> Router {
    let db = SqliteAdapter.open_for_test().unwrap();
    db.init_schema(&Context::new(), &migrations::schema(&SqliteAdapter))
        .unwrap();
    router(Arc::new(AppStateInner {
        runner: TaskRunner::new(db.adapter()),
        db,
        jwt_secret: "test-secret".into(),
        pix_path: std::env::temp_dir().join("pixur-api-test"),
        conf: Arc::new(Configuration::default()),
        request_timeout,
    }))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Signs up `ident` and returns a bearer token for it.
async fn signup(app: &Router, ident: &str) -> String {
    let creds = json!({ "ident": ident, "secret": "correct horse" });
    let (status, _) = call(app, Method::POST, "/api/users", None, Some(creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = call(app, Method::POST, "/api/auth", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn signup_then_lookup_self() {
    let app = app();
    let token = signup(&app, "alice").await;

    let (status, body) = call(&app, Method::GET, "/api/users/0", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ident"], "alice");
    assert!(body["capability"]
        .as_array()
        .unwrap()
        .contains(&json!("USER_READ_SELF")));

    let (status, body) = call(&app, Method::GET, "/api/users/0", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn auth_failures() {
    let app = app();
    signup(&app, "bob").await;

    let bad = json!({ "ident": "bob", "secret": "wrong" });
    let (status, _) = call(&app, Method::POST, "/api/auth", None, Some(bad)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let dup = json!({ "ident": "BOB", "secret": "x" });
    let (status, body) = call(&app, Method::POST, "/api/users", None, Some(dup)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_exists");

    let (status, _) = call(&app, Method::GET, "/api/users/0", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn update_self_is_version_gated() {
    let app = app();
    let token = signup(&app, "carol").await;
    let (_, me) = call(&app, Method::GET, "/api/users/0", Some(token.as_str()), None).await;
    let version = me["version"].as_i64().unwrap();

    let stale = json!({ "version": version - 1 });
    let (status, body) = call(&app, Method::PATCH, "/api/users/0", Some(token.as_str()), Some(stale)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "aborted");

    let fresh = json!({ "version": version });
    let (status, body) = call(&app, Method::PATCH, "/api/users/0", Some(token.as_str()), Some(fresh)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], version);

    let grab = json!({ "version": version, "set_capability": ["PIC_PURGE"] });
    let (status, _) = call(&app, Method::PATCH, "/api/users/0", Some(token.as_str()), Some(grab)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn pic_routes_report_task_failures() {
    let app = app();
    let token = signup(&app, "dave").await;

    let comment = json!({ "text": "hello" });
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/pics/12345/comments",
        Some(token.as_str()),
        Some(comment),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::POST, "/api/pics/12345/views", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::DELETE, "/api/pics/12345", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn user_events_page_keys() {
    let app = app();
    let token = signup(&app, "erin").await;

    let (status, body) = call(&app, Method::GET, "/api/users/0/events", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"], json!([]));
    assert_eq!(body["next"], Value::Null);

    let (status, _) = call(
        &app,
        Method::GET,
        "/api/users/0/events?start=%2A%2A",
        Some(token.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = app();
    let req = Request::builder()
        .uri("/api/users/0")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn expired_request_deadline_aborts_task() {
    let app = app_with_timeout(Some(Duration::ZERO));
    let creds = json!({ "ident": "frank", "secret": "correct horse" });
    let (status, body) = call(&app, Method::POST, "/api/users", None, Some(creds)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "aborted");
}
