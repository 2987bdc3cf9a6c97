//! Router-level API tests

use super::*;
use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
};
use chrono::{Duration, NaiveDate, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use crate::services::local_today;

struct TestApp {
    router: Router,
    state: AppState,
    _uploads: TempDir,
    _static: TempDir,
}

const PAGES: [&str; 8] = [
    "index", "journal", "goals", "todos", "stats", "settings", "login", "register",
];

async fn setup_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let uploads = TempDir::new().unwrap();
    let static_dir = TempDir::new().unwrap();
    for page in PAGES {
        std::fs::write(
            static_dir.path().join(format!("{page}.html")),
            format!("<html><body data-page=\"{page}\"></body></html>"),
        )
        .unwrap();
    }

    let mut config = Config::for_tests(uploads.path().to_path_buf(), static_dir.path().to_path_buf());
    configure(&mut config);

    let db = db::create_pool(&config.database_url, 1).await.unwrap();
    db::run_migrations(&db).await.unwrap();

    let state = AppState::new(db, Arc::new(config)).unwrap();
    let router = app(state.clone()).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

    TestApp {
        router,
        state,
        _uploads: uploads,
        _static: static_dir,
    }
}

async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

async fn send_raw(app: &TestApp, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.router.clone().oneshot(request).await.unwrap()
}

async fn send(app: &TestApp, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let response = send_raw(app, method, uri, cookie, body).await;
    let status = response.status();
    (status, body_json(response).await)
}

fn session_cookie(response: &Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("daybook_session="))
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string()
}

/// Registers `username` and returns its session cookie.
async fn register(app: &TestApp, username: &str) -> String {
    let response = send_raw(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": username, "password": "correct horse battery" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    session_cookie(&response)
}

async fn user_id(app: &TestApp, cookie: &str) -> Uuid {
    let (_, me) = send(app, "GET", "/api/auth/me", Some(cookie), None).await;
    me["id"].as_str().unwrap().parse().unwrap()
}

async fn insert_activity(app: &TestApp, user_id: Uuid, date: NaiveDate) {
    sqlx::query(
        r#"
        INSERT INTO activity_log (id, user_id, activity_type, activity_date, detail, created_at)
        VALUES ($1, $2, 'journal', $3, NULL, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(date)
    .bind(Utc::now())
    .execute(&app.state.db)
    .await
    .unwrap();
}

// ========== Health & gates ==========

#[tokio::test]
async fn test_health() {
    let app = setup().await;
    let (status, json) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");

    let (status, json) = send(&app, "GET", "/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["checks"]["database"], "ok");
}

#[tokio::test]
async fn test_api_requires_session() {
    let app = setup().await;
    for uri in ["/api/journal", "/api/goals", "/api/todos", "/api/stats/streak", "/api/auth/me"] {
        let (status, json) = send(&app, "GET", uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(json["error"]["code"], 401);
    }

    let (status, _) = send(&app, "GET", "/api/journal", Some("daybook_session=garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_pages_redirect_to_login() {
    let app = setup().await;

    let response = send_raw(&app, "GET", "/journal", None, None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");

    let response = send_raw(&app, "GET", "/login", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = register(&app, "pages").await;
    let response = send_raw(&app, "GET", "/journal", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&bytes).contains("data-page=\"journal\""));

    let response = send_raw(&app, "GET", "/login", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
}

// ========== Auth ==========

#[tokio::test]
async fn test_register_and_login() {
    let app = setup().await;
    let cookie = register(&app, "alice").await;

    let (status, me) = send(&app, "GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert!(me.get("password_hash").is_none());

    let (status, json) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "another password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], 409);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = send_raw(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "correct horse battery" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let second = session_cookie(&response);
    let (status, _) = send(&app, "GET", "/api/auth/me", Some(&second), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_validation() {
    let app = setup().await;
    let (status, json) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": "no spaces allowed", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["fields"]["username"].is_array());
    assert!(json["error"]["fields"]["password"].is_array());

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let app = setup().await;
    let cookie = register(&app, "bob").await;

    let (status, _) = send(&app, "POST", "/api/auth/logout", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_token_accepted() {
    let app = setup().await;
    let cookie = register(&app, "bearer").await;
    let token = cookie.trim_start_matches("daybook_session=");

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_revokes_other_sessions() {
    let app = setup().await;
    let first = register(&app, "carol").await;
    let response = send_raw(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "carol", "password": "correct horse battery" })),
    )
    .await;
    let second = session_cookie(&response);

    let (status, _) = send(
        &app,
        "PUT",
        "/api/auth/password",
        Some(&first),
        Some(json!({ "current_password": "nope", "new_password": "new secret phrase" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        "PUT",
        "/api/auth/password",
        Some(&first),
        Some(json!({ "current_password": "correct horse battery", "new_password": "new secret phrase" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["revoked_sessions"], 1);

    let (status, _) = send(&app, "GET", "/api/auth/me", Some(&first), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/api/auth/me", Some(&second), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "carol", "password": "new secret phrase" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_delete_account_cascades() {
    let app = setup().await;
    let cookie = register(&app, "dave").await;
    let id = user_id(&app, &cookie).await;
    send(&app, "POST", "/api/journal", Some(&cookie), Some(json!({ "content": "bye" }))).await;

    let (status, _) = send(
        &app,
        "DELETE",
        "/api/auth/account",
        Some(&cookie),
        Some(json!({ "password": "correct horse battery" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let remaining = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM journal_entries WHERE user_id = $1")
        .bind(id)
        .fetch_one(&app.state.db)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_auth_rate_limit() {
    let app = setup_with(|c| c.auth_rate_limit = 2).await;
    let body = json!({ "username": "nobody", "password": "whatever123" });

    for _ in 0..2 {
        let (status, _) = send(&app, "POST", "/api/auth/login", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, json) = send(&app, "POST", "/api/auth/login", None, Some(body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"]["code"], 429);
}

// ========== Journal ==========

#[tokio::test]
async fn test_journal_empty_content_rejected() {
    let app = setup().await;
    let cookie = register(&app, "writer").await;

    let (status, json) = send(&app, "POST", "/api/journal", Some(&cookie), Some(json!({ "content": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["fields"]["content"].is_array());

    let (status, _) = send(&app, "POST", "/api/journal", Some(&cookie), Some(json!({ "title": "only" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = send(&app, "GET", "/api/journal", Some(&cookie), None).await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_journal_create_appears_in_listing() {
    let app = setup().await;
    let cookie = register(&app, "writer").await;

    let (status, created) = send(
        &app,
        "POST",
        "/api/journal",
        Some(&cookie),
        Some(json!({ "title": "Morning", "content": "Went for a long walk", "mood": "great" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["mood"], "great");
    assert_eq!(created["entry_date"], local_today().to_string());

    send(
        &app,
        "POST",
        "/api/journal",
        Some(&cookie),
        Some(json!({ "content": "Rainy day indoors", "entry_date": "2026-01-05" })),
    )
    .await;

    let (_, list) = send(&app, "GET", "/api/journal", Some(&cookie), None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert!(list.iter().any(|e| e["id"] == id.as_str()));

    let (_, found) = send(&app, "GET", "/api/journal?q=walk", Some(&cookie), None).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["id"], id.as_str());

    // Wildcard characters in the search text match literally.
    let (_, percent) = send(&app, "GET", "/api/journal?q=%25", Some(&cookie), None).await;
    assert_eq!(percent.as_array().unwrap().len(), 0);
    let (_, underscore) = send(&app, "GET", "/api/journal?q=_", Some(&cookie), None).await;
    assert_eq!(underscore.as_array().unwrap().len(), 0);

    let (_, by_mood) = send(&app, "GET", "/api/journal?mood=okay", Some(&cookie), None).await;
    assert_eq!(by_mood.as_array().unwrap().len(), 1);
    assert_eq!(by_mood[0]["mood"], "okay");

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/journal/{id}"),
        Some(&cookie),
        Some(json!({ "mood": "bad", "mood_note": "tired" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["mood"], "bad");
    assert_eq!(updated["content"], "Went for a long walk");

    let (status, _) = send(&app, "DELETE", &format!("/api/journal/{id}"), Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &format!("/api/journal/{id}"), Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn multipart_body(boundary: &str, files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, content_type, bytes) in files {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"images\"; filename=\"{filename}\"\r\n").as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

async fn upload(app: &TestApp, cookie: &str, entry_id: &str, files: &[(&str, &str, &[u8])]) -> (StatusCode, Value) {
    let boundary = "daybook-test-boundary";
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/journal/{entry_id}/images"))
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(multipart_body(boundary, files)))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn test_journal_image_upload_and_serving() {
    let app = setup().await;
    let owner = register(&app, "photographer").await;
    let stranger = register(&app, "stranger").await;

    let (_, entry) = send(&app, "POST", "/api/journal", Some(&owner), Some(json!({ "content": "pics" }))).await;
    let entry_id = entry["id"].as_str().unwrap().to_string();

    let png: &[u8] = b"\x89PNG\r\n\x1a\nfake";
    let (status, images) = upload(&app, &owner, &entry_id, &[("beach.png", "image/png", png)]).await;
    assert_eq!(status, StatusCode::CREATED);
    let url = images[0]["url"].as_str().unwrap().to_string();
    let filename = images[0]["filename"].as_str().unwrap().to_string();
    assert!(filename.ends_with(".png"));
    assert_eq!(images[0]["original_name"], "beach.png");
    assert!(app.state.config.upload_dir.join(&filename).exists());

    let response = send_raw(&app, "GET", &url, Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

    let (status, _) = send(&app, "GET", &url, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = upload(&app, &stranger, &entry_id, &[("x.png", "image/png", png)]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = upload(&app, &owner, &entry_id, &[("notes.txt", "text/plain", b"hello")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, fetched) = send(&app, "GET", &format!("/api/journal/{entry_id}"), Some(&owner), None).await;
    assert_eq!(fetched["images"].as_array().unwrap().len(), 1);

    let image_id = images[0]["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/journal/{entry_id}/images/{image_id}"),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.state.config.upload_dir.join(&filename).exists());
}

// ========== Goals ==========

#[tokio::test]
async fn test_milestone_progress() {
    let app = setup().await;
    let cookie = register(&app, "planner").await;

    let (status, goal) = send(
        &app,
        "POST",
        "/api/goals",
        Some(&cookie),
        Some(json!({ "title": "Run a half marathon", "goal_type": "long-term" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(goal["progress"], 0);
    assert_eq!(goal["status"], "active");
    let goal_id = goal["id"].as_str().unwrap().to_string();

    let mut milestone_ids = Vec::new();
    for title in ["5k", "10k", "15k"] {
        let (status, change) = send(
            &app,
            "POST",
            &format!("/api/goals/{goal_id}/milestones"),
            Some(&cookie),
            Some(json!({ "title": title })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        milestone_ids.push(change["milestone"]["id"].as_str().unwrap().to_string());
    }

    for (i, expected) in [(0, 33), (1, 67)] {
        let (status, change) = send(
            &app,
            "POST",
            &format!("/api/goals/{goal_id}/milestones/{}/toggle", milestone_ids[i]),
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(change["goal_progress"], expected);
    }

    let (_, goal) = send(&app, "GET", &format!("/api/goals/{goal_id}"), Some(&cookie), None).await;
    assert_eq!(goal["progress"], 67);
    assert_eq!(goal["milestones_total"], 3);
    assert_eq!(goal["milestones_completed"], 2);

    let (_, change) = send(
        &app,
        "DELETE",
        &format!("/api/goals/{goal_id}/milestones/{}", milestone_ids[2]),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(change["goal_progress"], 100);

    let (_, change) = send(
        &app,
        "POST",
        &format!("/api/goals/{goal_id}/milestones/{}/toggle", milestone_ids[0]),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(change["goal_progress"], 50);
    assert_eq!(change["milestone"]["completed"], false);
}

#[tokio::test]
async fn test_goal_manual_progress_and_completion() {
    let app = setup().await;
    let cookie = register(&app, "manual").await;

    let (_, goal) = send(&app, "POST", "/api/goals", Some(&cookie), Some(json!({ "title": "Read 10 books" }))).await;
    let goal_id = goal["id"].as_str().unwrap().to_string();
    assert_eq!(goal["goal_type"], "short-term");

    let (status, goal) = send(
        &app,
        "PUT",
        &format!("/api/goals/{goal_id}"),
        Some(&cookie),
        Some(json!({ "progress": 40 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goal["progress"], 40);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/goals/{goal_id}"),
        Some(&cookie),
        Some(json!({ "progress": 150 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, goal) = send(
        &app,
        "PUT",
        &format!("/api/goals/{goal_id}"),
        Some(&cookie),
        Some(json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(goal["status"], "completed");
    assert_eq!(goal["progress"], 100);

    let (_, active) = send(&app, "GET", "/api/goals?status=active", Some(&cookie), None).await;
    assert_eq!(active.as_array().unwrap().len(), 0);
    let (_, completed) = send(&app, "GET", "/api/goals?status=completed", Some(&cookie), None).await;
    assert_eq!(completed.as_array().unwrap().len(), 1);
}

// ========== Todos ==========

#[tokio::test]
async fn test_todo_toggle_twice_restores_state() {
    let app = setup().await;
    let cookie = register(&app, "doer").await;
    let today = local_today().to_string();

    let (status, todo) = send(
        &app,
        "POST",
        "/api/todos",
        Some(&cookie),
        Some(json!({ "title": "Water plants", "scheduled_date": today })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(todo["completed"], false);
    assert_eq!(todo["priority"], "medium");
    let id = todo["id"].as_str().unwrap().to_string();

    let (_, toggled) = send(&app, "POST", &format!("/api/todos/{id}/toggle"), Some(&cookie), None).await;
    assert_eq!(toggled["completed"], true);
    assert!(toggled["completed_at"].is_string());

    let (_, toggled) = send(&app, "POST", &format!("/api/todos/{id}/toggle"), Some(&cookie), None).await;
    assert_eq!(toggled["completed"], false);
    assert!(toggled["completed_at"].is_null());

    let (_, fetched) = send(&app, "GET", &format!("/api/todos/{id}"), Some(&cookie), None).await;
    assert_eq!(fetched["completed"], false);
}

#[tokio::test]
async fn test_todo_validation() {
    let app = setup().await;
    let cookie = register(&app, "doer").await;

    let (status, json) = send(&app, "POST", "/api/todos", Some(&cookie), Some(json!({ "title": "No date" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["fields"]["scheduled_date"].is_array());

    let (status, _) = send(
        &app,
        "POST",
        "/api/todos",
        Some(&cookie),
        Some(json!({ "title": " ", "scheduled_date": "2026-03-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/todos",
        Some(&cookie),
        Some(json!({ "title": "Bad priority", "scheduled_date": "2026-03-01", "priority": "critical" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_todo_priority_ordering() {
    let app = setup().await;
    let cookie = register(&app, "sorter").await;
    let today = local_today().to_string();

    for (title, priority) in [("low", "low"), ("urgent", "urgent"), ("medium", "medium"), ("high", "high")] {
        send(
            &app,
            "POST",
            "/api/todos",
            Some(&cookie),
            Some(json!({ "title": title, "priority": priority, "scheduled_date": today })),
        )
        .await;
    }

    let (_, list) = send(&app, "GET", &format!("/api/todos?date={today}"), Some(&cookie), None).await;
    let titles: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["urgent", "high", "medium", "low"]);

    let (_, today_view) = send(&app, "GET", "/api/todos/today", Some(&cookie), None).await;
    assert_eq!(today_view["today"][0]["title"], "urgent");
    assert_eq!(today_view["overdue"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_todo_status_filter_and_overdue() {
    let app = setup().await;
    let cookie = register(&app, "filter").await;
    let yesterday = (local_today() - Duration::days(1)).to_string();
    let today = local_today().to_string();

    send(&app, "POST", "/api/todos", Some(&cookie), Some(json!({ "title": "late", "scheduled_date": yesterday }))).await;
    let (_, done) = send(&app, "POST", "/api/todos", Some(&cookie), Some(json!({ "title": "done", "scheduled_date": today }))).await;
    let done_id = done["id"].as_str().unwrap();
    send(&app, "POST", &format!("/api/todos/{done_id}/toggle"), Some(&cookie), None).await;

    let (_, pending) = send(&app, "GET", "/api/todos?status=pending", Some(&cookie), None).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["title"], "late");

    let (_, completed) = send(&app, "GET", "/api/todos?status=completed", Some(&cookie), None).await;
    assert_eq!(completed.as_array().unwrap().len(), 1);

    let (_, today_view) = send(&app, "GET", "/api/todos/today", Some(&cookie), None).await;
    assert_eq!(today_view["overdue"][0]["title"], "late");

    let (_, check) = send(&app, "GET", "/api/notifications/check", Some(&cookie), None).await;
    let kinds: Vec<&str> = check["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"overdue_todos"));
    assert!(kinds.contains(&"motivation"));
}

// ========== Ownership ==========

#[tokio::test]
async fn test_ownership_isolation() {
    let app = setup().await;
    let owner = register(&app, "owner").await;
    let other = register(&app, "other").await;

    let (_, entry) = send(&app, "POST", "/api/journal", Some(&owner), Some(json!({ "content": "private" }))).await;
    let (_, goal) = send(&app, "POST", "/api/goals", Some(&owner), Some(json!({ "title": "mine" }))).await;
    let (_, todo) = send(
        &app,
        "POST",
        "/api/todos",
        Some(&owner),
        Some(json!({ "title": "mine", "scheduled_date": "2026-03-01" })),
    )
    .await;

    let resources = [
        (format!("/api/journal/{}", entry["id"].as_str().unwrap()), json!({ "content": "hijack" })),
        (format!("/api/goals/{}", goal["id"].as_str().unwrap()), json!({ "title": "hijack" })),
        (format!("/api/todos/{}", todo["id"].as_str().unwrap()), json!({ "title": "hijack" })),
    ];

    for (uri, update) in &resources {
        let (status, _) = send(&app, "GET", uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "GET {uri}");
        let (status, _) = send(&app, "PUT", uri, Some(&other), Some(update.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "PUT {uri}");
        let (status, _) = send(&app, "DELETE", uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "DELETE {uri}");
        let (status, _) = send(&app, "GET", uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK, "owner GET {uri}");
    }

    let goal_id = goal["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/goals/{goal_id}/milestones"),
        Some(&other),
        Some(json!({ "title": "sneaky" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, change) = send(
        &app,
        "POST",
        &format!("/api/goals/{goal_id}/milestones"),
        Some(&owner),
        Some(json!({ "title": "first step" })),
    )
    .await;
    let milestone_uri = format!("/api/goals/{goal_id}/milestones/{}", change["milestone"]["id"].as_str().unwrap());
    let (status, _) = send(&app, "POST", &format!("{milestone_uri}/toggle"), Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "PUT", &milestone_uri, Some(&other), Some(json!({ "title": "hijack" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", &milestone_uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, owned_goal) = send(&app, "GET", &format!("/api/goals/{goal_id}"), Some(&owner), None).await;
    assert_eq!(owned_goal["milestones"][0]["title"], "first step");
    assert_eq!(owned_goal["milestones"][0]["completed"], false);

    let entry_id = entry["id"].as_str().unwrap();
    let (status, images) = upload(&app, &owner, entry_id, &[("photo.png", "image/png", b"png-bytes")]).await;
    assert_eq!(status, StatusCode::CREATED);
    let image_uri = format!("/api/journal/{entry_id}/images/{}", images[0]["id"].as_str().unwrap());
    let (status, _) = send(&app, "DELETE", &image_uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, owned_entry) = send(&app, "GET", &format!("/api/journal/{entry_id}"), Some(&owner), None).await;
    assert_eq!(owned_entry["images"].as_array().unwrap().len(), 1);

    let (_, others_list) = send(&app, "GET", "/api/journal", Some(&other), None).await;
    assert_eq!(others_list.as_array().unwrap().len(), 0);
}

// ========== Stats ==========

#[tokio::test]
async fn test_streak_counts_consecutive_days() {
    let app = setup().await;
    let cookie = register(&app, "streaker").await;
    let id = user_id(&app, &cookie).await;
    let today = local_today();

    for offset in [0, 1, 2, 4] {
        insert_activity(&app, id, today - Duration::days(offset)).await;
    }

    let (status, streak) = send(&app, "GET", "/api/stats/streak", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(streak["current_streak"], 3);
    assert_eq!(streak["longest_streak"], 3);
    assert_eq!(streak["active_today"], true);
}

#[tokio::test]
async fn test_streak_includes_journal_dates_and_ignores_logins() {
    let app = setup().await;
    let cookie = register(&app, "mixed").await;
    let yesterday = local_today() - Duration::days(1);
    let before = local_today() - Duration::days(2);

    send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "mixed", "password": "correct horse battery" })),
    )
    .await;
    let (_, streak) = send(&app, "GET", "/api/stats/streak", Some(&cookie), None).await;
    assert_eq!(streak["current_streak"], 0);

    for date in [yesterday, before] {
        sqlx::query(
            r#"
            INSERT INTO journal_entries (id, user_id, content, mood, entry_date, created_at, updated_at)
            VALUES ($1, $2, 'backfill', 'okay', $3, $4, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id(&app, &cookie).await)
        .bind(date)
        .bind(Utc::now())
        .execute(&app.state.db)
        .await
        .unwrap();
    }

    let (_, streak) = send(&app, "GET", "/api/stats/streak", Some(&cookie), None).await;
    assert_eq!(streak["current_streak"], 2);
    assert_eq!(streak["active_today"], false);
}

#[tokio::test]
async fn test_heatmap_overview_and_mood() {
    let app = setup().await;
    let cookie = register(&app, "stats").await;
    let today = local_today().to_string();

    send(&app, "POST", "/api/journal", Some(&cookie), Some(json!({ "content": "one", "mood": "great" }))).await;
    send(&app, "POST", "/api/journal", Some(&cookie), Some(json!({ "content": "two", "mood": "bad" }))).await;
    let (_, todo) = send(&app, "POST", "/api/todos", Some(&cookie), Some(json!({ "title": "t", "scheduled_date": today }))).await;
    let todo_id = todo["id"].as_str().unwrap();
    send(&app, "POST", &format!("/api/todos/{todo_id}/toggle"), Some(&cookie), None).await;

    let (status, heatmap) = send(&app, "GET", "/api/stats/heatmap?days=30", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let days = heatmap["days"].as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0]["date"], today.as_str());
    assert_eq!(days[0]["count"], 3);
    assert_eq!(days[0]["breakdown"]["journal"], 2);
    assert_eq!(days[0]["breakdown"]["todo_completed"], 1);
    assert!(days[0]["breakdown"].get("login").is_none());

    let (status, overview) = send(&app, "GET", "/api/stats/overview", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["journal"]["total"], 2);
    assert_eq!(overview["todos"]["completed_today"], 1);
    assert_eq!(overview["todos"]["pending"], 0);
    assert_eq!(overview["streak"]["current_streak"], 1);

    let (status, mood) = send(&app, "GET", "/api/stats/mood", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mood["points"].as_array().unwrap().len(), 2);
    assert_eq!(mood["average"], 3.5);
}

#[tokio::test]
async fn test_export_is_attachment() {
    let app = setup().await;
    let cookie = register(&app, "exporter").await;
    send(&app, "POST", "/api/journal", Some(&cookie), Some(json!({ "content": "keep me" }))).await;

    let response = send_raw(&app, "GET", "/api/stats/export", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("daybook-exporter-"));

    let json = body_json(response).await;
    assert_eq!(json["profile"]["username"], "exporter");
    assert_eq!(json["journal"][0]["content"], "keep me");
    assert_eq!(json["notification_settings"]["pending_threshold"], 3);
    assert!(json["activity_log"].as_array().unwrap().len() >= 1);
}

// ========== Notifications & AI ==========

#[tokio::test]
async fn test_notification_settings() {
    let app = setup().await;
    let cookie = register(&app, "notified").await;

    let (status, settings) = send(&app, "GET", "/api/notifications/settings", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["reminder_enabled"], true);
    assert_eq!(settings["reminder_times"], json!(["09:00", "20:00"]));
    assert_eq!(settings["pending_threshold"], 3);

    let (status, json) = send(
        &app,
        "PUT",
        "/api/notifications/settings",
        Some(&cookie),
        Some(json!({ "reminder_times": ["7am"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]["fields"]["reminder_times"].is_array());

    let (status, settings) = send(
        &app,
        "PUT",
        "/api/notifications/settings",
        Some(&cookie),
        Some(json!({ "reminder_times": ["21:30", "07:15", "21:30"], "pending_threshold": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["reminder_times"], json!(["07:15", "21:30"]));
    assert_eq!(settings["pending_threshold"], 5);
    assert_eq!(settings["motivation_enabled"], true);
}

#[tokio::test]
async fn test_ai_endpoints_fall_back_without_key() {
    let app = setup().await;
    let cookie = register(&app, "inspired").await;

    let (status, quote) = send(&app, "GET", "/api/ai/quote", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["source"], "fallback");
    assert!(!quote["text"].as_str().unwrap().is_empty());

    let (status, tip) = send(&app, "GET", "/api/ai/tip", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tip["source"], "fallback");

    let (status, _) = send(&app, "GET", "/api/ai/quote", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
