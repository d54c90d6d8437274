//! In-process stand-in for the Peloton authorization and API hosts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use peloton_client::{ClientConfig, Credentials, generate_code_challenge};
use serde_json::{Value, json};
use url::Url;

pub const EMAIL: &str = "rider@example.com";
pub const PASSWORD: &str = "correct horse";
pub const CALLBACK: &str = "https://members.onepeloton.com/callback";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    /// Credential POST answers with a `Location` carrying `code=abc123`.
    Redirect,
    /// Credential POST answers with a callback form; the replay redirects
    /// twice and ends at `code=def456`.
    Form,
    /// Like `Form`, but the redirect chain never produces a code.
    EndlessRedirects,
}

pub struct Mock {
    pub mode: LoginMode,
    pub set_csrf: AtomicBool,
    pub issue_refresh_token: AtomicBool,
    pub reject_all_api: AtomicBool,
    pub instructor_fails: AtomicBool,
    pub ride: Mutex<Value>,
    pub valid_access: Mutex<String>,
    pub challenge: Mutex<String>,
    pub submitted: Mutex<Option<Value>>,
    pub exchanged_code: Mutex<Option<String>>,
    pub workouts_query: Mutex<HashMap<String, String>>,
    pub every_n: Mutex<Vec<Option<String>>>,
    pub authorize_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub callback_calls: AtomicUsize,
    pub hop_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub instructor_calls: AtomicUsize,
}

impl Mock {
    pub fn new(mode: LoginMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            set_csrf: AtomicBool::new(true),
            issue_refresh_token: AtomicBool::new(true),
            reject_all_api: AtomicBool::new(false),
            instructor_fails: AtomicBool::new(false),
            ride: Mutex::new(json!({ "title": "30 min Pop Ride", "instructor_id": "inst-1" })),
            valid_access: Mutex::new("access-1".into()),
            challenge: Mutex::new(String::new()),
            submitted: Mutex::new(None),
            exchanged_code: Mutex::new(None),
            workouts_query: Mutex::new(HashMap::new()),
            every_n: Mutex::new(Vec::new()),
            authorize_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            callback_calls: AtomicUsize::new(0),
            hop_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            instructor_calls: AtomicUsize::new(0),
        })
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Makes the currently issued access token stale.
    pub fn expire_access_token(&self) {
        *self.valid_access.lock().unwrap() = "no-longer-issued".into();
    }

    pub fn submitted_field(&self, key: &str) -> Option<String> {
        self.submitted
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|body| body.get(key))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

/// Start the mock on a random port and return its base URL.
pub async fn start(mock: Arc<Mock>) -> Url {
    let app = Router::new()
        .route("/authorize", get(authorize))
        .route("/login", get(|| async { Html("<html><body>login page</body></html>") }))
        .route("/usernamepassword/login", post(submit_credentials))
        .route("/login/callback", post(callback))
        .route("/authorize/resume", get(resume))
        .route("/hop/{n}", get(hop))
        .route("/oauth/token", post(token))
        .route("/api/me", get(me))
        .route("/api/user/{id}/settings", get(settings))
        .route("/api/user/{id}/workouts", get(workouts))
        .route("/api/workout/{id}", get(workout))
        .route("/api/workout/{id}/performance_graph", get(performance_graph))
        .route("/api/instructor/{id}", get(instructor))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/").parse().unwrap()
}

pub fn config(base: &Url) -> ClientConfig {
    ClientConfig::default()
        .with_auth_base(base.clone())
        .with_api_base(base.clone())
}

pub fn credentials() -> Credentials {
    Credentials::new(EMAIL, PASSWORD)
}

// ── Authorization host ─────────────────────────────────────────────

async fn authorize(
    State(mock): State<Arc<Mock>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    mock.authorize_calls.fetch_add(1, Ordering::SeqCst);
    assert_eq!(params.get("code_challenge_method").map(String::as_str), Some("S256"));
    assert_eq!(params.get("response_type").map(String::as_str), Some("code"));
    assert!(params.contains_key("nonce"));
    assert!(params.contains_key("state"));
    *mock.challenge.lock().unwrap() = params.get("code_challenge").cloned().unwrap_or_default();

    let mut response = Redirect::to("/login?state=provider-state&client=test").into_response();
    if mock.set_csrf.load(Ordering::SeqCst) {
        let headers = response.headers_mut();
        headers.append(SET_COOKIE, HeaderValue::from_static("_csrf=root-csrf; Path=/"));
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("_csrf=scoped-csrf; Path=/usernamepassword"),
        );
    }
    response
}

async fn submit_credentials(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Response {
    mock.login_calls.fetch_add(1, Ordering::SeqCst);
    *mock.submitted.lock().unwrap() = Some(body.clone());

    if body["username"] != EMAIL || body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "name": "ValidationError", "description": "Wrong email or password." })),
        )
            .into_response();
    }

    let form = Html(
        r#"<html><body>
            <form method="post" name="hiddenform" action="/login/callback">
              <input type="hidden" name="wa" value="wsignin1.0">
              <input type="hidden" name="wresult" value="xyz">
              <input type="submit" value="Submit">
            </form>
        </body></html>"#,
    );

    match mock.mode {
        LoginMode::Redirect => (
            StatusCode::FOUND,
            [(LOCATION, format!("{CALLBACK}?state=provider-state&code=abc123"))],
            form,
        )
            .into_response(),
        LoginMode::Form | LoginMode::EndlessRedirects => form.into_response(),
    }
}

async fn callback(State(mock): State<Arc<Mock>>, body: Bytes) -> Response {
    mock.callback_calls.fetch_add(1, Ordering::SeqCst);
    let fields: HashMap<String, String> = url::form_urlencoded::parse(&body).into_owned().collect();
    assert_eq!(fields.get("wresult").map(String::as_str), Some("xyz"));
    assert_eq!(fields.get("wa").map(String::as_str), Some("wsignin1.0"));

    let next = match mock.mode {
        LoginMode::EndlessRedirects => "/hop/0",
        _ => "/authorize/resume?state=provider-state",
    };
    (StatusCode::FOUND, [(LOCATION, next)]).into_response()
}

async fn resume() -> Response {
    (
        StatusCode::FOUND,
        [(LOCATION, format!("{CALLBACK}?state=provider-state&code=def456"))],
    )
        .into_response()
}

async fn hop(State(mock): State<Arc<Mock>>, Path(n): Path<usize>) -> Response {
    mock.hop_calls.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FOUND, [(LOCATION, format!("/hop/{}", n + 1))]).into_response()
}

async fn token(State(mock): State<Arc<Mock>>, headers: HeaderMap, body: Bytes) -> Response {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    let params: HashMap<String, String> = if is_json {
        serde_json::from_slice(&body).unwrap()
    } else {
        url::form_urlencoded::parse(&body).into_owned().collect()
    };

    match params.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            mock.exchange_calls.fetch_add(1, Ordering::SeqCst);
            let verifier = params.get("code_verifier").cloned().unwrap_or_default();
            if generate_code_challenge(&verifier) != *mock.challenge.lock().unwrap() {
                return (StatusCode::FORBIDDEN, Json(json!({ "error": "invalid_grant" })))
                    .into_response();
            }
            *mock.exchanged_code.lock().unwrap() = params.get("code").cloned();

            let mut body = json!({ "access_token": "access-1", "token_type": "Bearer" });
            if mock.issue_refresh_token.load(Ordering::SeqCst) {
                body["refresh_token"] = json!("refresh-1");
            }
            *mock.valid_access.lock().unwrap() = "access-1".into();
            Json(body).into_response()
        }
        Some("refresh_token") => {
            let n = mock.refresh_calls.fetch_add(1, Ordering::SeqCst) + 2;
            assert_eq!(params.get("refresh_token").map(String::as_str), Some("refresh-1"));
            let access = format!("access-{n}");
            *mock.valid_access.lock().unwrap() = access.clone();
            // No rotated refresh token in the response.
            Json(json!({ "access_token": access, "token_type": "Bearer" })).into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

// ── API host ───────────────────────────────────────────────────────

fn authorized(mock: &Mock, headers: &HeaderMap) -> bool {
    if mock.reject_all_api.load(Ordering::SeqCst) {
        return false;
    }
    assert_eq!(
        headers.get("peloton-platform").and_then(|v| v.to_str().ok()),
        Some("web")
    );
    let expected = format!("Bearer {}", mock.valid_access.lock().unwrap());
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(expected.as_str())
}

async fn me(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    mock.me_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&mock, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "id": "user-1", "username": "pedal_pusher", "total_workouts": 120 }))
        .into_response()
}

async fn settings(
    State(mock): State<Arc<Mock>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&mock, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    assert_eq!(id, "user-1");
    Json(json!({ "distance_unit": "metric", "is_strava_autoshare_enabled": false }))
        .into_response()
}

async fn workouts(
    State(mock): State<Arc<Mock>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&mock, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    assert_eq!(id, "user-1");
    *mock.workouts_query.lock().unwrap() = query;
    Json(json!({ "data": [{ "id": "w1" }], "total": 1 })).into_response()
}

async fn workout(
    State(mock): State<Arc<Mock>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&mock, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let ride = mock.ride.lock().unwrap().clone();
    Json(json!({
        "id": id,
        "status": "COMPLETE",
        "fitness_discipline": "cycling",
        "ride": ride
    }))
    .into_response()
}

async fn performance_graph(
    State(mock): State<Arc<Mock>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&mock, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    mock.every_n.lock().unwrap().push(query.get("every_n").cloned());
    Json(json!({ "workout": id, "duration": 1800, "metrics": [] })).into_response()
}

async fn instructor(
    State(mock): State<Arc<Mock>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    mock.instructor_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&mock, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if mock.instructor_fails.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "instructor service down").into_response();
    }
    assert_eq!(id, "inst-1");
    Json(json!({ "id": id, "name": "Coach Casey" })).into_response()
}
