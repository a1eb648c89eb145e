//! Shared server harness for the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;

use rapport::crypto::PasswordHasher;
use rapport::mailer::MemoryMailer;
use rapport::storage::Storage;
use rapport::uploads::LocalUploader;
use rapport::web_client::router::build_router;
use rapport::web_client::state::AppState;

pub const PASSWORD: &str = "hunter22";

pub struct TestServer {
    pub base_url: String,
    pub shutdown_tx: oneshot::Sender<()>,
    pub mailer: Arc<MemoryMailer>,
    pub uploads_dir: PathBuf,
}

impl TestServer {
    pub fn stop(self) {
        self.shutdown_tx.send(()).ok();
        let _ = std::fs::remove_dir_all(&self.uploads_dir);
    }
}

pub async fn start_server() -> TestServer {
    let storage = Arc::new(Storage::open_in_memory().expect("open storage"));
    let mailer = MemoryMailer::new();
    let uploads_dir =
        std::env::temp_dir().join(format!("rapport-api-{}", uuid::Uuid::new_v4()));
    let state = Arc::new(AppState::new(
        storage,
        PasswordHasher::low_cost().expect("hasher"),
        mailer.clone(),
        LocalUploader::new(uploads_dir.clone()),
        3600,
        Duration::from_secs(5),
    ));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("server addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        shutdown_tx,
        mailer,
        uploads_dir,
    }
}

/// Blocking JSON call. Non-2xx statuses are returned, not raised.
pub fn call(
    base_url: &str,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (u16, Value) {
    let mut req = ureq::request(method, &format!("{}{}", base_url, path));
    if let Some(token) = token {
        req = req.set("Authorization", &format!("Bearer {}", token));
    }
    let result = match body {
        Some(body) => req
            .set("Content-Type", "application/json")
            .send_string(&body.to_string()),
        None => req.call(),
    };
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(e) => panic!("transport error: {e}"),
    };
    let status = response.status();
    let text = response.into_string().expect("response body");
    let json = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, json)
}

/// Verification mail goes out in the background; poll for it.
pub fn wait_for_code(mailer: &MemoryMailer, email: &str) -> String {
    for _ in 0..100 {
        if let Some(code) = mailer.last_code_for(email) {
            return code;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("no verification code mailed to {email}");
}

/// Sign up, verify and log in. Returns (user id, session token).
pub fn register(
    base_url: &str,
    mailer: &MemoryMailer,
    name: &str,
    email: &str,
) -> (String, String) {
    let (status, body) = call(
        base_url,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({ "full_name": name, "email": email, "password": PASSWORD })),
    );
    assert_eq!(status, 201, "signup: {body}");
    let user_id = body["user"]["id"].as_str().expect("user id").to_string();

    let code = wait_for_code(mailer, email);
    let (status, body) = call(
        base_url,
        "POST",
        "/api/verify-code",
        None,
        Some(json!({ "email": email, "code": code })),
    );
    assert_eq!(status, 200, "verify: {body}");

    let (status, body) = call(
        base_url,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    );
    assert_eq!(status, 200, "login: {body}");
    let token = body["token"].as_str().expect("token").to_string();
    (user_id, token)
}

pub fn befriend(base_url: &str, a: (&str, &str), b: (&str, &str)) {
    let (status, body) = call(
        base_url,
        "POST",
        "/api/friends/request",
        Some(a.1),
        Some(json!({ "user_id": b.0 })),
    );
    assert_eq!(status, 200, "request: {body}");
    let (status, body) = call(
        base_url,
        "POST",
        "/api/friends/accept",
        Some(b.1),
        Some(json!({ "user_id": a.0 })),
    );
    assert_eq!(status, 200, "accept: {body}");
}
