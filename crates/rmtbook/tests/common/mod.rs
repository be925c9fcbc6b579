#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rmtbook::auth::{register, NewAccount, SessionKeys};
use rmtbook::model::{Role, User};
use rmtbook::notify::RecordingMailer;
use rmtbook::{build_router, AppState, Config, Storage};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const RMT_EMAIL: &str = "rmt@example.com";
pub const PASSWORD: &str = "correct horse battery";

/// A served router over a database in a temporary directory.
pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    _dir: TempDir,
}

pub struct Response {
    pub status: u16,
    pub head: String,
    pub body: String,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("response body must be JSON")
    }

    /// `name=value` of the first `Set-Cookie` header.
    pub fn cookie(&self) -> Option<String> {
        self.set_cookie_header()
            .and_then(|value| value.split(';').next())
            .map(|pair| pair.trim().to_string())
    }

    pub fn set_cookie_header(&self) -> Option<&str> {
        self.head.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("set-cookie").then(|| value.trim())
        })
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.database_path = Some(dir.path().join("rmtbook.db"));
    config.session.secret = "integration-test-secret-0123456789abcdef".to_string();
    config.session.secure_cookie = false;
    config.practice.business_name = "Test Massage Clinic".to_string();
    config.practice.rmt_registration_number = "RMT-1234".to_string();
    config
}

pub async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&dir);
    let sessions = SessionKeys::from_config(&config).expect("session keys");
    let storage = Storage::open(config.database_path()).expect("open storage");
    let mailer = Arc::new(RecordingMailer::new());
    let state = AppState::new(storage, config, sessions, mailer.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let router = build_router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    TestApp {
        addr,
        state,
        mailer,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(
        &self,
        method: &str,
        path: &str,
        cookie: Option<&str>,
        body: Option<&Value>,
    ) -> Response {
        let mut stream = tokio::net::TcpStream::connect(self.addr)
            .await
            .expect("connect server");
        let addr = self.addr;
        let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
        if let Some(cookie) = cookie {
            req.push_str(&format!("Cookie: {cookie}\r\n"));
        }
        let payload = body.map(Value::to_string).unwrap_or_default();
        if body.is_some() {
            req.push_str("Content-Type: application/json\r\n");
        }
        req.push_str(&format!("Content-Length: {}\r\n\r\n", payload.len()));
        req.push_str(&payload);

        stream
            .write_all(req.as_bytes())
            .await
            .expect("write request");
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .await
            .expect("read response");
        let (head, body) = response
            .split_once("\r\n\r\n")
            .expect("http response must have separator");
        let status = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|s| s.parse::<u16>().ok())
            .expect("http status");
        Response {
            status,
            head: head.to_string(),
            body: body.to_string(),
        }
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response {
        self.send("GET", path, cookie, None).await
    }

    pub async fn post(&self, path: &str, cookie: Option<&str>, body: &Value) -> Response {
        self.send("POST", path, cookie, Some(body)).await
    }

    /// Create the RMT account directly in storage.
    pub async fn create_rmt(&self) -> User {
        let storage = self.state.storage.lock().await;
        register(
            &storage,
            NewAccount {
                email: RMT_EMAIL.to_string(),
                password: PASSWORD.to_string(),
                first_name: "Alex".to_string(),
                last_name: "Lee".to_string(),
                phone: None,
            },
            Role::Rmt,
            Utc::now(),
        )
        .expect("create rmt")
    }

    /// Sign in and return the session cookie pair.
    pub async fn sign_in(&self, email: &str) -> String {
        let res = self
            .post(
                "/api/auth/sign-in",
                None,
                &json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status, 200, "sign-in failed: {}", res.body);
        res.cookie().expect("sign-in sets a cookie")
    }

    /// Sign up a patient and return (patient id, session cookie pair).
    pub async fn sign_up_patient(&self, email: &str) -> (String, String) {
        let res = self
            .post(
                "/api/auth/sign-up",
                None,
                &json!({
                    "email": email,
                    "password": PASSWORD,
                    "first_name": "Jo",
                    "last_name": "Smith",
                }),
            )
            .await;
        assert_eq!(res.status, 201, "sign-up failed: {}", res.body);
        let cookie = res.cookie().expect("sign-up sets a cookie");
        let id = res.json()["id"].as_str().expect("user id").to_string();
        (id, cookie)
    }
}

/// Open every day of the week, 09:00 to 17:00.
pub fn all_week_hours() -> Value {
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    Value::Array(
        days.iter()
            .map(|day| json!({ "weekday": day, "opens": "09:00:00", "closes": "17:00:00" }))
            .collect(),
    )
}

/// A date a week out, comfortably inside notice and horizon limits.
pub fn booking_date() -> NaiveDate {
    (Utc::now() + Duration::days(7)).date_naive()
}

pub fn at_time(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    date.and_hms_opt(hour, minute, 0)
        .expect("valid time")
        .and_utc()
}
