use super::builders::UserBuilder;
use super::db::TestDb;
use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use efir::keys::SessionKeys;
use efir::reports::ReportNumberSource;
use efir::settings::Settings;
use efir::web::{self, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// The full router over a throwaway database, driven in-process.
pub struct TestApp {
    pub db: TestDb,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(Settings::default(), None).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        Self::build(settings, None).await
    }

    pub async fn with_numbers(numbers: Arc<dyn ReportNumberSource>) -> Self {
        Self::build(Settings::default(), Some(numbers)).await
    }

    async fn build(settings: Settings, numbers: Option<Arc<dyn ReportNumberSource>>) -> Self {
        let db = TestDb::new().await;
        let keys = SessionKeys::from_secret(vec![42u8; 32]).expect("test secret");
        let mut state = AppState::new(settings, db.connection().clone(), keys);
        if let Some(numbers) = numbers {
            state = state.with_numbers(numbers);
        }
        Self {
            db,
            router: web::router(state),
        }
    }

    pub async fn raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed")
    }

    /// Send a request and decode the body as JSON (or a JSON string for
    /// plain-text bodies).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.raw(method, uri, token, body).await;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    /// Register a citizen through the API and return its token.
    pub async fn register_citizen(&self, user: &UserBuilder) -> String {
        let (status, body) = self.post("/users/register", None, user.to_json()).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().expect("token").to_string()
    }

    /// Create a police account directly and log it in through the portal.
    pub async fn officer_token(&self, email: &str, national_id: &str) -> String {
        UserBuilder::new(email, national_id)
            .police()
            .create(self.db.connection())
            .await;
        let (status, body) = self
            .post(
                "/admin/login",
                None,
                json!({ "email": email, "password": "secret1" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().expect("token").to_string()
    }
}
