//! HTTP surface: JSON endpoints for citizens, the police portal and the
//! public report search.
//!
//! Every protected handler takes a [`Caller`], which resolves the bearer
//! token to the current user before the handler body runs. Authorization
//! itself happens inside the lifecycle and query operations.
use crate::authz::{self, Action, Resource};
use crate::errors::FirError;
use crate::keys::SessionKeys;
use crate::reports::{self, NewReport, ReportNumberSource, StatusChange, TimeSuffixNumbers};
use crate::session::{Identity, SessionIssuer, SessionToken};
use crate::settings::Settings;
use crate::storage::{self, ProfileUpdate, Registration, Role, UserProfile};
use crate::user_sync;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
    pub sessions: SessionIssuer,
    pub numbers: Arc<dyn ReportNumberSource>,
}

impl AppState {
    pub fn new(settings: Settings, db: DatabaseConnection, keys: SessionKeys) -> Self {
        let sessions = SessionIssuer::new(keys, &settings.auth);
        let numbers = Arc::new(TimeSuffixNumbers::new(settings.reports.number_prefix.clone()));
        Self {
            settings: Arc::new(settings),
            db,
            sessions,
            numbers,
        }
    }

    /// Swap the report number source, e.g. to force collisions in tests.
    pub fn with_numbers(mut self, numbers: Arc<dyn ReportNumberSource>) -> Self {
        self.numbers = numbers;
        self
    }
}

/// Authenticated caller of a request, resolved from `Authorization: Bearer`.
pub struct Caller(pub Identity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = FirError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .sessions
            .resolve(&state.db, &parts.headers)
            .await
            .map(Caller)
    }
}

/// Malformed JSON is a validation failure like any other bad input.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, FirError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| FirError::Validation(rejection.body_text()))
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    // JSON only; nothing here should ever be rendered as a document
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

/// Point after which a mutating request must not start another write.
#[derive(Debug, Clone, Copy)]
pub struct WriteDeadline(pub Instant);

/// Reads are cut off at the configured deadline. Writes run to completion in
/// their own task, so neither the deadline nor a dropped connection can stop
/// them between commit and response; they get a [`WriteDeadline`] instead and
/// refuse to start a new transaction after it.
async fn request_deadline(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let limit = Duration::from_secs(state.settings.server.request_timeout_secs);
    let path = request.uri().path().to_string();

    if matches!(*request.method(), Method::GET | Method::HEAD) {
        return match tokio::time::timeout(limit, next.run(request)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(%path, ?limit, "Request deadline exceeded");
                FirError::TransientStorage("request deadline exceeded".to_string())
                    .into_response()
            }
        };
    }

    request
        .extensions_mut()
        .insert(WriteDeadline(Instant::now() + limit));
    match tokio::spawn(next.run(request).instrument(tracing::Span::current())).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(%path, error = %e, "Write request task failed");
            FirError::Unexpected("request task failed".to_string()).into_response()
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    if allowed_origins.is_empty() {
        return None;
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
            .max_age(Duration::from_secs(3600)),
    )
}

/// Build the full application router. Public so tests can drive it in-process.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        // Citizen accounts
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/profile", get(profile).put(update_profile))
        // Citizen reports
        .route("/firs", post(file_report).get(list_own_reports))
        .route("/firs/search/{report_number}", get(search_report))
        .route("/firs/{id}", get(own_report))
        // Police portal
        .route("/admin/login", post(admin_login))
        .route("/admin/firs", get(list_all_reports))
        .route("/admin/firs/{id}", get(any_report))
        .route("/admin/firs/{id}/status", put(update_report_status))
        .route("/admin/officers", post(register_officer))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_deadline,
        ));

    if let Some(cors) = cors_layer(&state.settings.server.allowed_origins) {
        router = router.layer(cors);
    }

    router
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(settings: Settings, db: DatabaseConnection) -> miette::Result<()> {
    let keys = SessionKeys::load(&settings.auth)?;

    let addr: SocketAddr = settings
        .listen_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let state = AppState::new(settings, db, keys);
    let app = router(state);

    tracing::info!(%addr, "Public API listening");
    tracing::warn!("Rate limiting should be configured at the reverse proxy level for production");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn healthz(State(state): State<AppState>) -> Result<&'static str, FirError> {
    state.db.ping().await?;
    Ok("ok")
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    user: UserProfile,
    #[serde(flatten)]
    session: SessionToken,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<impl IntoResponse, FirError> {
    let registration = json_body(payload)?;
    registration.check()?;

    let user = storage::create_user(&state.db, registration.into_new_user(Role::Citizen)).await?;
    let session = state.sessions.issue(&user)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserProfile::from(&user),
            session,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, FirError> {
    let form = json_body(payload)?;
    let (user, session) = state
        .sessions
        .authenticate(&state.db, &form.email, &form.password)
        .await?;
    Ok(Json(AuthResponse {
        user: UserProfile::from(&user),
        session,
    }))
}

async fn admin_login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, FirError> {
    let form = json_body(payload)?;
    let user = storage::verify_user_password(&state.db, &form.email, &form.password)
        .await?
        .ok_or(FirError::InvalidCredentials)?;
    if user.role != Role::Police {
        tracing::info!(user_id = %user.id, "Non-police account tried the police portal");
        return Err(FirError::Unauthorized("police account required".to_string()));
    }

    let session = state.sessions.issue(&user)?;
    Ok(Json(AuthResponse {
        user: UserProfile::from(&user),
        session,
    }))
}

async fn profile(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<impl IntoResponse, FirError> {
    authz::require(Some(&caller), Action::ReadProfile, Resource::User(&caller.user_id))?;
    let user = storage::get_user_by_id(&state.db, &caller.user_id)
        .await?
        .ok_or_else(|| FirError::NotFound("User".to_string()))?;
    Ok(Json(UserProfile::from(&user)))
}

async fn update_profile(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, FirError> {
    authz::require(Some(&caller), Action::UpdateProfile, Resource::User(&caller.user_id))?;
    let update = json_body(payload)?;
    update.check()?;

    let user = storage::update_user_profile(&state.db, &caller.user_id, update).await?;
    Ok(Json(UserProfile::from(&user)))
}

async fn file_report(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Extension(WriteDeadline(deadline)): Extension<WriteDeadline>,
    payload: Result<Json<NewReport>, JsonRejection>,
) -> Result<impl IntoResponse, FirError> {
    let input = json_body(payload)?;
    let report = reports::create_report_before(
        &state.db,
        state.numbers.as_ref(),
        state.settings.reports.max_number_attempts,
        deadline,
        &caller,
        input,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn list_own_reports(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<impl IntoResponse, FirError> {
    Ok(Json(reports::get_own_reports(&state.db, &caller).await?))
}

async fn own_report(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, FirError> {
    Ok(Json(reports::get_report_by_id(&state.db, &caller, &id).await?))
}

async fn search_report(
    State(state): State<AppState>,
    Path(report_number): Path<String>,
) -> Result<impl IntoResponse, FirError> {
    Ok(Json(
        reports::search_by_number(&state.db, &report_number).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct StatusFilter {
    status: Option<String>,
}

async fn list_all_reports(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(filter): Query<StatusFilter>,
) -> Result<impl IntoResponse, FirError> {
    Ok(Json(
        reports::get_all_reports(&state.db, &caller, filter.status.as_deref()).await?,
    ))
}

async fn any_report(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, FirError> {
    Ok(Json(reports::get_any_report(&state.db, &caller, &id).await?))
}

async fn update_report_status(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Extension(WriteDeadline(deadline)): Extension<WriteDeadline>,
    payload: Result<Json<StatusChange>, JsonRejection>,
) -> Result<impl IntoResponse, FirError> {
    let change = json_body(payload)?;
    let report = reports::update_status_before(
        &state.db,
        &caller,
        &id,
        change,
        state.settings.reports.max_update_attempts,
        deadline,
    )
    .await?;
    Ok(Json(report))
}

async fn register_officer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<impl IntoResponse, FirError> {
    let registration = json_body(payload)?;
    let user = user_sync::register_officer(&state.db, &caller, registration).await?;
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}
