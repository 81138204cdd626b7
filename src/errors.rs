use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use sea_orm::{DbErr, RuntimeErr, SqlErr};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FirError {
    #[error("Validation failed: {0}")]
    #[diagnostic(code(efir::validation))]
    Validation(String),

    #[error("Invalid email or password")]
    #[diagnostic(code(efir::invalid_credentials))]
    InvalidCredentials,

    #[error("Not authorized: {0}")]
    #[diagnostic(code(efir::unauthorized))]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    #[diagnostic(code(efir::forbidden))]
    Forbidden(String),

    #[error("{0} not found")]
    #[diagnostic(code(efir::not_found))]
    NotFound(String),

    #[error("Duplicate {0}")]
    #[diagnostic(
        code(efir::duplicate_key),
        help("email, national ID and report number must be unique")
    )]
    DuplicateKey(String),

    #[error("Storage temporarily unavailable: {0}")]
    #[diagnostic(code(efir::transient_storage), help("the operation was not applied; retry it"))]
    TransientStorage(String),

    #[error("Unexpected error: {0}")]
    #[diagnostic(code(efir::unexpected))]
    Unexpected(String),

    #[error("Config error: {0}")]
    #[diagnostic(code(efir::config))]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(efir::io))]
    Io(#[from] std::io::Error),
}

impl FirError {
    /// Stable machine-readable kind, used as the `error` field of API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            FirError::Validation(_) => "validation_error",
            FirError::InvalidCredentials => "invalid_credentials",
            FirError::Unauthorized(_) => "unauthorized",
            FirError::Forbidden(_) => "forbidden",
            FirError::NotFound(_) => "not_found",
            FirError::DuplicateKey(_) => "duplicate_key",
            FirError::TransientStorage(_) => "transient_storage_error",
            FirError::Unexpected(_) | FirError::Config(_) | FirError::Io(_) => "unexpected",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FirError::Validation(_) | FirError::DuplicateKey(_) => StatusCode::BAD_REQUEST,
            FirError::InvalidCredentials | FirError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            FirError::Forbidden(_) => StatusCode::FORBIDDEN,
            FirError::NotFound(_) => StatusCode::NOT_FOUND,
            FirError::TransientStorage(_) => StatusCode::SERVICE_UNAVAILABLE,
            FirError::Unexpected(_) | FirError::Config(_) | FirError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FirError::TransientStorage(_))
    }
}

impl From<DbErr> for FirError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return FirError::DuplicateKey(duplicate_field(&detail));
        }
        match &err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
                FirError::TransientStorage(err.to_string())
            }
            DbErr::Exec(RuntimeErr::SqlxError(_)) | DbErr::Query(RuntimeErr::SqlxError(_))
                if is_lock_contention(&err) =>
            {
                FirError::TransientStorage(err.to_string())
            }
            DbErr::RecordNotFound(what) => FirError::NotFound(what.clone()),
            _ => FirError::Unexpected(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for FirError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{field} is invalid"),
                })
            })
            .collect();
        messages.sort();
        FirError::Validation(messages.join("; "))
    }
}

/// SQLite reports writer contention as SQLITE_BUSY ("database is locked");
/// PostgreSQL as serialization or lock-timeout failures.
fn is_lock_contention(err: &DbErr) -> bool {
    let msg = err.to_string();
    msg.contains("database is locked")
        || msg.contains("database table is locked")
        || msg.contains("could not serialize access")
        || msg.contains("lock timeout")
}

/// Reduce a backend constraint message to the offending field name where possible.
fn duplicate_field(detail: &str) -> String {
    for field in ["report_number", "national_id", "email"] {
        if detail.contains(field) {
            return field.to_string();
        }
    }
    "key".to_string()
}

impl IntoResponse for FirError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            FirError::Unexpected(_) | FirError::Config(_) | FirError::Io(_) => {
                tracing::error!(error = %self, "unhandled failure");
                "Internal server error".to_string()
            }
            FirError::TransientStorage(detail) => {
                tracing::warn!(%detail, "transient storage failure");
                "Service temporarily unavailable, please retry".to_string()
            }
            _ => self.to_string(),
        };
        let body = json!({ "error": self.kind(), "message": message });
        (status, Json(body)).into_response()
    }
}
