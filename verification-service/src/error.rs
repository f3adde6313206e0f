use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Persistence failure in the underlying store. Never retried automatically.
#[derive(thiserror::Error, Debug)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError(format!("{e:#}"))
    }
}

/// The external telemetry service was unreachable or answered with a
/// non-2xx status. Recovered by the next scheduled poll.
#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("{url} returned an unusable body: {message}")]
    Body { url: String, message: String },
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Upstream failure surfaced through the `/telemetry` proxy, which
    /// reports it as an internal error.
    #[error("failed to fetch telemetry: {0}")]
    Proxy(UpstreamError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Proxy(_) | AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            if matches!(self, AppError::Store(_)) {
                metrics::counter!("http_store_errors_total").increment(1);
            }
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
