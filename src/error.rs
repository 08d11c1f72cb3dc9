use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single outbound provider call, after the mirror retry.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} from {target}")]
    Status { status: u16, target: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid url {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] FetchError),

    #[error("insufficient data for {0}")]
    InsufficientData(String),

    #[error("sync step failed for {context}: {source}")]
    PartialSyncFailure {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn partial(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        AppError::PartialSyncFailure {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Lock failures are shared by every waiter of a key, hence `Clone`.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("lock {key} expired after {held:?}")]
    Expired { key: String, held: Duration },

    #[error("{0}")]
    Failed(String),
}

impl From<LockError> for AppError {
    fn from(err: LockError) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match status {
            StatusCode::NOT_FOUND => "Not Found",
            _ => {
                tracing::error!("request failed: {:#}", self);
                "Internal Server Error"
            }
        };

        (status, Json(ErrorBody { success: false, message })).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
