use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;

/// Server-side failure taxonomy. Nothing here is fatal to the process:
/// every variant maps to a 4xx that leaves stored state untouched.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl CoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// Client-side failure taxonomy for the sync engine and HTTP transport.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected locally before any network call
    #[error("validation failed: {0}")]
    Validation(String),

    /// The server answered with a non-2xx status
    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    /// The round trip itself failed; recovered by the next poll tick
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A send failed after the optimistic echo was shown. The echo has been
    /// removed and `text` is handed back so the input is not lost.
    #[error("send failed, input preserved: {source}")]
    SendFailed {
        text: String,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// True when retrying without user intervention makes sense.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::SendFailed { source, .. } => source.is_retryable(),
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::Validation(_) => false,
        }
    }
}
