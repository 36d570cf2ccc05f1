//! Mapping of core errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pretriage_core::PretriageError;
use serde::Serialize;
use utoipa::ToSchema;

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    /// Whether repeating the same request unchanged may succeed.
    pub retryable: bool,
}

#[derive(Debug)]
pub enum ApiError {
    /// Missing or unknown `x-session-token`.
    Unauthenticated(&'static str),
    Core(PretriageError),
}

impl From<PretriageError> for ApiError {
    fn from(err: PretriageError) -> Self {
        ApiError::Core(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        let ApiError::Core(err) = self else {
            return StatusCode::UNAUTHORIZED;
        };
        match err {
            PretriageError::InvalidInput(_) | PretriageError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            PretriageError::InvalidCredentials | PretriageError::SessionClosed => {
                StatusCode::UNAUTHORIZED
            }
            PretriageError::Forbidden { .. } => StatusCode::FORBIDDEN,
            PretriageError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            PretriageError::DuplicateIdentity(_)
            | PretriageError::ConcurrencyConflict { .. }
            | PretriageError::SubmitInFlight => StatusCode::CONFLICT,
            PretriageError::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PretriageError::StoreUnavailable(_)
            | PretriageError::Timeout { .. }
            | PretriageError::FileRead(_)
            | PretriageError::FileWrite(_) => StatusCode::SERVICE_UNAVAILABLE,
            PretriageError::Serialization(_) | PretriageError::Deserialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Unauthenticated(reason) => ErrorRes {
                error: (*reason).to_string(),
                retryable: false,
            },
            ApiError::Core(err) => {
                if status.is_server_error() {
                    tracing::error!("request failed: {err}");
                }
                ErrorRes {
                    error: err.to_string(),
                    retryable: err.is_retryable(),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
