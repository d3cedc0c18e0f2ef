use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use raft3d_core::ValidationError;
use raft3d_replication::ReplicationError;

/// Errors returned to HTTP clients.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not the leader; send writes to {0}")]
    NotLeader(String),

    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(e) => match e {
                ValidationError::FilamentNotFound(_)
                | ValidationError::PrinterNotFound(_)
                | ValidationError::JobNotFound(_) => StatusCode::NOT_FOUND,
                ValidationError::InsufficientFilament { .. }
                | ValidationError::IllegalTransition { .. } => StatusCode::CONFLICT,
                ValidationError::InvalidStatus(_)
                | ValidationError::InvalidInitialStatus(_)
                | ValidationError::ImmutableField(_)
                | ValidationError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::AlreadyExists { .. } => StatusCode::CONFLICT,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotLeader(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Replication(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
