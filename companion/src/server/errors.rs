//! Error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::ErrorResponse;
use tracing::error;

use crate::errors::{CompanionError, ErrorKind};

/// HTTP status for an error kind
pub fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState | ErrorKind::CapacityExhausted => StatusCode::CONFLICT,
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::StorageFailure | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for CompanionError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_code(kind);
        if status.is_server_error() {
            error!("Request failed ({}): {}", kind.as_str(), self);
        }

        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
                kind: kind.as_str().to_string(),
            }),
        )
            .into_response()
    }
}
