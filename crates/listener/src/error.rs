//! HTTP rendering of relay errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay::RelayError;
use thiserror::Error;

/// A failed notification, rendered as a plain-text HTTP response.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub RelayError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RelayError::MissingEventType
            | RelayError::UnsupportedEventType { .. }
            | RelayError::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            RelayError::RepoNotConfigured { .. } => StatusCode::NOT_FOUND,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RelayError::UnrecognizedBuildStatus { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
