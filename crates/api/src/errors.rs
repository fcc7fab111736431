//! Maps `cat_core::CoreError` onto HTTP status codes for the Axum binding.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cat_core::CoreError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::TopicNotInSubject { .. } => StatusCode::BAD_REQUEST,
            CoreError::OptionMismatch { .. } => StatusCode::BAD_REQUEST,
            CoreError::ItemNotServed { .. } => StatusCode::BAD_REQUEST,
            CoreError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::SessionNotOngoing(_) => StatusCode::CONFLICT,
            CoreError::NoEligibleItem => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(self.0, CoreError::Storage(_)) {
            tracing::error!("internal error: {}", self.0);
        }

        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}
