use std::time::Duration;

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use livesync_client::FilesError;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

/// Handler error, rendered as `{"error": "..."}`.
#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl ToString) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: impl ToString) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Not seen within the deadline. Phrased as "not found yet", not "absent".
    pub fn not_found_within(what: &str, waited: Duration) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{what} not found within {} ms", waited.as_millis()),
        )
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorBody {
            error: &self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<FilesError> for AppError {
    fn from(value: FilesError) -> Self {
        match value {
            FilesError::Validation(e) => Self::bad_request(e),
            FilesError::Store(e) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, e),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(value: QueryRejection) -> Self {
        Self::bad_request(value.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        Self::bad_request(value.body_text())
    }
}
