use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use services::{CatalogServiceError, EnrollmentServiceError, ProgressServiceError};
use storage::repository::StorageError;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing or invalid user identity")]
    Unauthorized,

    #[error(transparent)]
    MalformedPayload(#[from] JsonRejection),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ValidationErrors),

    #[error(transparent)]
    Progress(#[from] ProgressServiceError),

    #[error(transparent)]
    Catalog(#[from] CatalogServiceError),

    #[error(transparent)]
    Enrollment(#[from] EnrollmentServiceError),
}

fn storage_status(e: &StorageError) -> StatusCode {
    match e {
        StorageError::NotFound => StatusCode::NOT_FOUND,
        StorageError::Conflict(_) => StatusCode::CONFLICT,
        e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MalformedPayload(rejection) => rejection.status(),
            ApiError::InvalidPayload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Progress(e) => match e {
                ProgressServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ProgressServiceError::CourseNotFound(_)
                | ProgressServiceError::SectionNotFound { .. }
                | ProgressServiceError::ProgressNotFound(_) => StatusCode::NOT_FOUND,
                ProgressServiceError::NotEnrolled(_) => StatusCode::FORBIDDEN,
                ProgressServiceError::Storage(e) => storage_status(e),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Catalog(e) => match e {
                CatalogServiceError::Course(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CatalogServiceError::CourseNotFound(_) => StatusCode::NOT_FOUND,
                CatalogServiceError::Storage(e) => storage_status(e),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Enrollment(e) => match e {
                EnrollmentServiceError::CourseNotFound(_) => StatusCode::NOT_FOUND,
                EnrollmentServiceError::Storage(e) => storage_status(e),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, %status, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
