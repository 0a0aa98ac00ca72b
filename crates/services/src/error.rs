//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::completion::CompletionError;
use progress_core::model::{CourseError, CourseId, ProgressError, ProgressId, SectionId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Validation(#[from] ProgressError),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("section {section_id} not found in course {course_id}")]
    SectionNotFound {
        course_id: CourseId,
        section_id: SectionId,
    },
    #[error("progress record {0} not found")]
    ProgressNotFound(ProgressId),
    #[error("user is not enrolled in course {0}")]
    NotEnrolled(CourseId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    /// Whether the caller may retry the same request later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ProgressServiceError::Storage(e) if e.is_transient())
    }
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogServiceError {
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `EnrollmentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnrollmentServiceError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}
