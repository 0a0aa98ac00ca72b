use std::sync::Arc;

use progress_core::model::{CourseId, UserId};
use storage::repository::{CatalogRepository, EnrollmentRepository};

use crate::Clock;
use crate::error::EnrollmentServiceError;

/// Grants users access to courses. Progress writes require an enrollment.
#[derive(Clone)]
pub struct EnrollmentService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            enrollments,
        }
    }

    /// Enroll a user. Returns `true` if this created a new enrollment.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::CourseNotFound` for unknown courses.
    /// Returns `EnrollmentServiceError::Storage` if persistence fails.
    pub async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, EnrollmentServiceError> {
        if self.catalog.get_course(course_id).await?.is_none() {
            return Err(EnrollmentServiceError::CourseNotFound(course_id));
        }
        let created = self
            .enrollments
            .enroll(user_id, course_id, self.clock.now())
            .await?;
        if created {
            tracing::info!(user_id = %user_id, course_id = %course_id, "user enrolled");
        }
        Ok(created)
    }

    /// # Errors
    ///
    /// Returns `EnrollmentServiceError::Storage` if repository access fails.
    pub async fn is_enrolled(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, EnrollmentServiceError> {
        Ok(self.enrollments.is_enrolled(user_id, course_id).await?)
    }
}
