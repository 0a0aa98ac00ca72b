use std::sync::Arc;

use progress_core::completion::{CompletionPolicy, CourseProgressSummary};
use progress_core::model::{
    CourseId, FlushReport, ProgressId, ProgressKey, ProgressRecord, Section, SectionId, UserId,
    validate_notes,
};
use storage::repository::{
    CatalogRepository, EnrollmentRepository, ProgressRepository, StorageError,
};

use crate::Clock;
use crate::catalog_service::load_outline;
use crate::error::ProgressServiceError;

/// Records learner progress and answers "how far along is this user".
///
/// Every write is checked against the catalog (the section must belong to the
/// course) and the enrollment gate before it reaches the store.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    policy: CompletionPolicy,
    catalog: Arc<dyn CatalogRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        policy: CompletionPolicy,
        catalog: Arc<dyn CatalogRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            policy,
            catalog,
            enrollments,
            progress,
        }
    }

    #[must_use]
    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Apply one client flush: accumulate time, overwrite the position, and
    /// complete the section in the same write when the policy says so.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Validation` for malformed reports (the
    /// store is not touched).
    /// Returns `ProgressServiceError::CourseNotFound` / `SectionNotFound` if the
    /// section is not part of the course.
    /// Returns `ProgressServiceError::NotEnrolled` without an enrollment.
    /// Returns `ProgressServiceError::Storage` if persistence fails.
    pub async fn update_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
        section_id: SectionId,
        report: FlushReport,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let delta = report.delta()?;
        let section = self.authorize(user_id, course_id, section_id).await?;

        let reason = self.policy.implicit_completion(section.content_type(), &report);
        let key = ProgressKey::new(user_id, course_id, section_id);
        let record = self
            .progress
            .record_flush(key, &delta, reason.is_some(), self.clock.now())
            .await?;

        tracing::debug!(
            user_id = %user_id,
            course_id = %course_id,
            section_id = %section_id,
            added = delta.additional_time_spent(),
            position = delta.last_position(),
            completion = ?reason,
            "progress flushed"
        );
        Ok(record)
    }

    /// Explicitly mark a section complete. Repeating the call is a no-op that
    /// returns the same record.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::CourseNotFound` / `SectionNotFound` if the
    /// section is not part of the course.
    /// Returns `ProgressServiceError::NotEnrolled` without an enrollment.
    /// Returns `ProgressServiceError::Storage` if persistence fails.
    pub async fn complete_section(
        &self,
        user_id: UserId,
        course_id: CourseId,
        section_id: SectionId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        self.authorize(user_id, course_id, section_id).await?;
        let key = ProgressKey::new(user_id, course_id, section_id);
        let record = self.progress.mark_completed(key, self.clock.now()).await?;
        tracing::info!(
            user_id = %user_id,
            course_id = %course_id,
            section_id = %section_id,
            "section completed"
        );
        Ok(record)
    }

    /// The user's records for a course in course order, plus the completion
    /// percentage over the sections the course has right now.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::CourseNotFound` for unknown courses.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgressSummary, ProgressServiceError> {
        let outline = load_outline(self.catalog.as_ref(), course_id)
            .await?
            .ok_or(ProgressServiceError::CourseNotFound(course_id))?;
        let sections: Vec<Section> = outline.sections().cloned().collect();
        let records = self
            .progress
            .get_progress_for_course(user_id, course_id)
            .await?;
        Ok(CourseProgressSummary::compute(&sections, records))
    }

    /// Replace the learner's notes on a section. Blank notes clear them.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Validation` if the notes are too long.
    /// Returns `ProgressServiceError::CourseNotFound` / `SectionNotFound` /
    /// `NotEnrolled` as for `update_progress`.
    /// Returns `ProgressServiceError::Storage` if persistence fails.
    pub async fn update_notes(
        &self,
        user_id: UserId,
        course_id: CourseId,
        section_id: SectionId,
        notes: Option<String>,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let notes = validate_notes(notes)?;
        self.authorize(user_id, course_id, section_id).await?;
        let key = ProgressKey::new(user_id, course_id, section_id);
        Ok(self
            .progress
            .update_notes(key, notes.as_deref(), self.clock.now())
            .await?)
    }

    /// Fetch one of the user's records by id.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::ProgressNotFound` if the record does not
    /// exist or belongs to another user.
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn get_progress(
        &self,
        user_id: UserId,
        id: ProgressId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        match self.progress.get_progress(id).await {
            Ok(record) if record.user_id() == user_id => Ok(record),
            Ok(_) | Err(StorageError::NotFound) => Err(ProgressServiceError::ProgressNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn authorize(
        &self,
        user_id: UserId,
        course_id: CourseId,
        section_id: SectionId,
    ) -> Result<Section, ProgressServiceError> {
        if self.catalog.get_course(course_id).await?.is_none() {
            return Err(ProgressServiceError::CourseNotFound(course_id));
        }
        let section = self
            .catalog
            .get_section(section_id)
            .await?
            .filter(|s| s.course_id() == course_id)
            .ok_or(ProgressServiceError::SectionNotFound {
                course_id,
                section_id,
            })?;
        if !self.enrollments.is_enrolled(user_id, course_id).await? {
            return Err(ProgressServiceError::NotEnrolled(course_id));
        }
        Ok(section)
    }
}
