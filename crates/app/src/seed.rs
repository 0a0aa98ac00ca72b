use progress_core::model::{
    ContentType, Course, CourseError, CourseId, Module, ModuleId, Section, SectionId, UserId,
};
use services::{AppServices, CatalogServiceError, EnrollmentServiceError};
use thiserror::Error;

pub const DEMO_COURSE_ID: CourseId = CourseId::new(1);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SeedError {
    #[error(transparent)]
    Course(#[from] CourseError),

    #[error(transparent)]
    Catalog(#[from] CatalogServiceError),

    #[error(transparent)]
    Enrollment(#[from] EnrollmentServiceError),
}

/// Create (or refresh) the demo course and enroll `user_id` in it.
///
/// Safe to run repeatedly: catalog writes are upserts and enrolling twice is a no-op.
///
/// # Errors
///
/// Returns `SeedError` if the catalog cannot be written or the enrollment fails.
pub async fn seed_demo_course(services: &AppServices, user_id: UserId) -> Result<(), SeedError> {
    let catalog = services.catalog();

    let course = Course::new(
        DEMO_COURSE_ID,
        "Getting Started",
        Some("A short tour of the platform".to_string()),
    )?;
    catalog.upsert_course(&course).await?;

    let basics = Module::new(ModuleId::new(1), DEMO_COURSE_ID, "Basics", 1)?;
    let practice = Module::new(ModuleId::new(2), DEMO_COURSE_ID, "Practice", 2)?;
    catalog.upsert_module(&basics).await?;
    catalog.upsert_module(&practice).await?;

    let sections = [
        (1, Some(basics.id()), "Welcome video", 1, ContentType::Video),
        (2, Some(basics.id()), "Reading: how courses work", 2, ContentType::Text),
        (3, Some(practice.id()), "Walkthrough with notes", 1, ContentType::Mixed),
        (4, Some(practice.id()), "Final recap", 2, ContentType::Video),
        (5, None, "Glossary", 1, ContentType::Text),
    ];
    for (id, module_id, title, order, content_type) in sections {
        let section = Section::new(
            SectionId::new(id),
            DEMO_COURSE_ID,
            module_id,
            title,
            order,
            content_type,
        )?;
        catalog.upsert_section(&section).await?;
    }

    let created = services.enrollments().enroll(user_id, DEMO_COURSE_ID).await?;
    tracing::info!(
        user_id = %user_id,
        course_id = %DEMO_COURSE_ID,
        newly_enrolled = created,
        "demo course seeded"
    );
    Ok(())
}
