use std::sync::Arc;

use progress_core::model::{Course, CourseError, CourseId, CourseOutline, Module, Section, SectionId};
use storage::repository::{CatalogRepository, StorageError};

use crate::error::CatalogServiceError;

/// Load a course with its modules and sections, or `None` if the course is unknown.
pub(crate) async fn load_outline(
    catalog: &dyn CatalogRepository,
    course_id: CourseId,
) -> Result<Option<CourseOutline>, StorageError> {
    let Some(course) = catalog.get_course(course_id).await? else {
        return Ok(None);
    };
    let modules = catalog.list_modules(course_id).await?;
    let sections = catalog.list_sections(course_id).await?;
    Ok(Some(CourseOutline::assemble(course, modules, sections)))
}

/// Read and author the course structure that progress is measured against.
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Modules with their ordered sections, followed by standalone sections.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::CourseNotFound` for unknown courses.
    /// Returns `CatalogServiceError::Storage` if repository access fails.
    pub async fn outline(&self, course_id: CourseId) -> Result<CourseOutline, CatalogServiceError> {
        load_outline(self.catalog.as_ref(), course_id)
            .await?
            .ok_or(CatalogServiceError::CourseNotFound(course_id))
    }

    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if persistence fails.
    pub async fn upsert_course(&self, course: &Course) -> Result<(), CatalogServiceError> {
        self.catalog.upsert_course(course).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `CatalogServiceError::CourseNotFound` if the module's course is unknown.
    /// Returns `CatalogServiceError::Storage` if persistence fails.
    pub async fn upsert_module(&self, module: &Module) -> Result<(), CatalogServiceError> {
        self.require_course(module.course_id()).await?;
        self.catalog.upsert_module(module).await?;
        Ok(())
    }

    /// Persist a section, checking that its module lives in the same course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::CourseNotFound` if the course is unknown.
    /// Returns `CatalogServiceError::Course` if the module belongs elsewhere.
    /// Returns `CatalogServiceError::Storage` if persistence fails.
    pub async fn upsert_section(&self, section: &Section) -> Result<(), CatalogServiceError> {
        self.require_course(section.course_id()).await?;
        if let Some(module_id) = section.module_id() {
            let modules = self.catalog.list_modules(section.course_id()).await?;
            if !modules.iter().any(|m| m.id() == module_id) {
                return Err(CourseError::ModuleCourseMismatch { module_id }.into());
            }
        }
        self.catalog.upsert_section(section).await?;
        Ok(())
    }

    /// Remove a section; its progress records go with it and it stops counting
    /// toward course completion.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` (`NotFound`) for unknown sections.
    pub async fn delete_section(&self, section_id: SectionId) -> Result<(), CatalogServiceError> {
        self.catalog.delete_section(section_id).await?;
        tracing::info!(section_id = %section_id, "section deleted");
        Ok(())
    }

    async fn require_course(&self, course_id: CourseId) -> Result<(), CatalogServiceError> {
        if self.catalog.get_course(course_id).await?.is_none() {
            return Err(CatalogServiceError::CourseNotFound(course_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{ContentType, ModuleId};
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn section_module_must_belong_to_course() {
        let service = CatalogService::new(Arc::new(InMemoryRepository::new()));
        for id in [1, 2] {
            let course = Course::new(CourseId::new(id), format!("Course {id}"), None).unwrap();
            service.upsert_course(&course).await.unwrap();
        }
        let module = Module::new(ModuleId::new(5), CourseId::new(2), "Other", 1).unwrap();
        service.upsert_module(&module).await.unwrap();

        let section = Section::new(
            SectionId::new(1),
            CourseId::new(1),
            Some(ModuleId::new(5)),
            "Misplaced",
            1,
            ContentType::Text,
        )
        .unwrap();
        let err = service.upsert_section(&section).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogServiceError::Course(CourseError::ModuleCourseMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn outline_of_unknown_course_is_not_found() {
        let service = CatalogService::new(Arc::new(InMemoryRepository::new()));
        let err = service.outline(CourseId::new(9)).await.unwrap_err();
        assert!(matches!(err, CatalogServiceError::CourseNotFound(_)));
    }
}
