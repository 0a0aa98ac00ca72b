use progress_core::model::{Course, CourseId, Module, Section, SectionId};

use super::SqliteRepository;
use super::mapping::{db_err, id_to_i64, map_course_row, map_module_row, map_section_row};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO courses (id, title, description)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description
            ",
        )
        .bind(id_to_i64("course_id", course.id().value())?)
        .bind(course.title())
        .bind(course.description())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO modules (id, course_id, title, sort_order)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                sort_order = excluded.sort_order
            ",
        )
        .bind(id_to_i64("module_id", module.id().value())?)
        .bind(id_to_i64("course_id", module.course_id().value())?)
        .bind(module.title())
        .bind(i64::from(module.order()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn upsert_section(&self, section: &Section) -> Result<(), StorageError> {
        let module_id = section
            .module_id()
            .map(|m| id_to_i64("module_id", m.value()))
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO sections (id, course_id, module_id, title, sort_order, content_type)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                module_id = excluded.module_id,
                title = excluded.title,
                sort_order = excluded.sort_order,
                content_type = excluded.content_type
            ",
        )
        .bind(id_to_i64("section_id", section.id().value())?)
        .bind(id_to_i64("course_id", section.course_id().value())?)
        .bind(module_id)
        .bind(section.title())
        .bind(i64::from(section.order()))
        .bind(section.content_type().as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn delete_section(&self, id: SectionId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM sections WHERE id = ?1")
            .bind(id_to_i64("section_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let row = sqlx::query("SELECT id, title, description FROM courses WHERE id = ?1")
            .bind(id_to_i64("course_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_course_row).transpose()
    }

    async fn list_modules(&self, course_id: CourseId) -> Result<Vec<Module>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, title, sort_order
            FROM modules
            WHERE course_id = ?1
            ORDER BY sort_order ASC, id ASC
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_module_row).collect()
    }

    async fn list_sections(&self, course_id: CourseId) -> Result<Vec<Section>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, module_id, title, sort_order, content_type
            FROM sections
            WHERE course_id = ?1
            ORDER BY sort_order ASC, id ASC
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_section_row).collect()
    }

    async fn get_section(&self, id: SectionId) -> Result<Option<Section>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, module_id, title, sort_order, content_type
            FROM sections WHERE id = ?1
            ",
        )
        .bind(id_to_i64("section_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_section_row).transpose()
    }
}
