use chrono::{DateTime, Utc};
use progress_core::model::{CourseId, UserId};

use super::SqliteRepository;
use super::mapping::{db_err, id_to_i64};
use crate::repository::{EnrollmentRepository, StorageError};

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO enrollments (user_id, course_id, enrolled_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, course_id) DO NOTHING
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("course_id", course_id.value())?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(res.rows_affected() > 0)
    }

    async fn is_enrolled(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM enrollments WHERE user_id = ?1 AND course_id = ?2")
            .bind(id_to_i64("user_id", user_id.value())?)
            .bind(id_to_i64("course_id", course_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.is_some())
    }
}
