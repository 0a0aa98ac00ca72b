use chrono::{DateTime, Utc};
use progress_core::model::{CourseId, ProgressDelta, ProgressId, ProgressKey, ProgressRecord, UserId};

use super::SqliteRepository;
use super::mapping::{db_err, id_to_i64, key_to_i64, map_progress_row};
use crate::repository::{ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = "id, user_id, course_id, section_id, is_completed, completion_date, \
     time_spent, last_position, notes, created_at, updated_at";

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn record_flush(
        &self,
        key: ProgressKey,
        delta: &ProgressDelta,
        complete: bool,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        let (user_id, course_id, section_id) = key_to_i64(key)?;
        let sql = format!(
            r"
            INSERT INTO section_progress (
                user_id, course_id, section_id, is_completed, completion_date,
                time_spent, last_position, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(user_id, course_id, section_id) DO UPDATE SET
                time_spent = section_progress.time_spent + excluded.time_spent,
                last_position = excluded.last_position,
                is_completed = MAX(section_progress.is_completed, excluded.is_completed),
                completion_date = COALESCE(section_progress.completion_date, excluded.completion_date),
                updated_at = excluded.updated_at
            RETURNING {PROGRESS_COLUMNS}
            "
        );

        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(course_id)
            .bind(section_id)
            .bind(i64::from(complete))
            .bind(complete.then_some(at))
            .bind(i64::from(delta.additional_time_spent()))
            .bind(delta.last_position())
            .bind(at)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        map_progress_row(&row)
    }

    async fn mark_completed(
        &self,
        key: ProgressKey,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        let (user_id, course_id, section_id) = key_to_i64(key)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // The update only fires on the false -> true transition, so the first
        // completion date sticks.
        sqlx::query(
            r"
            INSERT INTO section_progress (
                user_id, course_id, section_id, is_completed, completion_date,
                time_spent, last_position, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, 1, ?4, 0, 0, ?4, ?4)
            ON CONFLICT(user_id, course_id, section_id) DO UPDATE SET
                is_completed = 1,
                completion_date = excluded.completion_date,
                updated_at = excluded.updated_at
            WHERE section_progress.is_completed = 0
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(section_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM section_progress \
             WHERE user_id = ?1 AND course_id = ?2 AND section_id = ?3"
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(course_id)
            .bind(section_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        map_progress_row(&row)
    }

    async fn update_notes(
        &self,
        key: ProgressKey,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        let (user_id, course_id, section_id) = key_to_i64(key)?;
        let sql = format!(
            r"
            INSERT INTO section_progress (
                user_id, course_id, section_id, notes, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(user_id, course_id, section_id) DO UPDATE SET
                notes = excluded.notes,
                updated_at = excluded.updated_at
            RETURNING {PROGRESS_COLUMNS}
            "
        );

        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(course_id)
            .bind(section_id)
            .bind(notes)
            .bind(at)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        map_progress_row(&row)
    }

    async fn get_progress(&self, id: ProgressId) -> Result<ProgressRecord, StorageError> {
        let sql = format!("SELECT {PROGRESS_COLUMNS} FROM section_progress WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_to_i64("progress_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;

        map_progress_row(&row)
    }

    async fn get_progress_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM section_progress \
             WHERE user_id = ?1 AND course_id = ?2 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_to_i64("user_id", user_id.value())?)
            .bind(id_to_i64("course_id", course_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(map_progress_row).collect()
    }
}
