use progress_core::model::{
    ContentType, Course, CourseId, Module, ModuleId, ProgressId, ProgressKey, ProgressRecord,
    Section, SectionId, UserId,
};
use sqlx::Row;
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Constraint violations become `Conflict`; everything else is treated as a
/// backend availability problem.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    if let Some(db) = e.as_database_error() {
        match db.kind() {
            ErrorKind::ForeignKeyViolation
            | ErrorKind::UniqueViolation
            | ErrorKind::CheckViolation
            | ErrorKind::NotNullViolation => return StorageError::Conflict(db.message().into()),
            _ => {}
        }
    }
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

/// Bound values for a progress key, in `(user_id, course_id, section_id)` order.
pub(crate) fn key_to_i64(key: ProgressKey) -> Result<(i64, i64, i64), StorageError> {
    Ok((
        id_to_i64("user_id", key.user_id.value())?,
        id_to_i64("course_id", key.course_id.value())?,
        id_to_i64("section_id", key.section_id.value())?,
    ))
}

fn get_i64(row: &SqliteRow, column: &'static str) -> Result<i64, StorageError> {
    row.try_get::<i64, _>(column).map_err(ser)
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<Course, StorageError> {
    Course::new(
        CourseId::new(i64_to_u64("id", get_i64(row, "id")?)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get("description").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_module_row(row: &SqliteRow) -> Result<Module, StorageError> {
    let order = i32::try_from(get_i64(row, "sort_order")?).map_err(ser)?;
    Module::new(
        ModuleId::new(i64_to_u64("id", get_i64(row, "id")?)?),
        CourseId::new(i64_to_u64("course_id", get_i64(row, "course_id")?)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        order,
    )
    .map_err(ser)
}

pub(crate) fn map_section_row(row: &SqliteRow) -> Result<Section, StorageError> {
    let module_id = row
        .try_get::<Option<i64>, _>("module_id")
        .map_err(ser)?
        .map(|v| i64_to_u64("module_id", v).map(ModuleId::new))
        .transpose()?;
    let order = i32::try_from(get_i64(row, "sort_order")?).map_err(ser)?;
    let content_type: ContentType = row
        .try_get::<String, _>("content_type")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    Section::new(
        SectionId::new(i64_to_u64("id", get_i64(row, "id")?)?),
        CourseId::new(i64_to_u64("course_id", get_i64(row, "course_id")?)?),
        module_id,
        row.try_get::<String, _>("title").map_err(ser)?,
        order,
        content_type,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    let key = ProgressKey::new(
        UserId::new(i64_to_u64("user_id", get_i64(row, "user_id")?)?),
        CourseId::new(i64_to_u64("course_id", get_i64(row, "course_id")?)?),
        SectionId::new(i64_to_u64("section_id", get_i64(row, "section_id")?)?),
    );

    ProgressRecord::from_persisted(
        ProgressId::new(i64_to_u64("id", get_i64(row, "id")?)?),
        key,
        get_i64(row, "is_completed")? != 0,
        row.try_get("completion_date").map_err(ser)?,
        i64_to_u64("time_spent", get_i64(row, "time_spent")?)?,
        row.try_get("last_position").map_err(ser)?,
        row.try_get("notes").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}
