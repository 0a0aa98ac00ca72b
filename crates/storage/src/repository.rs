use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    Course, CourseId, Module, ModuleId, ProgressDelta, ProgressId, ProgressKey, ProgressRecord,
    Section, SectionId, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether retrying later could succeed (the backend was unavailable or busy).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}

/// Read/write access to the course structure.
///
/// Progress tracking only reads it; the write half exists for seeding and for
/// the authoring collaborator.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or update a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Persist or update a module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the course does not exist.
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError>;

    /// Persist or update a section.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the course or module does not exist.
    async fn upsert_section(&self, section: &Section) -> Result<(), StorageError>;

    /// Delete a section together with every progress record that references it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the section does not exist.
    async fn delete_section(&self, id: SectionId) -> Result<(), StorageError>;

    /// Fetch a course by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError>;

    /// List the modules of a course, in no guaranteed order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_modules(&self, course_id: CourseId) -> Result<Vec<Module>, StorageError>;

    /// List every section currently belonging to a course (module sections and
    /// standalone sections), in no guaranteed order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_sections(&self, course_id: CourseId) -> Result<Vec<Section>, StorageError>;

    /// Fetch a section by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_section(&self, id: SectionId) -> Result<Option<Section>, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Enroll a user in a course. Returns `true` if the enrollment is new.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the course does not exist.
    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn is_enrolled(&self, user_id: UserId, course_id: CourseId)
    -> Result<bool, StorageError>;
}

/// Durable upsert and retrieval of progress records.
///
/// Implementations serialize writes per key: the additive `time_spent` update
/// and the false→true completion flip must never be lost to a concurrent writer.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Apply one flush: create the record if absent, add the time increment,
    /// overwrite the position, and when `complete` is set flip the record to
    /// completed, all in one write.
    ///
    /// An already completed record keeps its completion date.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn record_flush(
        &self,
        key: ProgressKey,
        delta: &ProgressDelta,
        complete: bool,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError>;

    /// Create-or-update without any completion side effect.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn upsert_progress(
        &self,
        key: ProgressKey,
        delta: &ProgressDelta,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        self.record_flush(key, delta, false, at).await
    }

    /// Idempotently mark a section complete, creating the record if needed.
    ///
    /// Returns the existing record unchanged if it was already complete.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn mark_completed(
        &self,
        key: ProgressKey,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError>;

    /// Replace the notes on a record, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn update_notes(
        &self,
        key: ProgressKey,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError>;

    /// Fetch a record by its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record has this id.
    async fn get_progress(&self, id: ProgressId) -> Result<ProgressRecord, StorageError>;

    /// All records of a user within a course, in no guaranteed order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_progress_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<ProgressRecord>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct CatalogState {
    courses: HashMap<CourseId, Course>,
    modules: HashMap<ModuleId, Module>,
    sections: HashMap<SectionId, Section>,
}

#[derive(Default)]
struct ProgressState {
    next_id: u64,
    records: HashMap<ProgressKey, ProgressRecord>,
}

impl ProgressState {
    fn entry(&mut self, key: ProgressKey, at: DateTime<Utc>) -> &mut ProgressRecord {
        let next_id = &mut self.next_id;
        self.records.entry(key).or_insert_with(|| {
            *next_id += 1;
            ProgressRecord::start(ProgressId::new(*next_id), key, at)
        })
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Mirrors the foreign keys of the `SQLite` schema: writes that reference a
/// missing course or section fail with `StorageError::Conflict`.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    catalog: Arc<Mutex<CatalogState>>,
    enrollments: Arc<Mutex<HashSet<(UserId, CourseId)>>>,
    progress: Arc<Mutex<ProgressState>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock catalog then progress, after checking `key` references live rows.
    ///
    /// Writers keep the catalog guard while they touch progress, so a
    /// concurrent `delete_section` cannot slip between the check and the write.
    fn progress_for(
        &self,
        key: ProgressKey,
    ) -> Result<(MutexGuard<'_, CatalogState>, MutexGuard<'_, ProgressState>), StorageError> {
        let catalog = lock(&self.catalog)?;
        if !catalog.courses.contains_key(&key.course_id) {
            return Err(StorageError::Conflict(format!(
                "course {} does not exist",
                key.course_id
            )));
        }
        if !catalog.sections.contains_key(&key.section_id) {
            return Err(StorageError::Conflict(format!(
                "section {} does not exist",
                key.section_id
            )));
        }
        let progress = lock(&self.progress)?;
        Ok((catalog, progress))
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = lock(&self.catalog)?;
        guard.courses.insert(course.id(), course.clone());
        Ok(())
    }

    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        let mut guard = lock(&self.catalog)?;
        if !guard.courses.contains_key(&module.course_id()) {
            return Err(StorageError::Conflict(format!(
                "course {} does not exist",
                module.course_id()
            )));
        }
        guard.modules.insert(module.id(), module.clone());
        Ok(())
    }

    async fn upsert_section(&self, section: &Section) -> Result<(), StorageError> {
        let mut guard = lock(&self.catalog)?;
        if !guard.courses.contains_key(&section.course_id()) {
            return Err(StorageError::Conflict(format!(
                "course {} does not exist",
                section.course_id()
            )));
        }
        if let Some(module_id) = section.module_id() {
            if !guard.modules.contains_key(&module_id) {
                return Err(StorageError::Conflict(format!(
                    "module {module_id} does not exist"
                )));
            }
        }
        guard.sections.insert(section.id(), section.clone());
        Ok(())
    }

    async fn delete_section(&self, id: SectionId) -> Result<(), StorageError> {
        let mut catalog = lock(&self.catalog)?;
        let mut progress = lock(&self.progress)?;
        catalog.sections.remove(&id).ok_or(StorageError::NotFound)?;
        progress.records.retain(|key, _| key.section_id != id);
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<Course>, StorageError> {
        let guard = lock(&self.catalog)?;
        Ok(guard.courses.get(&id).cloned())
    }

    async fn list_modules(&self, course_id: CourseId) -> Result<Vec<Module>, StorageError> {
        let guard = lock(&self.catalog)?;
        Ok(guard
            .modules
            .values()
            .filter(|m| m.course_id() == course_id)
            .cloned()
            .collect())
    }

    async fn list_sections(&self, course_id: CourseId) -> Result<Vec<Section>, StorageError> {
        let guard = lock(&self.catalog)?;
        Ok(guard
            .sections
            .values()
            .filter(|s| s.course_id() == course_id)
            .cloned()
            .collect())
    }

    async fn get_section(&self, id: SectionId) -> Result<Option<Section>, StorageError> {
        let guard = lock(&self.catalog)?;
        Ok(guard.sections.get(&id).cloned())
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn enroll(
        &self,
        user_id: UserId,
        course_id: CourseId,
        _at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        if !lock(&self.catalog)?.courses.contains_key(&course_id) {
            return Err(StorageError::Conflict(format!(
                "course {course_id} does not exist"
            )));
        }
        let mut guard = lock(&self.enrollments)?;
        Ok(guard.insert((user_id, course_id)))
    }

    async fn is_enrolled(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<bool, StorageError> {
        let guard = lock(&self.enrollments)?;
        Ok(guard.contains(&(user_id, course_id)))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn record_flush(
        &self,
        key: ProgressKey,
        delta: &ProgressDelta,
        complete: bool,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        let (_catalog, mut guard) = self.progress_for(key)?;
        let record = guard.entry(key, at);
        record.apply_delta(delta, at);
        if complete {
            record.mark_completed(at);
        }
        Ok(record.clone())
    }

    async fn mark_completed(
        &self,
        key: ProgressKey,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        let (_catalog, mut guard) = self.progress_for(key)?;
        let record = guard.entry(key, at);
        record.mark_completed(at);
        Ok(record.clone())
    }

    async fn update_notes(
        &self,
        key: ProgressKey,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        let (_catalog, mut guard) = self.progress_for(key)?;
        let record = guard.entry(key, at);
        record.set_notes(notes.map(str::to_owned), at);
        Ok(record.clone())
    }

    async fn get_progress(&self, id: ProgressId) -> Result<ProgressRecord, StorageError> {
        let guard = lock(&self.progress)?;
        guard
            .records
            .values()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn get_progress_for_course(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = lock(&self.progress)?;
        Ok(guard
            .records
            .values()
            .filter(|r| r.user_id() == user_id && r.course_id() == course_id)
            .cloned()
            .collect())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryRepository::new())
    }

    /// Wrap an existing in-memory repository, so tests can keep a handle to it.
    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let enrollments: Arc<dyn EnrollmentRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self {
            catalog,
            enrollments,
            progress,
        }
    }
}
