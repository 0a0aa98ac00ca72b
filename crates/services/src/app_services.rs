use std::sync::Arc;

use progress_core::completion::CompletionPolicy;
use storage::repository::Storage;

use crate::Clock;
use crate::catalog_service::CatalogService;
use crate::enrollment_service::EnrollmentService;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;

/// Assembles the services the HTTP layer talks to.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
    catalog: Arc<CatalogService>,
    enrollments: Arc<EnrollmentService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        policy: CompletionPolicy,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, policy))
    }

    /// Wire services over an already-built `Storage` (in-memory in tests).
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, policy: CompletionPolicy) -> Self {
        let progress = Arc::new(ProgressService::new(
            clock,
            policy,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
        ));
        let catalog = Arc::new(CatalogService::new(Arc::clone(&storage.catalog)));
        let enrollments = Arc::new(EnrollmentService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.enrollments),
        ));

        Self {
            progress,
            catalog,
            enrollments,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn enrollments(&self) -> Arc<EnrollmentService> {
        Arc::clone(&self.enrollments)
    }
}
