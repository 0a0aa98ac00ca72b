use std::sync::Arc;

use services::{AppServices, CatalogService, EnrollmentService, ProgressService};

#[derive(Clone)]
pub struct AppState {
    services: AppServices,
}

impl AppState {
    #[must_use]
    pub fn new(services: AppServices) -> Self {
        Self { services }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        self.services.progress()
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        self.services.catalog()
    }

    #[must_use]
    pub fn enrollments(&self) -> Arc<EnrollmentService> {
        self.services.enrollments()
    }
}
