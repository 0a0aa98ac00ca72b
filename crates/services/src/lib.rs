#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog_service;
pub mod enrollment_service;
pub mod error;
pub mod progress_service;

pub use progress_core::Clock;

pub use app_services::AppServices;
pub use catalog_service::CatalogService;
pub use enrollment_service::EnrollmentService;
pub use error::{
    AppServicesError, CatalogServiceError, EnrollmentServiceError, ProgressServiceError,
};
pub use progress_service::ProgressService;
