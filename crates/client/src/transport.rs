use std::env;

use async_trait::async_trait;
use progress_core::model::{CourseId, ProgressRecord, SectionId, UserId};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::reporter::Flush;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("progress request failed with status {0}")]
    HttpStatus(StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Whether the request may succeed if sent again later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::HttpStatus(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            TransportError::Http(e) => e.is_timeout() || e.is_connect(),
        }
    }
}

/// Where flushes go. Implemented over HTTP for real clients and by fakes in tests.
#[async_trait]
pub trait FlushTransport: Send + Sync {
    /// Send one progress increment.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the server could not be reached or rejected the flush.
    async fn flush(&self, flush: &Flush) -> Result<ProgressRecord, TransportError>;

    /// Ask the server to mark a section complete.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the server could not be reached or rejected the request.
    async fn complete(
        &self,
        course_id: CourseId,
        section_id: SectionId,
    ) -> Result<ProgressRecord, TransportError>;
}

#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    pub base_url: String,
    pub user_id: UserId,
}

impl HttpTransportConfig {
    /// Read `LMS_API_URL` (default `http://127.0.0.1:8080`) and `LMS_USER_ID`.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let user_id = env::var("LMS_USER_ID").ok()?.parse().ok()?;
        let base_url =
            env::var("LMS_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".into());
        Some(Self { base_url, user_id })
    }
}

/// JSON-over-HTTP transport speaking the server's progress API.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn section_url(&self, course_id: CourseId, section_id: SectionId, action: &str) -> String {
        format!(
            "{}/api/courses/{course_id}/sections/{section_id}/{action}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn post<B: Serialize + Sync>(
        &self,
        url: String,
        body: Option<&B>,
    ) -> Result<ProgressRecord, TransportError> {
        let mut request = self
            .client
            .post(url)
            .header("x-user-id", self.config.user_id.to_string());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl FlushTransport for HttpTransport {
    async fn flush(&self, flush: &Flush) -> Result<ProgressRecord, TransportError> {
        let url = self.section_url(flush.course_id, flush.section_id, "progress");
        let payload = FlushRequest {
            last_position: flush.last_position,
            time_spent: flush.time_spent,
            ended: flush.ended,
        };
        self.post(url, Some(&payload)).await
    }

    async fn complete(
        &self,
        course_id: CourseId,
        section_id: SectionId,
    ) -> Result<ProgressRecord, TransportError> {
        let url = self.section_url(course_id, section_id, "complete");
        self.post::<FlushRequest>(url, None).await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlushRequest {
    last_position: f64,
    time_spent: u32,
    ended: bool,
}
