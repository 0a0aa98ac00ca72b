use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderName, Method, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::{get, post, put},
};
use progress_core::completion::CourseProgressSummary;
use progress_core::model::{CourseId, CourseOutline, FlushReport, ProgressRecord, SectionId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::auth::{CurrentUser, USER_ID_HEADER};
use crate::error::ApiError;
use crate::state::AppState;

/// Body of a progress flush.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdateRequest {
    #[validate(range(min = 0.0, max = 100.0))]
    pub last_position: f64,
    #[validate(range(min = 0, max = 86_400))]
    pub time_spent: i64,
    /// Playback reached the natural end of the content.
    #[serde(default, alias = "forceComplete")]
    pub ended: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NotesRequest {
    #[validate(length(max = 10000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub enrolled: bool,
}

/// Unwrap a JSON body and run its declarative checks.
fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(body) = payload?;
    body.validate()?;
    Ok(body)
}

async fn update_progress(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path((course_id, section_id)): Path<(CourseId, SectionId)>,
    payload: Result<Json<ProgressUpdateRequest>, JsonRejection>,
) -> Result<Json<ProgressRecord>, ApiError> {
    let body = validated(payload)?;
    let report = FlushReport {
        last_position: body.last_position,
        time_spent: body.time_spent,
        ended: body.ended,
    };
    let record = state
        .progress()
        .update_progress(user_id, course_id, section_id, report)
        .await?;
    Ok(Json(record))
}

async fn complete_section(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path((course_id, section_id)): Path<(CourseId, SectionId)>,
) -> Result<Json<ProgressRecord>, ApiError> {
    let record = state
        .progress()
        .complete_section(user_id, course_id, section_id)
        .await?;
    Ok(Json(record))
}

async fn course_progress(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(course_id): Path<CourseId>,
) -> Result<Json<CourseProgressSummary>, ApiError> {
    let summary = state
        .progress()
        .get_course_progress(user_id, course_id)
        .await?;
    Ok(Json(summary))
}

async fn update_notes(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path((course_id, section_id)): Path<(CourseId, SectionId)>,
    payload: Result<Json<NotesRequest>, JsonRejection>,
) -> Result<Json<ProgressRecord>, ApiError> {
    let body = validated(payload)?;
    let record = state
        .progress()
        .update_notes(user_id, course_id, section_id, body.notes)
        .await?;
    Ok(Json(record))
}

async fn course_outline(
    State(state): State<AppState>,
    Path(course_id): Path<CourseId>,
) -> Result<Json<CourseOutline>, ApiError> {
    Ok(Json(state.catalog().outline(course_id).await?))
}

async fn enroll(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(course_id): Path<CourseId>,
) -> Result<impl IntoResponse, ApiError> {
    let enrolled = state.enrollments().enroll(user_id, course_id).await?;
    let status = if enrolled {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(EnrollResponse { enrolled })))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)])
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/courses/{course_id}/progress", get(course_progress))
        .route("/courses/{course_id}/outline", get(course_outline))
        .route("/courses/{course_id}/enroll", post(enroll))
        .route(
            "/courses/{course_id}/sections/{section_id}/progress",
            post(update_progress),
        )
        .route(
            "/courses/{course_id}/sections/{section_id}/complete",
            post(complete_section),
        )
        .route(
            "/courses/{course_id}/sections/{section_id}/notes",
            put(update_notes),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
