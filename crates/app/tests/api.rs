use app::seed::{DEMO_COURSE_ID, seed_demo_course};
use app::{AppState, build_router};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use progress_core::completion::CompletionPolicy;
use progress_core::model::UserId;
use progress_core::time::fixed_clock;
use serde_json::{Value, json};
use services::AppServices;
use storage::repository::Storage;
use tower::ServiceExt;

const LEARNER: u64 = 9;

async fn router() -> Router {
    let storage = Storage::in_memory();
    let services = AppServices::from_storage(&storage, fixed_clock(), CompletionPolicy::default());
    seed_demo_course(&services, UserId::new(LEARNER)).await.unwrap();
    build_router(AppState::new(services))
}

fn request(method: &str, uri: &str, user: Option<u64>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn progress_uri(section: u64) -> String {
    format!("/api/courses/{DEMO_COURSE_ID}/sections/{section}/progress")
}

fn complete_uri(section: u64) -> String {
    format!("/api/courses/{DEMO_COURSE_ID}/sections/{section}/complete")
}

#[tokio::test]
async fn health_needs_no_identity() {
    let app = router().await;
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = router().await;
    let body = json!({ "lastPosition": 10.0, "timeSpent": 30 });
    let (status, _) = send(&app, request("POST", &progress_uri(1), None, Some(body))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri(format!("/api/courses/{DEMO_COURSE_ID}/progress"))
        .header("x-user-id", "not-a-number")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn out_of_range_payload_is_rejected() {
    let app = router().await;
    for body in [
        json!({ "lastPosition": 150.0, "timeSpent": 30 }),
        json!({ "lastPosition": 10.0, "timeSpent": -5 }),
    ] {
        let (status, body) =
            send(&app, request("POST", &progress_uri(1), Some(LEARNER), Some(body))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].is_string());
    }

    let (status, _) = send(
        &app,
        request("GET", &format!("/api/courses/{DEMO_COURSE_ID}/progress"), Some(LEARNER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_json_is_a_client_error() {
    let app = router().await;
    let req = Request::builder()
        .method("POST")
        .uri(progress_uri(1))
        .header("x-user-id", LEARNER.to_string())
        .header("content-type", "application/json")
        .body(Body::from("{\"lastPosition\":"))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn writes_require_enrollment() {
    let app = router().await;
    let body = json!({ "lastPosition": 10.0, "timeSpent": 30 });
    let (status, _) = send(&app, request("POST", &progress_uri(1), Some(77), Some(body))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let enroll_uri = format!("/api/courses/{DEMO_COURSE_ID}/enroll");
    let (status, body) = send(&app, request("POST", &enroll_uri, Some(77), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["enrolled"], true);
    let (status, body) = send(&app, request("POST", &enroll_uri, Some(77), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enrolled"], false);

    let body = json!({ "lastPosition": 10.0, "timeSpent": 30 });
    let (status, _) = send(&app, request("POST", &progress_uri(1), Some(77), Some(body))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_sections_and_courses_are_not_found() {
    let app = router().await;
    let body = json!({ "lastPosition": 10.0, "timeSpent": 30 });
    let (status, _) = send(&app, request("POST", &progress_uri(404), Some(LEARNER), Some(body))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        request("GET", "/api/courses/999/progress", Some(LEARNER), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request("GET", "/api/courses/999/outline", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn flushes_accumulate_time_and_keep_latest_position() {
    let app = router().await;
    for (position, seconds) in [(20.0, 30), (45.5, 30), (40.0, 12)] {
        let body = json!({ "lastPosition": position, "timeSpent": seconds });
        let (status, _) =
            send(&app, request("POST", &progress_uri(1), Some(LEARNER), Some(body))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        request("GET", &format!("/api/courses/{DEMO_COURSE_ID}/progress"), Some(LEARNER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let record = &body["progressRecords"][0];
    assert_eq!(record["timeSpent"], 72);
    assert_eq!(record["lastPosition"], 40.0);
    assert_eq!(record["isCompleted"], false);
    assert_eq!(body["completionPercentage"], 0.0);
}

#[tokio::test]
async fn text_sections_ignore_the_ended_flag() {
    let app = router().await;
    let body = json!({ "lastPosition": 100.0, "timeSpent": 60, "ended": true });
    let (status, body) =
        send(&app, request("POST", &progress_uri(2), Some(LEARNER), Some(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isCompleted"], false);
}

#[tokio::test]
async fn notes_are_stored_and_length_checked() {
    let app = router().await;
    let uri = format!("/api/courses/{DEMO_COURSE_ID}/sections/2/notes");
    let (status, body) = send(
        &app,
        request("PUT", &uri, Some(LEARNER), Some(json!({ "notes": "check chapter 3" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notes"], "check chapter 3");

    let too_long = "x".repeat(10_001);
    let (status, _) = send(
        &app,
        request("PUT", &uri, Some(LEARNER), Some(json!({ "notes": too_long }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn learner_reaches_full_completion() {
    let app = router().await;
    let progress_path = format!("/api/courses/{DEMO_COURSE_ID}/progress");

    // Video crosses the threshold.
    let body = json!({ "lastPosition": 96.0, "timeSpent": 30 });
    let (_, record) = send(&app, request("POST", &progress_uri(1), Some(LEARNER), Some(body))).await;
    assert_eq!(record["isCompleted"], true);

    // Text only completes explicitly.
    let (status, record) = send(&app, request("POST", &complete_uri(2), Some(LEARNER), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["isCompleted"], true);

    // Mixed content finishes playback.
    let body = json!({ "lastPosition": 100.0, "timeSpent": 5, "ended": true });
    let (_, record) = send(&app, request("POST", &progress_uri(3), Some(LEARNER), Some(body))).await;
    assert_eq!(record["isCompleted"], true);

    let (_, summary) = send(&app, request("GET", &progress_path, Some(LEARNER), None)).await;
    assert_eq!(summary["completionPercentage"], 60.0);
    assert_eq!(summary["nextSectionId"], 4);

    // A later low-position flush does not undo completion.
    let body = json!({ "lastPosition": 3.0, "timeSpent": 10 });
    let (_, record) = send(&app, request("POST", &progress_uri(1), Some(LEARNER), Some(body))).await;
    assert_eq!(record["isCompleted"], true);
    assert_eq!(record["timeSpent"], 40);

    let (_, _) = send(&app, request("POST", &complete_uri(4), Some(LEARNER), None)).await;
    let (_, _) = send(&app, request("POST", &complete_uri(5), Some(LEARNER), None)).await;
    // Repeating an explicit completion is harmless.
    let (status, _) = send(&app, request("POST", &complete_uri(5), Some(LEARNER), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, summary) = send(&app, request("GET", &progress_path, Some(LEARNER), None)).await;
    assert_eq!(summary["completionPercentage"], 100.0);
    assert_eq!(summary["completedSections"], 5);
    assert_eq!(summary["totalSections"], 5);
    assert!(summary["nextSectionId"].is_null());
    let order: Vec<u64> = summary["progressRecords"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["sectionId"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn outline_lists_modules_in_order() {
    let app = router().await;
    let (status, body) = send(
        &app,
        request("GET", &format!("/api/courses/{DEMO_COURSE_ID}/outline"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["course"]["title"], "Getting Started");
    assert_eq!(body["modules"][0]["module"]["title"], "Basics");
    assert_eq!(body["modules"][1]["sections"][0]["contentType"], "mixed");
    assert_eq!(body["standaloneSections"][0]["title"], "Glossary");
}
