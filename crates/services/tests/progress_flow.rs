use progress_core::completion::CompletionPolicy;
use progress_core::model::{
    ContentType, Course, CourseId, FlushReport, Module, ModuleId, Section, SectionId, UserId,
};
use progress_core::time::fixed_clock;
use services::{AppServices, ProgressServiceError};
use storage::repository::Storage;

const USER: UserId = UserId::new(42);
const COURSE: CourseId = CourseId::new(1);
const S1: SectionId = SectionId::new(1);
const S2: SectionId = SectionId::new(2);

async fn two_section_course(storage: &Storage) -> AppServices {
    let services = AppServices::from_storage(storage, fixed_clock(), CompletionPolicy::default());
    let catalog = services.catalog();

    catalog
        .upsert_course(&Course::new(COURSE, "Ownership in practice", None).unwrap())
        .await
        .unwrap();
    catalog
        .upsert_module(&Module::new(ModuleId::new(1), COURSE, "Basics", 1).unwrap())
        .await
        .unwrap();
    catalog
        .upsert_section(
            &Section::new(S1, COURSE, Some(ModuleId::new(1)), "Intro video", 1, ContentType::Video)
                .unwrap(),
        )
        .await
        .unwrap();
    catalog
        .upsert_section(
            &Section::new(S2, COURSE, Some(ModuleId::new(1)), "Reading", 2, ContentType::Text)
                .unwrap(),
        )
        .await
        .unwrap();

    services.enrollments().enroll(USER, COURSE).await.unwrap();
    services
}

fn flush(position: f64, time: i64) -> FlushReport {
    FlushReport {
        last_position: position,
        time_spent: time,
        ended: false,
    }
}

async fn run_course_scenario(storage: Storage) {
    let services = two_section_course(&storage).await;
    let progress = services.progress();

    let first = progress
        .update_progress(USER, COURSE, S1, flush(40.0, 30))
        .await
        .unwrap();
    assert!(!first.is_completed());
    assert_eq!(first.time_spent(), 30);

    let second = progress
        .update_progress(USER, COURSE, S1, flush(97.0, 30))
        .await
        .unwrap();
    assert_eq!(second.time_spent(), 60);
    assert!(second.is_completed());
    assert!(second.completion_date().is_some());

    let halfway = progress.get_course_progress(USER, COURSE).await.unwrap();
    assert!((halfway.completion_percentage - 50.0).abs() < f64::EPSILON);
    assert_eq!(halfway.next_section_id, Some(S2));

    let text = progress.complete_section(USER, COURSE, S2).await.unwrap();
    assert!(text.is_completed());

    let summary = progress.get_course_progress(USER, COURSE).await.unwrap();
    assert!((summary.completion_percentage - 100.0).abs() < f64::EPSILON);
    assert_eq!(summary.completed_sections, 2);
    assert_eq!(summary.next_section_id, None);
    let order: Vec<SectionId> = summary
        .progress_records
        .iter()
        .map(|r| r.section_id())
        .collect();
    assert_eq!(order, vec![S1, S2]);
}

#[tokio::test]
async fn course_scenario_in_memory() {
    run_course_scenario(Storage::in_memory()).await;
}

#[tokio::test]
async fn course_scenario_sqlite() {
    let storage = Storage::sqlite("sqlite:file:memdb_course_scenario?mode=memory&cache=shared")
        .await
        .expect("sqlite storage");
    run_course_scenario(storage).await;
}

#[tokio::test]
async fn completed_section_is_never_uncompleted() {
    let storage = Storage::in_memory();
    let services = two_section_course(&storage).await;
    let progress = services.progress();

    let done = progress.complete_section(USER, COURSE, S1).await.unwrap();
    let after = progress
        .update_progress(USER, COURSE, S1, flush(3.0, 15))
        .await
        .unwrap();

    assert!(after.is_completed());
    assert_eq!(after.completion_date(), done.completion_date());
    assert!((after.last_position() - 3.0).abs() < f64::EPSILON);
    assert_eq!(after.time_spent(), 15);

    let again = progress.complete_section(USER, COURSE, S1).await.unwrap();
    assert_eq!(again.completion_date(), done.completion_date());
}

#[tokio::test]
async fn deleted_sections_drop_out_of_the_percentage() {
    let storage = Storage::in_memory();
    let services = two_section_course(&storage).await;
    let progress = services.progress();

    progress.complete_section(USER, COURSE, S1).await.unwrap();
    services.catalog().delete_section(S2).await.unwrap();

    let summary = progress.get_course_progress(USER, COURSE).await.unwrap();
    assert!((summary.completion_percentage - 100.0).abs() < f64::EPSILON);
    assert_eq!(summary.total_sections, 1);
}

#[tokio::test]
async fn non_enrolled_reader_sees_empty_summary() {
    let storage = Storage::in_memory();
    let services = two_section_course(&storage).await;

    let summary = services
        .progress()
        .get_course_progress(UserId::new(5), COURSE)
        .await
        .unwrap();
    assert!(summary.progress_records.is_empty());
    assert!(summary.completion_percentage.abs() < f64::EPSILON);
    assert_eq!(summary.total_sections, 2);

    let err = services
        .progress()
        .get_course_progress(USER, CourseId::new(77))
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::CourseNotFound(_)));
}

#[tokio::test]
async fn custom_threshold_is_respected() {
    let storage = Storage::in_memory();
    two_section_course(&storage).await;
    let strict =
        AppServices::from_storage(&storage, fixed_clock(), CompletionPolicy::new(100.0).unwrap());

    let record = strict
        .progress()
        .update_progress(USER, COURSE, S1, flush(97.0, 10))
        .await
        .unwrap();
    assert!(!record.is_completed());
}
