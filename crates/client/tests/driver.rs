use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use progress_client::{
    Flush, FlushTransport, ReporterConfig, ReporterDriver, ReporterState, SectionTarget,
    TransportError,
};
use progress_core::model::{
    ContentType, CourseId, ProgressId, ProgressKey, ProgressRecord, SectionId, UserId,
};
use progress_core::time::{fixed_clock, fixed_now};
use reqwest::StatusCode;

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Flush>>,
    failing: bool,
}

impl RecordingTransport {
    fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    fn sent(&self) -> Vec<Flush> {
        self.sent.lock().unwrap().clone()
    }
}

fn record_for(course_id: CourseId, section_id: SectionId, completed: bool) -> ProgressRecord {
    let key = ProgressKey::new(UserId::new(1), course_id, section_id);
    let mut record = ProgressRecord::start(ProgressId::new(1), key, fixed_now());
    if completed {
        record.mark_completed(fixed_now());
    }
    record
}

#[async_trait]
impl FlushTransport for RecordingTransport {
    async fn flush(&self, flush: &Flush) -> Result<ProgressRecord, TransportError> {
        self.sent.lock().unwrap().push(*flush);
        if self.failing {
            return Err(TransportError::HttpStatus(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(record_for(flush.course_id, flush.section_id, flush.ended))
    }

    async fn complete(
        &self,
        course_id: CourseId,
        section_id: SectionId,
    ) -> Result<ProgressRecord, TransportError> {
        if self.failing {
            return Err(TransportError::HttpStatus(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(record_for(course_id, section_id, true))
    }
}

fn video(section: u64) -> SectionTarget {
    SectionTarget::new(CourseId::new(1), SectionId::new(section), ContentType::Video)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn flushes_every_interval_of_active_time() {
    let transport = Arc::new(RecordingTransport::default());
    let driver = ReporterDriver::spawn(ReporterConfig::default(), fixed_clock(), transport.clone());

    driver.start(video(1));
    driver.set_position(25.0);
    tokio::time::sleep(Duration::from_millis(30_500)).await;
    settle().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].time_spent, 30);
    assert!((sent[0].last_position - 25.0).abs() < f64::EPSILON);

    // Under a second since the last flush: stopping sends nothing more.
    driver.stop();
    settle().await;
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(driver.snapshot().state(), ReporterState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn switching_sections_flushes_the_previous_one() {
    let transport = Arc::new(RecordingTransport::default());
    let driver = ReporterDriver::spawn(ReporterConfig::default(), fixed_clock(), transport.clone());

    driver.start(video(1));
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    driver.start(video(2));
    settle().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].section_id, SectionId::new(1));
    assert_eq!(sent[0].time_spent, 5);
    assert_eq!(
        driver.snapshot().current().map(|t| t.section_id),
        Some(SectionId::new(2))
    );
}

#[tokio::test(start_paused = true)]
async fn failed_flushes_are_not_resent() {
    let transport = Arc::new(RecordingTransport::failing());
    let driver = ReporterDriver::spawn(ReporterConfig::default(), fixed_clock(), transport.clone());

    driver.start(video(1));
    tokio::time::sleep(Duration::from_millis(60_500)).await;
    settle().await;

    let times: Vec<u32> = transport.sent().iter().map(|f| f.time_spent).collect();
    assert_eq!(times, vec![30, 30]);
}

#[tokio::test(start_paused = true)]
async fn natural_end_is_acknowledged() {
    let transport = Arc::new(RecordingTransport::default());
    let driver = ReporterDriver::spawn(ReporterConfig::default(), fixed_clock(), transport.clone());

    driver.start(video(1));
    tokio::time::sleep(Duration::from_millis(3_200)).await;
    driver.ended();
    settle().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].ended);
    assert!((sent[0].last_position - 100.0).abs() < f64::EPSILON);
    assert!(driver.snapshot().current().unwrap().completed);
    assert_eq!(driver.snapshot().state(), ReporterState::Stopped);

    // A finished video left on screen accrues no more time.
    tokio::time::sleep(Duration::from_secs(65)).await;
    settle().await;
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_completion_surfaces_errors() {
    let transport = Arc::new(RecordingTransport::failing());
    let driver = ReporterDriver::spawn(ReporterConfig::default(), fixed_clock(), transport);

    let err = driver
        .complete_section(CourseId::new(1), SectionId::new(1))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test(start_paused = true)]
async fn close_sends_the_final_flush() {
    let transport = Arc::new(RecordingTransport::default());
    let driver = ReporterDriver::spawn(ReporterConfig::default(), fixed_clock(), transport.clone());

    driver.start(video(1));
    tokio::time::sleep(Duration::from_millis(12_300)).await;
    driver.close().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].time_spent, 12);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_driver_sends_the_final_flush() {
    let transport = Arc::new(RecordingTransport::default());
    let driver = ReporterDriver::spawn(ReporterConfig::default(), fixed_clock(), transport.clone());

    driver.start(video(1));
    driver.set_position(40.0);
    tokio::time::sleep(Duration::from_millis(12_300)).await;
    drop(driver);
    settle().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].time_spent, 12);
    assert!((sent[0].last_position - 40.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn close_then_drop_flushes_once() {
    let transport = Arc::new(RecordingTransport::default());
    let driver = ReporterDriver::spawn(ReporterConfig::default(), fixed_clock(), transport.clone());

    driver.start(video(1));
    tokio::time::sleep(Duration::from_millis(4_200)).await;
    driver.close().await;
    settle().await;

    assert_eq!(transport.sent().len(), 1);
}
