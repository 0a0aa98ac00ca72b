use std::time::Duration;

use chrono::{DateTime, Utc};
use progress_core::model::{
    ContentType, CourseId, FlushReport, MAX_FLUSH_SECONDS, MAX_POSITION, ProgressRecord, SectionId,
};

/// Timing knobs for the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReporterConfig {
    /// Active time accumulated before a periodic flush is sent.
    pub flush_interval: Duration,
    /// How often the driver samples the clock.
    pub tick: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(30),
            tick: Duration::from_secs(1),
        }
    }
}

/// The section a learner is consuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionTarget {
    pub course_id: CourseId,
    pub section_id: SectionId,
    pub content_type: ContentType,
    /// Already complete on the server; the end-of-content signal is then not resent.
    pub completed: bool,
}

impl SectionTarget {
    #[must_use]
    pub fn new(course_id: CourseId, section_id: SectionId, content_type: ContentType) -> Self {
        Self {
            course_id,
            section_id,
            content_type,
            completed: false,
        }
    }

    fn is_same_section(&self, other: &SectionTarget) -> bool {
        self.course_id == other.course_id && self.section_id == other.section_id
    }
}

/// One progress increment to send to the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flush {
    pub course_id: CourseId,
    pub section_id: SectionId,
    pub last_position: f64,
    /// Whole seconds accumulated since the previous flush of this section.
    pub time_spent: u32,
    pub ended: bool,
}

impl Flush {
    #[must_use]
    pub fn report(&self) -> FlushReport {
        FlushReport {
            last_position: self.last_position,
            time_spent: i64::from(self.time_spent),
            ended: self.ended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Idle,
    Active,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct Tracking {
    target: SectionTarget,
    position: f64,
    pending: Duration,
    last_sample: DateTime<Utc>,
}

impl Tracking {
    fn sample(&mut self, now: DateTime<Utc>) {
        // A clock that stepped backwards contributes nothing.
        let elapsed = (now - self.last_sample).to_std().unwrap_or_default();
        self.pending += elapsed;
        self.last_sample = now;
    }

    /// Take the whole seconds out of `pending`, keeping the sub-second remainder.
    fn take(&mut self, ended: bool) -> Option<Flush> {
        let whole = self.pending.as_secs();
        if whole == 0 && !ended {
            return None;
        }
        self.pending -= Duration::from_secs(whole);

        let capped = whole.min(MAX_FLUSH_SECONDS.unsigned_abs());
        if capped < whole {
            tracing::warn!(
                section_id = %self.target.section_id,
                dropped = whole - capped,
                "pending time exceeds a single flush, truncating"
            );
        }
        let time_spent = u32::try_from(capped).unwrap_or(u32::MAX);

        Some(Flush {
            course_id: self.target.course_id,
            section_id: self.target.section_id,
            last_position: self.position,
            time_spent,
            ended,
        })
    }
}

/// Turns continuous consumption of a section into periodic flushes.
///
/// `Idle` until a section starts, `Active` while it is being consumed,
/// `Stopped` after the learner leaves it. Only one section is tracked at a
/// time. Time is accumulated locally and only leaves through a returned
/// `Flush`; once returned, that time is never reported again.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    config: ReporterConfig,
    state: ReporterState,
    tracking: Option<Tracking>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            config,
            state: ReporterState::Idle,
            tracking: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> ReporterConfig {
        self.config
    }

    #[must_use]
    pub fn state(&self) -> ReporterState {
        self.state
    }

    #[must_use]
    pub fn current(&self) -> Option<SectionTarget> {
        self.tracking.map(|t| t.target)
    }

    /// Whole seconds accumulated and not yet flushed.
    #[must_use]
    pub fn pending_seconds(&self) -> u64 {
        self.tracking.map_or(0, |t| t.pending.as_secs())
    }

    /// Begin tracking `target`.
    ///
    /// Starting the section that is already active is a no-op. Starting another
    /// section stops the current one first and returns its final flush.
    pub fn start(&mut self, target: SectionTarget, now: DateTime<Utc>) -> Option<Flush> {
        if self.state == ReporterState::Active {
            if self.tracking.is_some_and(|t| t.target.is_same_section(&target)) {
                return None;
            }
        }

        let previous = self.stop(now);
        let mut target = target;
        let mut position = 0.0;
        // Resuming a stopped section keeps where the learner left off.
        if let Some(t) = self.tracking.filter(|t| t.target.is_same_section(&target)) {
            position = t.position;
            target.completed |= t.target.completed;
        }
        self.tracking = Some(Tracking {
            target,
            position,
            pending: Duration::ZERO,
            last_sample: now,
        });
        self.state = ReporterState::Active;
        previous
    }

    /// Record the player's current position (percent). Out-of-range values are clamped.
    pub fn set_position(&mut self, position: f64) {
        if !position.is_finite() {
            return;
        }
        if let Some(t) = self.tracking.as_mut() {
            t.position = position.clamp(0.0, MAX_POSITION);
        }
    }

    /// Sample the clock; returns a flush once a full interval has accumulated.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Flush> {
        if self.state != ReporterState::Active {
            return None;
        }
        let interval = self.config.flush_interval;
        let t = self.tracking.as_mut()?;
        t.sample(now);
        if t.pending >= interval {
            t.take(false)
        } else {
            None
        }
    }

    /// Leave the section. Returns a final flush if at least a second is pending.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<Flush> {
        if self.state != ReporterState::Active {
            return None;
        }
        self.state = ReporterState::Stopped;
        let t = self.tracking.as_mut()?;
        t.sample(now);
        let flush = t.take(false);
        t.pending = Duration::ZERO;
        flush
    }

    /// The content reached its natural end; the reporter moves to `Stopped`.
    ///
    /// For playable content that is not known complete, this flushes
    /// immediately with the end signal and position 100. Otherwise it behaves
    /// like `stop`.
    pub fn ended(&mut self, now: DateTime<Utc>) -> Option<Flush> {
        if self.state != ReporterState::Active {
            return None;
        }
        self.state = ReporterState::Stopped;
        let t = self.tracking.as_mut()?;
        t.sample(now);
        let flush = if t.target.completed || !t.target.content_type.has_playback() {
            t.take(false)
        } else {
            t.position = MAX_POSITION;
            t.target.completed = true;
            t.take(true)
        };
        t.pending = Duration::ZERO;
        flush
    }

    /// Reconcile with a record returned by the server.
    pub fn acknowledge(&mut self, record: &ProgressRecord) {
        if let Some(t) = self.tracking.as_mut() {
            if t.target.section_id == record.section_id()
                && t.target.course_id == record.course_id()
                && record.is_completed()
            {
                t.target.completed = true;
            }
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(ReporterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use progress_core::model::{ProgressId, ProgressKey, UserId};
    use progress_core::time::fixed_now;

    fn video(section: u64) -> SectionTarget {
        SectionTarget::new(CourseId::new(1), SectionId::new(section), ContentType::Video)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        fixed_now() + ChronoDuration::seconds(secs)
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        fixed_now() + ChronoDuration::milliseconds(ms)
    }

    #[test]
    fn ticks_accumulate_until_the_interval() {
        let mut reporter = ProgressReporter::default();
        assert!(reporter.start(video(1), at(0)).is_none());
        reporter.set_position(12.0);

        for s in 1..30 {
            assert!(reporter.tick(at(s)).is_none());
        }
        let flush = reporter.tick(at(30)).unwrap();
        assert_eq!(flush.time_spent, 30);
        assert!((flush.last_position - 12.0).abs() < f64::EPSILON);
        assert!(!flush.ended);
        assert_eq!(reporter.pending_seconds(), 0);
    }

    #[test]
    fn sub_second_remainder_carries_over() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(0));
        let first = reporter.tick(at_ms(30_600)).unwrap();
        assert_eq!(first.time_spent, 30);

        let second = reporter.tick(at_ms(60_000)).unwrap();
        assert_eq!(second.time_spent, 30);
    }

    #[test]
    fn stop_flushes_only_whole_seconds() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(0));
        assert!(reporter.stop(at_ms(900)).is_none());
        assert_eq!(reporter.state(), ReporterState::Stopped);

        reporter.start(video(1), at(10));
        let flush = reporter.stop(at(17)).unwrap();
        assert_eq!(flush.time_spent, 7);
        assert!(reporter.stop(at(20)).is_none());
    }

    #[test]
    fn switching_sections_flushes_the_previous_one() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(0));
        reporter.set_position(40.0);

        let flush = reporter.start(video(2), at(12)).unwrap();
        assert_eq!(flush.section_id, SectionId::new(1));
        assert_eq!(flush.time_spent, 12);
        assert_eq!(reporter.current().unwrap().section_id, SectionId::new(2));
        assert_eq!(reporter.state(), ReporterState::Active);
    }

    #[test]
    fn restarting_the_active_section_is_a_noop() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(0));
        assert!(reporter.start(video(1), at(10)).is_none());
        assert_eq!(reporter.stop(at(20)).unwrap().time_spent, 20);
    }

    #[test]
    fn natural_end_forces_completion_once() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(0));
        reporter.set_position(80.0);

        let end = reporter.ended(at(5)).unwrap();
        assert!(end.ended);
        assert!((end.last_position - 100.0).abs() < f64::EPSILON);
        assert_eq!(end.time_spent, 5);

        assert_eq!(reporter.state(), ReporterState::Stopped);
        assert!(reporter.tick(at(65)).is_none());
        assert!(reporter.ended(at(70)).is_none());
        assert_eq!(reporter.pending_seconds(), 0);

        // Replaying the finished video sends plain flushes from then on.
        reporter.start(video(1), at(100));
        let replay = reporter.ended(at(104)).unwrap();
        assert!(!replay.ended);
        assert_eq!(replay.time_spent, 4);
        assert_eq!(reporter.state(), ReporterState::Stopped);
    }

    #[test]
    fn resuming_a_paused_section_keeps_position_and_completion() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(0));
        reporter.set_position(60.0);
        assert_eq!(reporter.stop(at(10)).unwrap().time_spent, 10);

        reporter.start(video(1), at(20));
        assert_eq!(reporter.state(), ReporterState::Active);
        let flush = reporter.stop(at(25)).unwrap();
        assert_eq!(flush.time_spent, 5);
        assert!((flush.last_position - 60.0).abs() < f64::EPSILON);

        let key = ProgressKey::new(UserId::new(1), CourseId::new(1), SectionId::new(1));
        let mut record = ProgressRecord::start(ProgressId::new(1), key, at(0));
        record.mark_completed(at(25));
        reporter.acknowledge(&record);

        reporter.start(video(1), at(30));
        assert!(reporter.current().unwrap().completed);
        assert!(!reporter.ended(at(32)).unwrap().ended);
    }

    #[test]
    fn another_section_starts_from_the_beginning() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(0));
        reporter.set_position(60.0);
        reporter.stop(at(10));

        reporter.start(video(2), at(20));
        let flush = reporter.stop(at(22)).unwrap();
        assert_eq!(flush.section_id, SectionId::new(2));
        assert!(flush.last_position.abs() < f64::EPSILON);
    }

    #[test]
    fn known_complete_section_ends_with_a_plain_flush() {
        let mut reporter = ProgressReporter::default();
        let mut target = video(1);
        target.completed = true;
        reporter.start(target, at(0));
        assert!(reporter.ended(at_ms(400)).is_none());
    }

    #[test]
    fn acknowledged_completion_suppresses_end_signal() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(0));

        let key = ProgressKey::new(UserId::new(1), CourseId::new(1), SectionId::new(1));
        let mut record = ProgressRecord::start(ProgressId::new(1), key, at(0));
        record.mark_completed(at(1));
        reporter.acknowledge(&record);

        let flush = reporter.ended(at(3)).unwrap();
        assert!(!flush.ended);
    }

    #[test]
    fn backwards_clock_adds_nothing() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(10));
        assert!(reporter.tick(at(5)).is_none());
        assert_eq!(reporter.pending_seconds(), 0);
        assert_eq!(reporter.stop(at(8)).unwrap().time_spent, 3);
    }

    #[test]
    fn positions_are_clamped() {
        let mut reporter = ProgressReporter::default();
        reporter.start(video(1), at(0));
        reporter.set_position(140.0);
        reporter.set_position(f64::NAN);
        let flush = reporter.stop(at(2)).unwrap();
        assert!((flush.last_position - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn idle_reporter_ignores_events() {
        let mut reporter = ProgressReporter::default();
        assert!(reporter.tick(at(100)).is_none());
        assert!(reporter.ended(at(100)).is_none());
        assert!(reporter.stop(at(100)).is_none());
        assert_eq!(reporter.state(), ReporterState::Idle);
    }
}
