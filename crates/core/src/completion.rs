use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ContentType, FlushReport, MAX_POSITION, ProgressRecord, Section, SectionId};

/// Reference playback percentage at which a video section counts as watched.
pub const DEFAULT_COMPLETION_THRESHOLD: f64 = 95.0;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompletionError {
    #[error("completion threshold must be in (0, 100], got {provided}")]
    InvalidThreshold { provided: f64 },
}

//
// ─── SECTION COMPLETION POLICY ─────────────────────────────────────────────────
//

/// Why a section is (or becomes) complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The learner asked for it directly.
    Explicit,
    /// Playback position reached the threshold.
    Threshold,
    /// The player reported the natural end of the content.
    Ended,
}

/// Decides when partial consumption of a section becomes completion.
///
/// The policy only ever answers "complete now" or "not yet"; it has no way to
/// express un-completion.
///
/// # Examples
///
/// ```
/// # use progress_core::completion::{CompletionPolicy, CompletionReason};
/// # use progress_core::model::{ContentType, FlushReport};
/// let policy = CompletionPolicy::default();
/// let flush = FlushReport { last_position: 97.0, time_spent: 30, ended: false };
/// assert_eq!(
///     policy.implicit_completion(ContentType::Video, &flush),
///     Some(CompletionReason::Threshold)
/// );
/// assert_eq!(policy.implicit_completion(ContentType::Text, &flush), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionPolicy {
    threshold: f64,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_COMPLETION_THRESHOLD,
        }
    }
}

impl CompletionPolicy {
    /// Build a policy with a custom playback threshold (percent).
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::InvalidThreshold` unless `0 < threshold <= 100`.
    pub fn new(threshold: f64) -> Result<Self, CompletionError> {
        if !threshold.is_finite() || threshold <= 0.0 || threshold > MAX_POSITION {
            return Err(CompletionError::InvalidThreshold {
                provided: threshold,
            });
        }
        Ok(Self { threshold })
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether a flush completes the section on its own.
    ///
    /// Text sections never complete implicitly; sections with playback complete
    /// when the player reports the end or the position reaches the threshold.
    #[must_use]
    pub fn implicit_completion(
        &self,
        content_type: ContentType,
        flush: &FlushReport,
    ) -> Option<CompletionReason> {
        if !content_type.has_playback() {
            return None;
        }
        if flush.ended {
            return Some(CompletionReason::Ended);
        }
        if flush.last_position >= self.threshold {
            return Some(CompletionReason::Threshold);
        }
        None
    }
}

//
// ─── COMPLETION AGGREGATOR ─────────────────────────────────────────────────────
//

/// `100 * completed / total`, with an empty course defined as 0%.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn completion_percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * completed.min(total) as f64 / total as f64
}

/// Derived per-(user, course) view: the records that still belong to the
/// course, ordered like the course, plus the completion percentage.
///
/// Recomputed on every read and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressSummary {
    pub progress_records: Vec<ProgressRecord>,
    pub completion_percentage: f64,
    pub completed_sections: usize,
    pub total_sections: usize,
    /// First section in course order that is not complete yet.
    pub next_section_id: Option<SectionId>,
}

impl CourseProgressSummary {
    /// Aggregate `records` against the sections currently in the course.
    ///
    /// `sections` must be in course order and hold every section of the course;
    /// its length is the denominator. Records whose section is not in `sections`
    /// are dropped from both the list and the percentage.
    #[must_use]
    pub fn compute(sections: &[Section], records: Vec<ProgressRecord>) -> Self {
        let positions: HashMap<SectionId, usize> = sections
            .iter()
            .enumerate()
            .map(|(idx, section)| (section.id(), idx))
            .collect();

        let mut progress_records: Vec<(usize, ProgressRecord)> = records
            .into_iter()
            .filter_map(|record| positions.get(&record.section_id()).map(|&idx| (idx, record)))
            .collect();
        progress_records.sort_by_key(|(idx, _)| *idx);
        let progress_records: Vec<ProgressRecord> =
            progress_records.into_iter().map(|(_, r)| r).collect();

        let completed: Vec<SectionId> = progress_records
            .iter()
            .filter(|r| r.is_completed())
            .map(ProgressRecord::section_id)
            .collect();
        let completed_sections = completed.len();
        let total_sections = sections.len();

        let next_section_id = sections
            .iter()
            .map(Section::id)
            .find(|id| !completed.contains(id));

        Self {
            progress_records,
            completion_percentage: completion_percentage(completed_sections, total_sections),
            completed_sections,
            total_sections,
            next_section_id,
        }
    }
}
