use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, ProgressId, SectionId, UserId};

/// Upper bound of a reported playback/reading position, in percent.
pub const MAX_POSITION: f64 = 100.0;

/// A single flush never carries more than a day of watch time.
pub const MAX_FLUSH_SECONDS: i64 = 86_400;

/// Maximum length of free-form section notes, in characters.
pub const MAX_NOTES_LEN: usize = 10_000;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("position must be a finite number")]
    NonFinitePosition,

    #[error("position must be within 0..=100, got {0}")]
    PositionOutOfRange(f64),

    #[error("time spent cannot be negative, got {0}")]
    NegativeTimeSpent(i64),

    #[error("time spent in a single flush cannot exceed {MAX_FLUSH_SECONDS}s, got {0}")]
    TimeSpentTooLarge(i64),

    #[error("notes cannot exceed {MAX_NOTES_LEN} characters, got {len}")]
    NotesTooLong { len: usize },

    #[error("invalid persisted progress: {0}")]
    InvalidPersistedState(String),
}

//
// ─── KEY & DELTA ───────────────────────────────────────────────────────────────
//

/// The composite identity of a progress record. At most one record exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressKey {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub section_id: SectionId,
}

impl ProgressKey {
    #[must_use]
    pub fn new(user_id: UserId, course_id: CourseId, section_id: SectionId) -> Self {
        Self {
            user_id,
            course_id,
            section_id,
        }
    }
}

/// A validated increment to apply to a progress record.
///
/// `additional_time_spent` is added to the stored total; `last_position`
/// replaces the stored position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressDelta {
    last_position: f64,
    additional_time_spent: u32,
}

impl ProgressDelta {
    /// Validate a raw position/time pair.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the position is not a finite percentage or the
    /// time increment is negative or implausibly large.
    pub fn new(last_position: f64, additional_time_spent: i64) -> Result<Self, ProgressError> {
        if !last_position.is_finite() {
            return Err(ProgressError::NonFinitePosition);
        }
        if !(0.0..=MAX_POSITION).contains(&last_position) {
            return Err(ProgressError::PositionOutOfRange(last_position));
        }
        if additional_time_spent < 0 {
            return Err(ProgressError::NegativeTimeSpent(additional_time_spent));
        }
        if additional_time_spent > MAX_FLUSH_SECONDS {
            return Err(ProgressError::TimeSpentTooLarge(additional_time_spent));
        }
        let additional_time_spent = u32::try_from(additional_time_spent)
            .map_err(|_| ProgressError::TimeSpentTooLarge(additional_time_spent))?;

        Ok(Self {
            last_position,
            additional_time_spent,
        })
    }

    #[must_use]
    pub fn last_position(&self) -> f64 {
        self.last_position
    }

    #[must_use]
    pub fn additional_time_spent(&self) -> u32 {
        self.additional_time_spent
    }
}

/// One flush as reported by a client, before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushReport {
    pub last_position: f64,
    pub time_spent: i64,
    /// Set when playback reached the natural end of the content.
    pub ended: bool,
}

impl FlushReport {
    /// Validate the report into a store delta.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for malformed positions or time increments.
    pub fn delta(&self) -> Result<ProgressDelta, ProgressError> {
        ProgressDelta::new(self.last_position, self.time_spent)
    }
}

/// Normalize user-entered notes: blank becomes `None`.
///
/// # Errors
///
/// Returns `ProgressError::NotesTooLong` when the notes exceed `MAX_NOTES_LEN`.
pub fn validate_notes(notes: Option<String>) -> Result<Option<String>, ProgressError> {
    let Some(notes) = notes else {
        return Ok(None);
    };
    let len = notes.chars().count();
    if len > MAX_NOTES_LEN {
        return Err(ProgressError::NotesTooLong { len });
    }
    if notes.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(notes))
    }
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// Per-(user, course, section) progress.
///
/// `time_spent` only grows, and `is_completed` never goes back to `false` once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    id: ProgressId,
    user_id: UserId,
    course_id: CourseId,
    section_id: SectionId,
    is_completed: bool,
    completion_date: Option<DateTime<Utc>>,
    time_spent: u64,
    last_position: f64,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// A fresh, untouched record for `key`.
    #[must_use]
    pub fn start(id: ProgressId, key: ProgressKey, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: key.user_id,
            course_id: key.course_id,
            section_id: key.section_id,
            is_completed: false,
            completion_date: None,
            time_spent: 0,
            last_position: 0.0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPersistedState` if the completion flag and
    /// completion date disagree, or the position is not a valid percentage.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: ProgressId,
        key: ProgressKey,
        is_completed: bool,
        completion_date: Option<DateTime<Utc>>,
        time_spent: u64,
        last_position: f64,
        notes: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if is_completed != completion_date.is_some() {
            return Err(ProgressError::InvalidPersistedState(format!(
                "is_completed={is_completed} but completion_date={completion_date:?}"
            )));
        }
        if !last_position.is_finite() || !(0.0..=MAX_POSITION).contains(&last_position) {
            return Err(ProgressError::InvalidPersistedState(format!(
                "last_position={last_position}"
            )));
        }

        Ok(Self {
            id,
            user_id: key.user_id,
            course_id: key.course_id,
            section_id: key.section_id,
            is_completed,
            completion_date,
            time_spent,
            last_position,
            notes,
            created_at,
            updated_at,
        })
    }

    /// Add the increment to `time_spent` and overwrite `last_position`.
    ///
    /// Completion state is left untouched.
    pub fn apply_delta(&mut self, delta: &ProgressDelta, at: DateTime<Utc>) {
        self.time_spent = self
            .time_spent
            .saturating_add(u64::from(delta.additional_time_spent()));
        self.last_position = delta.last_position();
        self.updated_at = at;
    }

    /// Flip `is_completed` from false to true.
    ///
    /// Returns `false` (and changes nothing) if the record was already complete.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        self.completion_date = Some(at);
        self.updated_at = at;
        true
    }

    /// Replace the notes. Callers validate with `validate_notes` first.
    pub fn set_notes(&mut self, notes: Option<String>, at: DateTime<Utc>) {
        self.notes = notes;
        self.updated_at = at;
    }

    #[must_use]
    pub fn id(&self) -> ProgressId {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.user_id, self.course_id, self.section_id)
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn section_id(&self) -> SectionId {
        self.section_id
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn completion_date(&self) -> Option<DateTime<Utc>> {
        self.completion_date
    }

    /// Cumulative seconds spent on the section.
    #[must_use]
    pub fn time_spent(&self) -> u64 {
        self.time_spent
    }

    #[must_use]
    pub fn last_position(&self) -> f64 {
        self.last_position
    }

    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
