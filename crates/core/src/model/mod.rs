mod course;
mod ids;
mod progress;

pub use ids::{CourseId, ModuleId, ParseIdError, ProgressId, SectionId, UserId};

pub use course::{ContentType, Course, CourseError, CourseOutline, Module, ModuleOutline, Section};
pub use progress::{
    FlushReport, MAX_FLUSH_SECONDS, MAX_NOTES_LEN, MAX_POSITION, ProgressDelta, ProgressError,
    ProgressKey, ProgressRecord, validate_notes,
};
