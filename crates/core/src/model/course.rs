use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, ModuleId, SectionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title cannot be empty")]
    EmptyCourseTitle,

    #[error("module title cannot be empty")]
    EmptyModuleTitle,

    #[error("section title cannot be empty")]
    EmptySectionTitle,

    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    #[error("module {module_id} belongs to another course")]
    ModuleCourseMismatch { module_id: ModuleId },
}

//
// ─── CONTENT TYPE ──────────────────────────────────────────────────────────────
//

/// What a section presents to the learner; decides which completion signal applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Text,
    Mixed,
}

impl ContentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Text => "text",
            ContentType::Mixed => "mixed",
        }
    }

    /// Whether the section carries playable media that reports a position.
    ///
    /// Only these sections can complete implicitly from a flush.
    #[must_use]
    pub fn has_playback(self) -> bool {
        matches!(self, ContentType::Video | ContentType::Mixed)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ContentType::Video),
            "text" => Ok(ContentType::Text),
            "mixed" => Ok(ContentType::Mixed),
            other => Err(CourseError::InvalidContentType(other.to_string())),
        }
    }
}

//
// ─── CATALOG ENTITIES ──────────────────────────────────────────────────────────
//

/// A course as seen by progress tracking: an identity and a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    id: CourseId,
    title: String,
    description: Option<String>,
}

impl Course {
    /// Creates a new course.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyCourseTitle` if the title is blank.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, CourseError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(CourseError::EmptyCourseTitle);
        }
        Ok(Self {
            id,
            title,
            description: description.filter(|d| !d.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// An ordered group of sections inside a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    id: ModuleId,
    course_id: CourseId,
    title: String,
    order: i32,
}

impl Module {
    /// Creates a new module.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyModuleTitle` if the title is blank.
    pub fn new(
        id: ModuleId,
        course_id: CourseId,
        title: impl Into<String>,
        order: i32,
    ) -> Result<Self, CourseError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(CourseError::EmptyModuleTitle);
        }
        Ok(Self {
            id,
            course_id,
            title,
            order,
        })
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }
}

/// The smallest addressable unit of course content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    id: SectionId,
    course_id: CourseId,
    module_id: Option<ModuleId>,
    title: String,
    order: i32,
    content_type: ContentType,
}

impl Section {
    /// Creates a new section.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptySectionTitle` if the title is blank.
    pub fn new(
        id: SectionId,
        course_id: CourseId,
        module_id: Option<ModuleId>,
        title: impl Into<String>,
        order: i32,
        content_type: ContentType,
    ) -> Result<Self, CourseError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(CourseError::EmptySectionTitle);
        }
        Ok(Self {
            id,
            course_id,
            module_id,
            title,
            order,
            content_type,
        })
    }

    #[must_use]
    pub fn id(&self) -> SectionId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn module_id(&self) -> Option<ModuleId> {
        self.module_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }

    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }
}

//
// ─── OUTLINE ───────────────────────────────────────────────────────────────────
//

/// A module together with its sections, sorted by `order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOutline {
    pub module: Module,
    pub sections: Vec<Section>,
}

/// Read model of a course's structure: modules with their sections, then
/// sections that belong to no module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
    course: Course,
    modules: Vec<ModuleOutline>,
    standalone_sections: Vec<Section>,
}

impl CourseOutline {
    /// Group sections under their modules and sort everything by `order`.
    ///
    /// Sections and modules of other courses are ignored. A section pointing at
    /// a module that is not part of this course is listed as standalone.
    #[must_use]
    pub fn assemble(course: Course, modules: Vec<Module>, sections: Vec<Section>) -> Self {
        let course_id = course.id();
        let mut modules: Vec<ModuleOutline> = modules
            .into_iter()
            .filter(|m| m.course_id() == course_id)
            .map(|module| ModuleOutline {
                module,
                sections: Vec::new(),
            })
            .collect();
        modules.sort_by_key(|m| (m.module.order(), m.module.id()));

        let mut standalone_sections = Vec::new();
        for section in sections.into_iter().filter(|s| s.course_id() == course_id) {
            let slot = section
                .module_id()
                .and_then(|mid| modules.iter_mut().find(|m| m.module.id() == mid));
            match slot {
                Some(outline) => outline.sections.push(section),
                None => standalone_sections.push(section),
            }
        }

        for outline in &mut modules {
            outline.sections.sort_by_key(|s| (s.order(), s.id()));
        }
        standalone_sections.sort_by_key(|s| (s.order(), s.id()));

        Self {
            course,
            modules,
            standalone_sections,
        }
    }

    #[must_use]
    pub fn course(&self) -> &Course {
        &self.course
    }

    #[must_use]
    pub fn modules(&self) -> &[ModuleOutline] {
        &self.modules
    }

    #[must_use]
    pub fn standalone_sections(&self) -> &[Section] {
        &self.standalone_sections
    }

    /// All sections in course order: module sections first, then standalone ones.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.modules
            .iter()
            .flat_map(|m| m.sections.iter())
            .chain(self.standalone_sections.iter())
    }

    #[must_use]
    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections().find(|s| s.id() == id)
    }

    #[must_use]
    pub fn section_count(&self) -> usize {
        self.modules.iter().map(|m| m.sections.len()).sum::<usize>()
            + self.standalone_sections.len()
    }
}
