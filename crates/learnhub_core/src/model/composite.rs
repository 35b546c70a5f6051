//! Composite document model: root -> ordered sections -> ordered questions.
//!
//! # Responsibility
//! - Define draft (caller-submitted) and persisted shapes of surveys and
//!   assessments.
//! - Validate submitted trees before any write is attempted.
//!
//! # Invariants
//! - A root owns its sections exclusively; a section owns its questions
//!   exclusively. Children never outlive a replace or delete of their owner.
//! - Persisted trees always have a non-blank title, at least one section and
//!   at least one question per section.
//! - `Question::instructions` is derived from header/body and never accepted
//!   from callers.

use crate::model::content::{ContentMeta, ContentType, LifecycleStatus};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

pub type RootId = Uuid;
pub type SectionId = Uuid;
pub type QuestionId = Uuid;

/// Collection a composite root belongs to. Surveys and assessments share
/// one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeKind {
    Survey,
    Assessment,
}

impl CompositeKind {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Survey => "survey",
            Self::Assessment => "assessment",
        }
    }

    pub(crate) fn parse_db(value: &str) -> Option<Self> {
        match value {
            "survey" => Some(Self::Survey),
            "assessment" => Some(Self::Assessment),
            _ => None,
        }
    }

    /// Catalog content type for roots of this kind.
    pub fn content_type(self) -> ContentType {
        match self {
            Self::Survey => ContentType::Survey,
            Self::Assessment => ContentType::Assessment,
        }
    }
}

impl Display for CompositeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db())
    }
}

/// Closed set of question kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Exactly one option may be picked.
    SingleChoice,
    /// Any number of options may be picked.
    MultiSelect,
    /// Text-only block; carries no options requirement.
    Informational,
}

impl QuestionType {
    /// Whether this type requires an options list.
    pub fn is_choice(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultiSelect)
    }

    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::SingleChoice => "single_choice",
            Self::MultiSelect => "multi_select",
            Self::Informational => "informational",
        }
    }

    pub(crate) fn parse_db(value: &str) -> Option<Self> {
        match value {
            "single_choice" => Some(Self::SingleChoice),
            "multi_select" => Some(Self::MultiSelect),
            "informational" => Some(Self::Informational),
            _ => None,
        }
    }
}

/// Root scalar fields supplied on create and replaced wholesale on edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootFields {
    pub title: String,
    pub description: String,
    /// Classification tags; normalized before persistence.
    pub tags: Vec<String>,
    pub team: Option<String>,
    pub sub_team: Option<String>,
    pub status: LifecycleStatus,
    /// Opaque creator reference from the auth collaborator.
    pub creator: Option<String>,
    #[serde(flatten)]
    pub meta: ContentMeta,
}

impl RootFields {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Question as submitted by a caller, without identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub question_type: QuestionType,
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub instruction_header: Option<String>,
    #[serde(default)]
    pub instruction_body: Option<String>,
}

impl QuestionDraft {
    pub fn new(question_type: QuestionType, text: impl Into<String>) -> Self {
        Self {
            question_type,
            text: text.into(),
            options: Vec::new(),
            instruction_header: None,
            instruction_body: None,
        }
    }

    /// Builder-style helper for option lists.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Combined instructions derived from header and body.
    pub fn instructions(&self) -> Option<String> {
        derive_instructions(
            self.instruction_header.as_deref(),
            self.instruction_body.as_deref(),
        )
    }

    fn non_blank_options(&self) -> usize {
        self.options
            .iter()
            .filter(|option| !option.trim().is_empty())
            .count()
    }
}

/// Section as submitted by a caller, without identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDraft {
    pub description: String,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
}

impl SectionDraft {
    pub fn new(description: impl Into<String>, questions: Vec<QuestionDraft>) -> Self {
        Self {
            description: description.into(),
            questions,
        }
    }
}

/// Persisted question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub question_type: QuestionType,
    pub text: String,
    pub options: Vec<String>,
    pub instruction_header: Option<String>,
    pub instruction_body: Option<String>,
    pub instructions: Option<String>,
}

impl Question {
    pub fn to_draft(&self) -> QuestionDraft {
        QuestionDraft {
            question_type: self.question_type,
            text: self.text.clone(),
            options: self.options.clone(),
            instruction_header: self.instruction_header.clone(),
            instruction_body: self.instruction_body.clone(),
        }
    }
}

/// Persisted section with its questions in stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub description: String,
    pub questions: Vec<Question>,
}

impl Section {
    pub fn to_draft(&self) -> SectionDraft {
        SectionDraft {
            description: self.description.clone(),
            questions: self.questions.iter().map(Question::to_draft).collect(),
        }
    }
}

/// Persisted root record without its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeRoot {
    pub id: RootId,
    pub kind: CompositeKind,
    #[serde(flatten)]
    pub fields: RootFields,
    /// Starts at 1 and increases by one on every replace.
    pub version: u32,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// Fully populated composite tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeDocument {
    pub root: CompositeRoot,
    pub sections: Vec<Section>,
}

impl CompositeDocument {
    /// Identity-free copy of the section tree.
    pub fn section_drafts(&self) -> Vec<SectionDraft> {
        self.sections.iter().map(Section::to_draft).collect()
    }

    pub fn question_count(&self) -> usize {
        self.sections.iter().map(|section| section.questions.len()).sum()
    }
}

/// One structural rule broken by a submitted tree.
///
/// Indices are 0-based positions in the submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("title must not be blank")]
    MissingTitle,
    #[error("at least one section is required")]
    NoSections,
    #[error("section {section}: description must not be blank")]
    MissingSectionDescription { section: usize },
    #[error("section {section}: each section must contain at least one question")]
    EmptySection { section: usize },
    #[error("section {section} question {question}: question text must not be blank")]
    MissingQuestionText { section: usize, question: usize },
    #[error(
        "section {section} question {question}: choice questions need at least 2 non-blank options, found {found}"
    )]
    InsufficientOptions {
        section: usize,
        question: usize,
        found: usize,
    },
}

/// Structural validation failure. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeValidationError {
    pub violations: Vec<Violation>,
}

impl Display for TreeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let messages = self
            .violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        write!(f, "invalid composite tree: {}", messages.join("; "))
    }
}

impl std::error::Error for TreeValidationError {}

/// Validates a submitted tree.
///
/// Rules run class by class: root title, section presence, section fields,
/// question fields. The first class that reports anything stops the check and
/// all of its violations are returned together.
pub fn validate_tree(
    fields: &RootFields,
    sections: &[SectionDraft],
) -> Result<(), TreeValidationError> {
    const CLASSES: [RuleClass; 4] = [
        root_violations,
        presence_violations,
        section_violations,
        question_violations,
    ];

    for class in CLASSES {
        let violations = class(fields, sections);
        if !violations.is_empty() {
            return Err(TreeValidationError { violations });
        }
    }
    Ok(())
}

type RuleClass = fn(&RootFields, &[SectionDraft]) -> Vec<Violation>;

fn root_violations(fields: &RootFields, _sections: &[SectionDraft]) -> Vec<Violation> {
    if fields.title.trim().is_empty() {
        vec![Violation::MissingTitle]
    } else {
        Vec::new()
    }
}

fn presence_violations(_fields: &RootFields, sections: &[SectionDraft]) -> Vec<Violation> {
    if sections.is_empty() {
        vec![Violation::NoSections]
    } else {
        Vec::new()
    }
}

fn section_violations(_fields: &RootFields, sections: &[SectionDraft]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (section, draft) in sections.iter().enumerate() {
        if draft.description.trim().is_empty() {
            violations.push(Violation::MissingSectionDescription { section });
        }
        if draft.questions.is_empty() {
            violations.push(Violation::EmptySection { section });
        }
    }
    violations
}

fn question_violations(_fields: &RootFields, sections: &[SectionDraft]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (section, draft) in sections.iter().enumerate() {
        for (question, item) in draft.questions.iter().enumerate() {
            if item.text.trim().is_empty() {
                violations.push(Violation::MissingQuestionText { section, question });
            }
            let found = item.non_blank_options();
            if item.question_type.is_choice() && found < 2 {
                violations.push(Violation::InsufficientOptions {
                    section,
                    question,
                    found,
                });
            }
        }
    }
    violations
}

/// Joins instruction header and body with a blank line; blank parts drop out.
pub(crate) fn derive_instructions(header: Option<&str>, body: Option<&str>) -> Option<String> {
    let parts = [header, body]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        derive_instructions, validate_tree, QuestionDraft, QuestionType, RootFields, SectionDraft,
        Violation,
    };

    fn choice(text: &str) -> QuestionDraft {
        QuestionDraft::new(QuestionType::SingleChoice, text).with_options(["Yes", "No"])
    }

    #[test]
    fn valid_tree_passes() {
        let sections = vec![SectionDraft::new("Intro", vec![choice("Ready?")])];
        assert!(validate_tree(&RootFields::new("Pulse"), &sections).is_ok());
    }

    #[test]
    fn blank_title_short_circuits_before_sections() {
        let err = validate_tree(&RootFields::new("  "), &[]).unwrap_err();
        assert_eq!(err.violations, vec![Violation::MissingTitle]);
    }

    #[test]
    fn empty_sections_list_is_rejected() {
        let err = validate_tree(&RootFields::new("Pulse"), &[]).unwrap_err();
        assert_eq!(err.violations, vec![Violation::NoSections]);
    }

    #[test]
    fn section_class_collects_every_section_violation() {
        let sections = vec![
            SectionDraft::new("", vec![choice("Q")]),
            SectionDraft::new("Second", Vec::new()),
        ];
        let err = validate_tree(&RootFields::new("Pulse"), &sections).unwrap_err();
        assert_eq!(
            err.violations,
            vec![
                Violation::MissingSectionDescription { section: 0 },
                Violation::EmptySection { section: 1 },
            ]
        );
        assert!(err
            .to_string()
            .contains("each section must contain at least one question"));
    }

    #[test]
    fn question_checks_run_only_after_sections_pass() {
        let sections = vec![
            SectionDraft::new("", vec![QuestionDraft::new(QuestionType::SingleChoice, "")]),
        ];
        let err = validate_tree(&RootFields::new("Pulse"), &sections).unwrap_err();
        assert_eq!(
            err.violations,
            vec![Violation::MissingSectionDescription { section: 0 }]
        );
    }

    #[test]
    fn choice_questions_need_two_non_blank_options() {
        let sections = vec![SectionDraft::new(
            "Only",
            vec![
                QuestionDraft::new(QuestionType::MultiSelect, "Pick").with_options(["a", "  "]),
                QuestionDraft::new(QuestionType::Informational, "Read this"),
                QuestionDraft::new(QuestionType::SingleChoice, " ").with_options(["a", "b"]),
            ],
        )];
        let err = validate_tree(&RootFields::new("Pulse"), &sections).unwrap_err();
        assert_eq!(
            err.violations,
            vec![
                Violation::InsufficientOptions {
                    section: 0,
                    question: 0,
                    found: 1
                },
                Violation::MissingQuestionText {
                    section: 0,
                    question: 2
                },
            ]
        );
    }

    #[test]
    fn instructions_join_header_and_body() {
        assert_eq!(
            derive_instructions(Some(" Read "), Some("carefully")),
            Some("Read\n\ncarefully".to_string())
        );
        assert_eq!(derive_instructions(None, Some("body")), Some("body".to_string()));
        assert_eq!(derive_instructions(Some(" "), None), None);
    }
}
