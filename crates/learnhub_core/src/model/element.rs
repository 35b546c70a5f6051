//! Flattened `elements` view of a composite tree.
//!
//! Editing UIs work on one linear list where a section marker is followed by
//! its questions. This module converts between that list and the section
//! tree; it is never a persisted shape.

use crate::model::composite::{QuestionDraft, QuestionType, SectionDraft};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of the flattened view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum Element {
    /// Starts a new section; later questions belong to it.
    Section { description: String },
    Question {
        question_type: QuestionType,
        text: String,
        #[serde(default)]
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instruction_header: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instruction_body: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementsError {
    /// A question appears before any section marker.
    #[error("element {index} is a question with no preceding section")]
    QuestionWithoutSection { index: usize },
}

/// Flattens sections into the UI element list, preserving stored order.
pub fn flatten(sections: &[SectionDraft]) -> Vec<Element> {
    let mut elements = Vec::with_capacity(
        sections.len() + sections.iter().map(|s| s.questions.len()).sum::<usize>(),
    );
    for section in sections {
        elements.push(Element::Section {
            description: section.description.clone(),
        });
        elements.extend(section.questions.iter().map(|question| Element::Question {
            question_type: question.question_type,
            text: question.text.clone(),
            options: question.options.clone(),
            instruction_header: question.instruction_header.clone(),
            instruction_body: question.instruction_body.clone(),
        }));
    }
    elements
}

/// Rebuilds the section tree from a flat element list.
///
/// Structural rules (non-empty sections etc.) are left to
/// [`crate::model::composite::validate_tree`]; this only assigns owners.
pub fn reconstruct(elements: &[Element]) -> Result<Vec<SectionDraft>, ElementsError> {
    let mut sections: Vec<SectionDraft> = Vec::new();
    for (index, element) in elements.iter().enumerate() {
        match element {
            Element::Section { description } => {
                sections.push(SectionDraft::new(description.clone(), Vec::new()));
            }
            Element::Question {
                question_type,
                text,
                options,
                instruction_header,
                instruction_body,
            } => {
                let owner = sections
                    .last_mut()
                    .ok_or(ElementsError::QuestionWithoutSection { index })?;
                owner.questions.push(QuestionDraft {
                    question_type: *question_type,
                    text: text.clone(),
                    options: options.clone(),
                    instruction_header: instruction_header.clone(),
                    instruction_body: instruction_body.clone(),
                });
            }
        }
    }
    Ok(sections)
}
