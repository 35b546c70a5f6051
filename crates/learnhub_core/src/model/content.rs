//! Shared content vocabulary for modules, assessments and surveys.
//!
//! # Responsibility
//! - Define the content-type tag and lifecycle status shared by all three
//!   content collections.
//! - Hold catalog presentation fields and tag normalization rules.
//!
//! # Invariants
//! - Tags are trimmed, lowercased and deduplicated before persistence.
//! - Only `LifecycleStatus::Published` content is visible to learners.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of any content item (module, assessment or survey).
pub type ContentId = Uuid;

/// Content collection a catalog entry or assignment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    Module,
    Assessment,
    Survey,
}

impl ContentType {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Assessment => "assessment",
            Self::Survey => "survey",
        }
    }

    pub(crate) fn parse_db(value: &str) -> Option<Self> {
        match value {
            "module" => Some(Self::Module),
            "assessment" => Some(Self::Assessment),
            "survey" => Some(Self::Survey),
            _ => None,
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db())
    }
}

/// Publication lifecycle shared by every content collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl LifecycleStatus {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    pub(crate) fn parse_db(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Presentation fields rendered on learner catalog cards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentMeta {
    /// Expected completion time in minutes.
    pub duration_minutes: Option<u32>,
    /// Thumbnail URL produced by the external upload collaborator.
    pub thumbnail: Option<String>,
    pub credits: u32,
    pub stars: u32,
    pub badges: u32,
}

/// Flat learning module record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ContentId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub status: LifecycleStatus,
    #[serde(flatten)]
    pub meta: ContentMeta,
}

impl Module {
    /// Creates a draft module with a generated id.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            tags: Vec::new(),
            status: LifecycleStatus::Draft,
            meta: ContentMeta::default(),
        }
    }
}

/// Normalizes one tag value: trimmed and lowercased, `None` when blank.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates tag values, sorted by name.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .filter_map(|tag| normalize_tag(tag))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
