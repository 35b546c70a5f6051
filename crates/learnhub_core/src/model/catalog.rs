//! Learner catalog read model.

use crate::model::content::{ContentId, ContentMeta, ContentType};
use serde::{Deserialize, Serialize};

/// Published content item as fetched for catalog decoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSummary {
    pub id: ContentId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub meta: ContentMeta,
}

/// One entry of a learner catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub title: String,
    pub description: String,
    /// Minutes.
    pub duration: Option<u32>,
    pub tags: Vec<String>,
    pub thumbnail: Option<String>,
    pub credits: u32,
    pub stars: u32,
    pub badges: u32,
    /// Set when the learner has a progress record for this item.
    pub in_progress: bool,
}

impl CatalogItem {
    pub fn from_summary(content_type: ContentType, summary: ContentSummary, in_progress: bool) -> Self {
        Self {
            content_id: summary.id,
            content_type,
            title: summary.title,
            description: summary.description,
            duration: summary.meta.duration_minutes,
            tags: summary.tags,
            thumbnail: summary.meta.thumbnail,
            credits: summary.meta.credits,
            stars: summary.meta.stars,
            badges: summary.meta.badges,
            in_progress,
        }
    }
}
