//! Assignment scheduling records and the active-window resolver.
//!
//! # Responsibility
//! - Model assignments with a single, type-tagged content reference.
//! - Decide whether an assignment window contains a given instant.
//!
//! # Invariants
//! - An assignment references exactly one content item (`ContentRef`).
//! - Window bounds are inclusive on both ends.
//! - Missing or malformed date/time halves make a window never active.

use crate::model::content::{ContentId, ContentType};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type AssignmentId = Uuid;

/// Reference from an assignment to the content it schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "content_type", content = "content_id", rename_all = "snake_case")]
pub enum ContentRef {
    Module(ContentId),
    Assessment(ContentId),
    Survey(ContentId),
}

impl ContentRef {
    pub fn new(content_type: ContentType, id: ContentId) -> Self {
        match content_type {
            ContentType::Module => Self::Module(id),
            ContentType::Assessment => Self::Assessment(id),
            ContentType::Survey => Self::Survey(id),
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Module(_) => ContentType::Module,
            Self::Assessment(_) => ContentType::Assessment,
            Self::Survey(_) => ContentType::Survey,
        }
    }

    pub fn id(&self) -> ContentId {
        match *self {
            Self::Module(id) | Self::Assessment(id) | Self::Survey(id) => id,
        }
    }
}

/// Scheduling record binding one content item to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub organization_id: String,
    pub content: ContentRef,
    pub assign_date: Option<NaiveDate>,
    /// Time of day as `HH:MM`.
    pub assign_time: Option<String>,
    pub due_date: Option<NaiveDate>,
    /// Time of day as `HH:MM`.
    pub due_time: Option<String>,
    pub recurring: bool,
    pub notify_users: bool,
}

impl Assignment {
    /// Creates an assignment with an empty (never active) window.
    pub fn new(organization_id: impl Into<String>, content: ContentRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id: organization_id.into(),
            content,
            assign_date: None,
            assign_time: None,
            due_date: None,
            due_time: None,
            recurring: false,
            notify_users: false,
        }
    }

    /// Sets both window ends from date + `HH:MM` pairs.
    pub fn with_window(
        mut self,
        assign: (NaiveDate, impl Into<String>),
        due: (NaiveDate, impl Into<String>),
    ) -> Self {
        self.assign_date = Some(assign.0);
        self.assign_time = Some(assign.1.into());
        self.due_date = Some(due.0);
        self.due_time = Some(due.1.into());
        self
    }

    /// Whether `now` falls inside this assignment's window.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        is_active(
            self.assign_date,
            self.assign_time.as_deref(),
            self.due_date,
            self.due_time.as_deref(),
            now,
        )
    }
}

/// Per-learner progress marker. Its existence means "in progress".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub learner_id: String,
    pub content_id: ContentId,
    /// Opaque value owned by the player UI.
    pub marker: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("window date is missing")]
    MissingDate,
    #[error("window time of day is missing")]
    MissingTime,
    #[error("invalid time of day `{0}`; expected HH:MM")]
    InvalidTime(String),
}

/// Combines a calendar date and an `HH:MM` time of day into a UTC instant.
///
/// `HH:MM:SS` is accepted as well; surrounding whitespace is ignored.
pub fn combine_instant(
    date: Option<NaiveDate>,
    time: Option<&str>,
) -> Result<DateTime<Utc>, WindowError> {
    let date = date.ok_or(WindowError::MissingDate)?;
    let raw = time
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(WindowError::MissingTime)?;
    let time_of_day = NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| WindowError::InvalidTime(raw.to_string()))?;
    Ok(date.and_time(time_of_day).and_utc())
}

/// Returns whether `now` lies within `[assign, due]`, both ends inclusive.
///
/// Any window half that cannot be combined makes the result `false`.
pub fn is_active(
    assign_date: Option<NaiveDate>,
    assign_time: Option<&str>,
    due_date: Option<NaiveDate>,
    due_time: Option<&str>,
    now: DateTime<Utc>,
) -> bool {
    let (Ok(start), Ok(end)) = (
        combine_instant(assign_date, assign_time),
        combine_instant(due_date, due_time),
    ) else {
        return false;
    };
    start <= now && now <= end
}
