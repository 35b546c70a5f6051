//! Catalog input repository: assignments, published content, progress.
//!
//! # Responsibility
//! - Serve the read-only inputs of catalog aggregation.
//! - Provide insert helpers for modules, assignments and progress; their full
//!   CRUD lifecycle lives outside core.
//!
//! # Invariants
//! - `list_published` never returns items outside the requested id set or
//!   with a status other than `published`.
//! - Progress is unique per (learner, content); recording again replaces the
//!   marker.
//! - An assignment date that does not parse is read as absent, so that row is
//!   never active; it does not fail the listing.

use crate::model::assignment::{Assignment, ContentRef, ProgressRecord};
use crate::model::catalog::ContentSummary;
use crate::model::content::{normalize_tags, ContentId, ContentMeta, ContentType, Module};
use crate::repo::{
    decode_string_list, encode_string_list, ensure_connection_ready, parse_uuid, RepoError,
    RepoResult,
};
use chrono::NaiveDate;
use log::warn;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::BTreeSet;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Read interface consumed by catalog aggregation.
pub trait CatalogRepository {
    /// Lists every assignment of one organization.
    fn list_assignments(&self, organization_id: &str) -> RepoResult<Vec<Assignment>>;
    /// Lists published items of one content type restricted to `ids`.
    fn list_published(
        &self,
        content_type: ContentType,
        ids: &BTreeSet<ContentId>,
    ) -> RepoResult<Vec<ContentSummary>>;
    /// Lists progress records of one learner.
    fn list_progress(&self, learner_id: &str) -> RepoResult<Vec<ProgressRecord>>;
}

/// SQLite-backed catalog repository.
pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &["modules", "composite_roots", "assignments", "progress"],
        )?;
        Ok(Self { conn })
    }

    /// Inserts one module record.
    pub fn create_module(&self, module: &Module) -> RepoResult<ContentId> {
        self.conn.execute(
            "INSERT INTO modules (
                uuid,
                title,
                description,
                tags,
                status,
                duration_minutes,
                thumbnail,
                credits,
                stars,
                badges
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                module.id.to_string(),
                module.title.as_str(),
                module.description.as_str(),
                encode_string_list(&normalize_tags(&module.tags))?,
                module.status.as_db(),
                module.meta.duration_minutes,
                module.meta.thumbnail.as_deref(),
                module.meta.credits,
                module.meta.stars,
                module.meta.badges,
            ],
        )?;
        Ok(module.id)
    }

    /// Inserts one assignment record.
    pub fn create_assignment(&self, assignment: &Assignment) -> RepoResult<Uuid> {
        self.conn.execute(
            "INSERT INTO assignments (
                uuid,
                organization_id,
                content_type,
                content_uuid,
                assign_date,
                assign_time,
                due_date,
                due_time,
                recurring,
                notify_users
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                assignment.id.to_string(),
                assignment.organization_id.as_str(),
                assignment.content.content_type().as_db(),
                assignment.content.id().to_string(),
                assignment
                    .assign_date
                    .map(|date| date.format(DATE_FORMAT).to_string()),
                assignment.assign_time.as_deref(),
                assignment
                    .due_date
                    .map(|date| date.format(DATE_FORMAT).to_string()),
                assignment.due_time.as_deref(),
                i64::from(assignment.recurring),
                i64::from(assignment.notify_users),
            ],
        )?;
        Ok(assignment.id)
    }

    /// Inserts or replaces the progress marker of one learner/content pair.
    pub fn record_progress(&self, record: &ProgressRecord) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO progress (uuid, learner_id, content_uuid, marker)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (learner_id, content_uuid) DO UPDATE
             SET marker = excluded.marker,
                 updated_at = (strftime('%s', 'now') * 1000);",
            params![
                Uuid::new_v4().to_string(),
                record.learner_id.as_str(),
                record.content_id.to_string(),
                record.marker.as_str(),
            ],
        )?;
        Ok(())
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn list_assignments(&self, organization_id: &str) -> RepoResult<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                uuid,
                organization_id,
                content_type,
                content_uuid,
                assign_date,
                assign_time,
                due_date,
                due_time,
                recurring,
                notify_users
             FROM assignments
             WHERE organization_id = ?1
             ORDER BY created_at ASC, uuid ASC;",
        )?;
        let mut rows = stmt.query([organization_id])?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
    }

    fn list_published(
        &self,
        content_type: ContentType,
        ids: &BTreeSet<ContentId>,
    ) -> RepoResult<Vec<ContentSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut bind_values: Vec<Value> = Vec::with_capacity(ids.len() + 1);
        let sql = match content_type {
            ContentType::Module => format!(
                "SELECT uuid, title, description, tags, duration_minutes, thumbnail, credits, stars, badges
                 FROM modules
                 WHERE status = 'published'
                   AND uuid IN ({placeholders})
                 ORDER BY title ASC, uuid ASC;"
            ),
            ContentType::Assessment | ContentType::Survey => {
                bind_values.push(Value::Text(content_type.as_db().to_string()));
                format!(
                    "SELECT uuid, title, description, tags, duration_minutes, thumbnail, credits, stars, badges
                     FROM composite_roots
                     WHERE kind = ?
                       AND status = 'published'
                       AND uuid IN ({placeholders})
                     ORDER BY title ASC, uuid ASC;"
                )
            }
        };
        bind_values.extend(ids.iter().map(|id| Value::Text(id.to_string())));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_summary_row(row, content_type)?);
        }
        Ok(items)
    }

    fn list_progress(&self, learner_id: &str) -> RepoResult<Vec<ProgressRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT learner_id, content_uuid, marker
             FROM progress
             WHERE learner_id = ?1
             ORDER BY updated_at DESC, content_uuid ASC;",
        )?;
        let mut rows = stmt.query([learner_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let content_text: String = row.get("content_uuid")?;
            records.push(ProgressRecord {
                learner_id: row.get("learner_id")?,
                content_id: parse_uuid(&content_text, "progress.content_uuid")?,
                marker: row.get("marker")?,
            });
        }
        Ok(records)
    }
}

fn parse_assignment_row(row: &Row<'_>) -> RepoResult<Assignment> {
    let uuid_text: String = row.get("uuid")?;
    let type_text: String = row.get("content_type")?;
    let content_type = ContentType::parse_db(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid content type `{type_text}` in assignments.content_type"
        ))
    })?;
    let content_text: String = row.get("content_uuid")?;
    let content_id = parse_uuid(&content_text, "assignments.content_uuid")?;

    Ok(Assignment {
        id: parse_uuid(&uuid_text, "assignments.uuid")?,
        organization_id: row.get("organization_id")?,
        content: ContentRef::new(content_type, content_id),
        assign_date: parse_date(row.get("assign_date")?, &uuid_text, "assign_date"),
        assign_time: row.get("assign_time")?,
        due_date: parse_date(row.get("due_date")?, &uuid_text, "due_date"),
        due_time: row.get("due_time")?,
        recurring: parse_flag(row.get("recurring")?, "assignments.recurring")?,
        notify_users: parse_flag(row.get("notify_users")?, "assignments.notify_users")?,
    })
}

fn parse_summary_row(row: &Row<'_>, content_type: ContentType) -> RepoResult<ContentSummary> {
    let uuid_text: String = row.get("uuid")?;
    let tags_text: String = row.get("tags")?;
    let column = match content_type {
        ContentType::Module => "modules.tags",
        ContentType::Assessment | ContentType::Survey => "composite_roots.tags",
    };
    Ok(ContentSummary {
        id: parse_uuid(&uuid_text, "content uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        tags: decode_string_list(&tags_text, column)?,
        meta: ContentMeta {
            duration_minutes: row.get("duration_minutes")?,
            thumbnail: row.get("thumbnail")?,
            credits: row.get("credits")?,
            stars: row.get("stars")?,
            badges: row.get("badges")?,
        },
    })
}

fn parse_date(
    value: Option<String>,
    assignment_uuid: &str,
    column: &'static str,
) -> Option<NaiveDate> {
    let text = value?;
    match NaiveDate::parse_from_str(text.trim(), DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            warn!(
                "event=assignment_read module=catalog status=degraded assignment_uuid={assignment_uuid} column={column} reason=unparseable_date"
            );
            None
        }
    }
}

fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}
