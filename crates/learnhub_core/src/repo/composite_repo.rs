//! Composite tree repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Execute create / replace / delete of a whole composite tree as one
//!   transaction.
//! - Load trees in stored order.
//!
//! # Invariants
//! - Every `TreeMutation` runs inside exactly one IMMEDIATE transaction; any
//!   error drops the transaction, which rolls back every step.
//! - Replace deletes all old questions, then all old sections, then inserts
//!   the new tree. Nothing from the old tree survives a committed replace.
//! - Children are dense-ordered by `sort_order` starting at 0.
//! - Queries are scoped to the repository's `CompositeKind`.
//! - A tree is read root and children from one deferred read transaction.

use crate::model::composite::{
    derive_instructions, CompositeDocument, CompositeKind, CompositeRoot, Question, QuestionDraft,
    QuestionType, RootFields, RootId, Section, SectionDraft, SectionId,
};
use crate::model::content::{normalize_tags, ContentMeta, LifecycleStatus};
use crate::repo::{
    decode_string_list, encode_string_list, ensure_connection_ready, parse_uuid, RepoError,
    RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::time::Instant;
use uuid::Uuid;

const ROOT_SELECT_SQL: &str = "SELECT
    uuid,
    kind,
    title,
    description,
    tags,
    team,
    sub_team,
    status,
    creator,
    version,
    duration_minutes,
    thumbnail,
    credits,
    stars,
    badges,
    created_at,
    updated_at
FROM composite_roots";

/// One whole-tree write. Edits are always full replacements.
#[derive(Debug, Clone, Copy)]
pub enum TreeMutation<'a> {
    Create {
        fields: &'a RootFields,
        sections: &'a [SectionDraft],
    },
    Replace {
        root_id: RootId,
        /// Compare-and-swap guard on `version`; `None` means last writer wins.
        expected_version: Option<u32>,
        fields: &'a RootFields,
        sections: &'a [SectionDraft],
    },
    Delete {
        root_id: RootId,
    },
}

impl TreeMutation<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Replace { .. } => "replace",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Query options for listing composite roots.
#[derive(Debug, Clone, Default)]
pub struct CompositeListQuery {
    pub status: Option<LifecycleStatus>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for composite trees of one kind.
pub trait CompositeRepository {
    /// Collection this repository is scoped to.
    fn kind(&self) -> CompositeKind;
    /// Applies one mutation atomically.
    ///
    /// Returns the written tree for create/replace and the pre-delete
    /// snapshot for delete.
    fn apply(
        &self,
        mutation: TreeMutation<'_>,
        deadline: Option<Instant>,
    ) -> RepoResult<CompositeDocument>;
    /// Returns the current version of one root, `None` when absent.
    fn root_version(&self, root_id: RootId) -> RepoResult<Option<u32>>;
    /// Loads one full tree.
    fn load_document(&self, root_id: RootId) -> RepoResult<Option<CompositeDocument>>;
    /// Lists roots without children.
    fn list_roots(&self, query: &CompositeListQuery) -> RepoResult<Vec<CompositeRoot>>;
}

/// SQLite-backed composite repository.
pub struct SqliteCompositeRepository<'conn> {
    conn: &'conn Connection,
    kind: CompositeKind,
}

impl<'conn> SqliteCompositeRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection, kind: CompositeKind) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["composite_roots", "sections", "questions"])?;
        Ok(Self { conn, kind })
    }
}

impl CompositeRepository for SqliteCompositeRepository<'_> {
    fn kind(&self) -> CompositeKind {
        self.kind
    }

    fn apply(
        &self,
        mutation: TreeMutation<'_>,
        deadline: Option<Instant>,
    ) -> RepoResult<CompositeDocument> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let ctx = WriteContext {
            tx: &tx,
            kind: self.kind,
            deadline,
        };

        let document = match mutation {
            TreeMutation::Create { fields, sections } => {
                let root_id = Uuid::new_v4();
                ctx.checkpoint("insert_root")?;
                insert_root(&ctx, root_id, fields)?;
                insert_sections(&ctx, root_id, sections)?;
                read_back(&ctx, root_id)?
            }
            TreeMutation::Replace {
                root_id,
                expected_version,
                fields,
                sections,
            } => {
                let actual = load_version(ctx.tx, ctx.kind, root_id)?
                    .ok_or(RepoError::NotFound(root_id))?;
                if let Some(expected) = expected_version {
                    if expected != actual {
                        return Err(RepoError::VersionConflict {
                            id: root_id,
                            expected,
                            actual,
                        });
                    }
                }
                delete_children(&ctx, root_id)?;
                insert_sections(&ctx, root_id, sections)?;
                ctx.checkpoint("update_root")?;
                update_root(&ctx, root_id, fields)?;
                read_back(&ctx, root_id)?
            }
            TreeMutation::Delete { root_id } => {
                let snapshot = load_document_in(ctx.tx, ctx.kind, root_id)?
                    .ok_or(RepoError::NotFound(root_id))?;
                delete_children(&ctx, root_id)?;
                ctx.checkpoint("delete_root")?;
                ctx.tx.execute(
                    "DELETE FROM composite_roots WHERE uuid = ?1 AND kind = ?2;",
                    params![root_id.to_string(), ctx.kind.as_db()],
                )?;
                snapshot
            }
        };

        tx.commit()?;
        Ok(document)
    }

    fn root_version(&self, root_id: RootId) -> RepoResult<Option<u32>> {
        load_version(self.conn, self.kind, root_id)
    }

    fn load_document(&self, root_id: RootId) -> RepoResult<Option<CompositeDocument>> {
        // Root and children must come from one snapshot.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let document = load_document_in(&tx, self.kind, root_id)?;
        tx.commit()?;
        Ok(document)
    }

    fn list_roots(&self, query: &CompositeListQuery) -> RepoResult<Vec<CompositeRoot>> {
        let mut sql = format!("{ROOT_SELECT_SQL} WHERE kind = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(self.kind.as_db().to_string())];

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_db().to_string()));
        }

        sql.push_str(" ORDER BY updated_at DESC, uuid ASC");
        match query.limit {
            Some(limit) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                bind_values.push(Value::Integer(i64::from(limit)));
            }
            None => sql.push_str(" LIMIT -1 OFFSET ?"),
        }
        bind_values.push(Value::Integer(i64::from(query.offset)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut roots = Vec::new();
        while let Some(row) = rows.next()? {
            roots.push(parse_root_row(row)?);
        }
        Ok(roots)
    }
}

/// Transaction context threaded through every step of one mutation.
struct WriteContext<'a, 'conn> {
    tx: &'a Transaction<'conn>,
    kind: CompositeKind,
    deadline: Option<Instant>,
}

impl WriteContext<'_, '_> {
    fn checkpoint(&self, step: &'static str) -> RepoResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(RepoError::DeadlineExceeded { step })
            }
            _ => Ok(()),
        }
    }
}

fn insert_root(ctx: &WriteContext<'_, '_>, root_id: RootId, fields: &RootFields) -> RepoResult<()> {
    let tags = encode_string_list(&normalize_tags(&fields.tags))?;
    ctx.tx.execute(
        "INSERT INTO composite_roots (
            uuid,
            kind,
            title,
            description,
            tags,
            team,
            sub_team,
            status,
            creator,
            version,
            duration_minutes,
            thumbnail,
            credits,
            stars,
            badges
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?11, ?12, ?13, ?14);",
        params![
            root_id.to_string(),
            ctx.kind.as_db(),
            fields.title.as_str(),
            fields.description.as_str(),
            tags,
            fields.team.as_deref(),
            fields.sub_team.as_deref(),
            fields.status.as_db(),
            fields.creator.as_deref(),
            fields.meta.duration_minutes,
            fields.meta.thumbnail.as_deref(),
            fields.meta.credits,
            fields.meta.stars,
            fields.meta.badges,
        ],
    )?;
    Ok(())
}

fn update_root(ctx: &WriteContext<'_, '_>, root_id: RootId, fields: &RootFields) -> RepoResult<()> {
    let tags = encode_string_list(&normalize_tags(&fields.tags))?;
    let changed = ctx.tx.execute(
        "UPDATE composite_roots
         SET
            title = ?3,
            description = ?4,
            tags = ?5,
            team = ?6,
            sub_team = ?7,
            status = ?8,
            creator = ?9,
            duration_minutes = ?10,
            thumbnail = ?11,
            credits = ?12,
            stars = ?13,
            badges = ?14,
            version = version + 1,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?1
           AND kind = ?2;",
        params![
            root_id.to_string(),
            ctx.kind.as_db(),
            fields.title.as_str(),
            fields.description.as_str(),
            tags,
            fields.team.as_deref(),
            fields.sub_team.as_deref(),
            fields.status.as_db(),
            fields.creator.as_deref(),
            fields.meta.duration_minutes,
            fields.meta.thumbnail.as_deref(),
            fields.meta.credits,
            fields.meta.stars,
            fields.meta.badges,
        ],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound(root_id));
    }
    Ok(())
}

fn insert_sections(
    ctx: &WriteContext<'_, '_>,
    root_id: RootId,
    sections: &[SectionDraft],
) -> RepoResult<()> {
    for (section_order, section) in sections.iter().enumerate() {
        let section_id = Uuid::new_v4();
        ctx.checkpoint("insert_section")?;
        ctx.tx.execute(
            "INSERT INTO sections (uuid, root_uuid, description, sort_order)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                section_id.to_string(),
                root_id.to_string(),
                section.description.as_str(),
                section_order as i64,
            ],
        )?;

        for (question_order, question) in section.questions.iter().enumerate() {
            ctx.checkpoint("insert_question")?;
            insert_question(ctx, section_id, question_order, question)?;
        }
    }
    Ok(())
}

fn insert_question(
    ctx: &WriteContext<'_, '_>,
    section_id: SectionId,
    sort_order: usize,
    question: &QuestionDraft,
) -> RepoResult<()> {
    let options = encode_string_list(&question.options)?;
    ctx.tx.execute(
        "INSERT INTO questions (
            uuid,
            section_uuid,
            question_type,
            text,
            options,
            instruction_header,
            instruction_body,
            instructions,
            sort_order
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        params![
            Uuid::new_v4().to_string(),
            section_id.to_string(),
            question.question_type.as_db(),
            question.text.as_str(),
            options,
            question.instruction_header.as_deref(),
            question.instruction_body.as_deref(),
            question.instructions(),
            sort_order as i64,
        ],
    )?;
    Ok(())
}

/// Deletes every question, then every section, owned by `root_id`.
fn delete_children(ctx: &WriteContext<'_, '_>, root_id: RootId) -> RepoResult<()> {
    let section_ids = list_section_ids(ctx.tx, root_id)?;
    for section_id in &section_ids {
        ctx.checkpoint("delete_questions")?;
        ctx.tx.execute(
            "DELETE FROM questions WHERE section_uuid = ?1;",
            [section_id.to_string()],
        )?;
    }
    ctx.checkpoint("delete_sections")?;
    let removed = ctx.tx.execute(
        "DELETE FROM sections WHERE root_uuid = ?1;",
        [root_id.to_string()],
    )?;
    if removed != section_ids.len() {
        return Err(RepoError::InvalidData(format!(
            "expected to delete {} sections of {root_id}, deleted {removed}",
            section_ids.len()
        )));
    }
    Ok(())
}

fn load_version(
    conn: &Connection,
    kind: CompositeKind,
    root_id: RootId,
) -> RepoResult<Option<u32>> {
    let version = conn
        .query_row(
            "SELECT version FROM composite_roots WHERE uuid = ?1 AND kind = ?2;",
            params![root_id.to_string(), kind.as_db()],
            |row| row.get::<_, u32>(0),
        )
        .optional()?;
    Ok(version)
}

fn read_back(ctx: &WriteContext<'_, '_>, root_id: RootId) -> RepoResult<CompositeDocument> {
    load_document_in(ctx.tx, ctx.kind, root_id)?.ok_or_else(|| {
        RepoError::InvalidData(format!("written root {root_id} missing on read-back"))
    })
}

fn load_document_in(
    conn: &Connection,
    kind: CompositeKind,
    root_id: RootId,
) -> RepoResult<Option<CompositeDocument>> {
    let mut stmt = conn.prepare(&format!("{ROOT_SELECT_SQL} WHERE uuid = ?1 AND kind = ?2;"))?;
    let mut rows = stmt.query(params![root_id.to_string(), kind.as_db()])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let root = parse_root_row(row)?;

    let mut sections = Vec::new();
    for (section_id, description) in list_sections(conn, root_id)? {
        sections.push(Section {
            id: section_id,
            description,
            questions: list_questions(conn, section_id)?,
        });
    }

    Ok(Some(CompositeDocument { root, sections }))
}

fn list_section_ids(conn: &Connection, root_id: RootId) -> RepoResult<Vec<SectionId>> {
    Ok(list_sections(conn, root_id)?
        .into_iter()
        .map(|(id, _)| id)
        .collect())
}

fn list_sections(conn: &Connection, root_id: RootId) -> RepoResult<Vec<(SectionId, String)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT uuid, description
         FROM sections
         WHERE root_uuid = ?1
         ORDER BY sort_order ASC;",
    )?;
    let mut rows = stmt.query([root_id.to_string()])?;
    let mut sections = Vec::new();
    while let Some(row) = rows.next()? {
        let uuid_text: String = row.get("uuid")?;
        sections.push((
            parse_uuid(&uuid_text, "sections.uuid")?,
            row.get("description")?,
        ));
    }
    Ok(sections)
}

fn list_questions(conn: &Connection, section_id: SectionId) -> RepoResult<Vec<Question>> {
    let mut stmt = conn.prepare_cached(
        "SELECT
            uuid,
            question_type,
            text,
            options,
            instruction_header,
            instruction_body,
            instructions
         FROM questions
         WHERE section_uuid = ?1
         ORDER BY sort_order ASC;",
    )?;
    let mut rows = stmt.query([section_id.to_string()])?;
    let mut questions = Vec::new();
    while let Some(row) = rows.next()? {
        questions.push(parse_question_row(row)?);
    }
    Ok(questions)
}

fn parse_question_row(row: &Row<'_>) -> RepoResult<Question> {
    let uuid_text: String = row.get("uuid")?;
    let type_text: String = row.get("question_type")?;
    let question_type = QuestionType::parse_db(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid question type `{type_text}` in questions.question_type"
        ))
    })?;
    let options_text: String = row.get("options")?;
    let instruction_header: Option<String> = row.get("instruction_header")?;
    let instruction_body: Option<String> = row.get("instruction_body")?;
    let instructions: Option<String> = row.get("instructions")?;

    // Stored value must track header/body.
    let derived = derive_instructions(instruction_header.as_deref(), instruction_body.as_deref());
    if instructions != derived {
        return Err(RepoError::InvalidData(format!(
            "questions.instructions out of sync for {uuid_text}"
        )));
    }

    Ok(Question {
        id: parse_uuid(&uuid_text, "questions.uuid")?,
        question_type,
        text: row.get("text")?,
        options: decode_string_list(&options_text, "questions.options")?,
        instruction_header,
        instruction_body,
        instructions,
    })
}

fn parse_root_row(row: &Row<'_>) -> RepoResult<CompositeRoot> {
    let uuid_text: String = row.get("uuid")?;
    let kind_text: String = row.get("kind")?;
    let kind = CompositeKind::parse_db(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid kind `{kind_text}` in composite_roots.kind"))
    })?;
    let status_text: String = row.get("status")?;
    let status = LifecycleStatus::parse_db(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in composite_roots.status"
        ))
    })?;
    let tags_text: String = row.get("tags")?;

    Ok(CompositeRoot {
        id: parse_uuid(&uuid_text, "composite_roots.uuid")?,
        kind,
        fields: RootFields {
            title: row.get("title")?,
            description: row.get("description")?,
            tags: decode_string_list(&tags_text, "composite_roots.tags")?,
            team: row.get("team")?,
            sub_team: row.get("sub_team")?,
            status,
            creator: row.get("creator")?,
            meta: ContentMeta {
                duration_minutes: row.get("duration_minutes")?,
                thumbnail: row.get("thumbnail")?,
                credits: row.get("credits")?,
                stars: row.get("stars")?,
                badges: row.get("badges")?,
            },
        },
        version: row.get("version")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
