//! Subcommand arguments and their execution against core services.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Subcommand, ValueEnum};
use learnhub_core::{
    Assignment, CatalogService, CompositeKind, CompositeListQuery, CompositionService,
    ContentRef, ContentType, Element, LifecycleStatus, Module, ProgressRecord, RootFields,
    SqliteCatalogRepository, SqliteCompositeRepository,
};
use log::info;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Survey,
    Assessment,
}

impl From<KindArg> for CompositeKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Survey => Self::Survey,
            KindArg::Assessment => Self::Assessment,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ContentArg {
    Module,
    Assessment,
    Survey,
}

impl From<ContentArg> for ContentType {
    fn from(value: ContentArg) -> Self {
        match value {
            ContentArg::Module => Self::Module,
            ContentArg::Assessment => Self::Assessment,
            ContentArg::Survey => Self::Survey,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Draft,
    Published,
    Archived,
}

impl From<StatusArg> for LifecycleStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Draft => Self::Draft,
            StatusArg::Published => Self::Published,
            StatusArg::Archived => Self::Archived,
        }
    }
}

/// Root fields plus the UI elements list, as read from `--file`.
#[derive(Debug, Deserialize)]
struct CompositeInput {
    #[serde(flatten)]
    fields: RootFields,
    elements: Vec<Element>,
}

#[derive(Debug, Args)]
pub struct KindOpts {
    #[arg(long, value_enum)]
    kind: KindArg,

    /// Abort and roll back writes that run longer than this.
    #[arg(long)]
    write_timeout_ms: Option<u64>,
}

impl KindOpts {
    fn service<'conn>(
        &self,
        conn: &'conn Connection,
    ) -> Result<CompositionService<SqliteCompositeRepository<'conn>>> {
        let repo = SqliteCompositeRepository::try_new(conn, self.kind.into())?;
        let service = CompositionService::new(repo);
        Ok(match self.write_timeout_ms {
            Some(ms) => service.with_write_timeout(Duration::from_millis(ms)),
            None => service,
        })
    }
}

#[derive(Debug, Subcommand)]
pub enum CompositeCommand {
    /// Create a tree from a JSON file of root fields and elements
    Create {
        #[command(flatten)]
        opts: KindOpts,
        #[arg(long)]
        file: PathBuf,
    },
    /// Print one tree with its elements view
    Show {
        #[command(flatten)]
        opts: KindOpts,
        id: Uuid,
    },
    /// Replace root fields and the whole tree of an existing root
    Edit {
        #[command(flatten)]
        opts: KindOpts,
        id: Uuid,
        #[arg(long)]
        file: PathBuf,
        /// Fail instead of overwriting when the stored version differs.
        #[arg(long)]
        expected_version: Option<u32>,
    },
    /// Delete a tree and print the removed snapshot
    Delete {
        #[command(flatten)]
        opts: KindOpts,
        id: Uuid,
    },
    /// List roots without their children
    List {
        #[command(flatten)]
        opts: KindOpts,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

impl CompositeCommand {
    pub fn execute(self, conn: &Connection) -> Result<Value> {
        match self {
            Self::Create { opts, file } => {
                let input = read_input(&file)?;
                let document = opts
                    .service(conn)?
                    .create_from_elements(&input.fields, &input.elements)?;
                Ok(serde_json::to_value(document)?)
            }
            Self::Show { opts, id } => Ok(serde_json::to_value(opts.service(conn)?.read(id)?)?),
            Self::Edit {
                opts,
                id,
                file,
                expected_version,
            } => {
                let input = read_input(&file)?;
                let document = opts.service(conn)?.edit_from_elements(
                    id,
                    &input.fields,
                    &input.elements,
                    expected_version,
                )?;
                Ok(serde_json::to_value(document)?)
            }
            Self::Delete { opts, id } => Ok(serde_json::to_value(opts.service(conn)?.delete(id)?)?),
            Self::List {
                opts,
                status,
                limit,
                offset,
            } => {
                let query = CompositeListQuery {
                    status: status.map(Into::into),
                    limit,
                    offset,
                };
                Ok(serde_json::to_value(opts.service(conn)?.list(&query)?)?)
            }
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ModuleCommand {
    /// Insert one module
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, value_enum, default_value = "draft")]
        status: StatusArg,
        /// Expected completion time in minutes.
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        thumbnail: Option<String>,
        #[arg(long, default_value_t = 0)]
        credits: u32,
    },
}

impl ModuleCommand {
    pub fn execute(self, conn: &Connection) -> Result<Value> {
        match self {
            Self::Create {
                title,
                description,
                tags,
                status,
                duration,
                thumbnail,
                credits,
            } => {
                let mut module = Module::new(title, description);
                module.tags = tags;
                module.status = status.into();
                module.meta.duration_minutes = duration;
                module.meta.thumbnail = thumbnail;
                module.meta.credits = credits;
                SqliteCatalogRepository::try_new(conn)?.create_module(&module)?;
                Ok(serde_json::to_value(module)?)
            }
        }
    }
}

#[derive(Debug, Args)]
pub struct AssignArgs {
    #[arg(long)]
    org: String,
    #[arg(long, value_enum)]
    content_type: ContentArg,
    #[arg(long)]
    content_id: Uuid,
    /// YYYY-MM-DD
    #[arg(long)]
    assign_date: NaiveDate,
    /// HH:MM, UTC
    #[arg(long)]
    assign_time: String,
    #[arg(long)]
    due_date: NaiveDate,
    #[arg(long)]
    due_time: String,
    #[arg(long)]
    recurring: bool,
    #[arg(long)]
    notify_users: bool,
}

impl AssignArgs {
    pub fn execute(self, conn: &Connection) -> Result<Value> {
        let content = ContentRef::new(self.content_type.into(), self.content_id);
        let mut assignment = Assignment::new(self.org, content).with_window(
            (self.assign_date, self.assign_time),
            (self.due_date, self.due_time),
        );
        assignment.recurring = self.recurring;
        assignment.notify_users = self.notify_users;
        SqliteCatalogRepository::try_new(conn)?.create_assignment(&assignment)?;
        info!(
            "event=assignment_create module=cli status=ok assignment_uuid={} content_type={}",
            assignment.id,
            assignment.content.content_type()
        );
        Ok(serde_json::to_value(assignment)?)
    }
}

#[derive(Debug, Subcommand)]
pub enum ProgressCommand {
    /// Insert or replace the marker of one learner/content pair
    Record {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        content_id: Uuid,
        #[arg(long)]
        marker: String,
    },
}

impl ProgressCommand {
    pub fn execute(self, conn: &Connection) -> Result<Value> {
        match self {
            Self::Record {
                learner,
                content_id,
                marker,
            } => {
                let record = ProgressRecord {
                    learner_id: learner,
                    content_id,
                    marker,
                };
                SqliteCatalogRepository::try_new(conn)?.record_progress(&record)?;
                Ok(serde_json::to_value(record)?)
            }
        }
    }
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    #[arg(long)]
    learner: String,
    #[arg(long)]
    org: String,
    /// RFC 3339 instant to evaluate windows at; defaults to the current time.
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

impl CatalogArgs {
    pub fn execute(self, conn: &Connection) -> Result<Value> {
        let service = CatalogService::new(SqliteCatalogRepository::try_new(conn)?);
        let now = self.now.unwrap_or_else(Utc::now);
        let items = service.build_catalog(&self.learner, &self.org, now)?;
        Ok(serde_json::to_value(items)?)
    }
}

fn read_input(path: &Path) -> Result<CompositeInput> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid composite JSON in {}", path.display()))
}
