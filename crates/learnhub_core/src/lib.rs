//! Core domain logic for learnhub.
//! This crate is the single source of truth for composite content integrity
//! and learner catalog resolution.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::assignment::{
    combine_instant, is_active, Assignment, AssignmentId, ContentRef, ProgressRecord, WindowError,
};
pub use model::catalog::{CatalogItem, ContentSummary};
pub use model::composite::{
    validate_tree, CompositeDocument, CompositeKind, CompositeRoot, Question, QuestionDraft,
    QuestionId, QuestionType, RootFields, RootId, Section, SectionDraft, SectionId,
    TreeValidationError, Violation,
};
pub use model::content::{ContentId, ContentMeta, ContentType, LifecycleStatus, Module};
pub use model::element::{flatten, reconstruct, Element, ElementsError};
pub use repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
pub use repo::composite_repo::{
    CompositeListQuery, CompositeRepository, SqliteCompositeRepository, TreeMutation,
};
pub use repo::{RepoError, RepoResult};
pub use service::catalog_service::{CatalogError, CatalogService, CatalogStage};
pub use service::composition_service::{CompositeView, CompositionError, CompositionService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
