//! Composite content use-case service.
//!
//! # Responsibility
//! - Validate submitted trees before any storage access that writes.
//! - Drive whole-tree create / replace / delete through the repository.
//! - Attach the flattened elements view on read.
//!
//! # Invariants
//! - Validation and elements errors never open a transaction.
//! - Every storage failure during a write surfaces as `TransactionAborted`;
//!   by then the repository has rolled back all steps of the call.
//! - Not-found is reported distinctly from validation failures.

use crate::model::composite::{
    validate_tree, CompositeDocument, CompositeKind, CompositeRoot, RootFields, RootId,
    SectionDraft, TreeValidationError,
};
use crate::model::element::{flatten, reconstruct, Element, ElementsError};
use crate::repo::composite_repo::{CompositeListQuery, CompositeRepository, TreeMutation};
use crate::repo::RepoError;
use log::{error, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from composite use-cases.
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error(transparent)]
    Validation(#[from] TreeValidationError),
    #[error(transparent)]
    Elements(#[from] ElementsError),
    #[error("{kind} not found: {id}")]
    NotFound { kind: CompositeKind, id: RootId },
    #[error("{kind} {id} changed concurrently: expected version {expected}, found {actual}")]
    VersionConflict {
        kind: CompositeKind,
        id: RootId,
        expected: u32,
        actual: u32,
    },
    /// Write failed mid-transaction and was rolled back.
    #[error("operation failed, no changes applied")]
    TransactionAborted {
        #[source]
        source: RepoError,
    },
    /// Read-path failure.
    #[error(transparent)]
    Storage(RepoError),
}

/// Read result: the native tree plus its flattened elements view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeView {
    #[serde(flatten)]
    pub document: CompositeDocument,
    pub elements: Vec<Element>,
}

/// Composite service facade for one collection (surveys or assessments).
pub struct CompositionService<R: CompositeRepository> {
    repo: R,
    write_timeout: Option<Duration>,
}

impl<R: CompositeRepository> CompositionService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            write_timeout: None,
        }
    }

    /// Bounds each write call; an exceeded bound aborts and rolls back.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn kind(&self) -> CompositeKind {
        self.repo.kind()
    }

    /// Creates one composite tree atomically.
    pub fn create(
        &self,
        fields: &RootFields,
        sections: &[SectionDraft],
    ) -> Result<CompositeDocument, CompositionError> {
        self.reject_invalid("create", fields, sections)?;
        self.run_write(TreeMutation::Create { fields, sections })
    }

    /// Creates one composite tree from the UI elements list.
    pub fn create_from_elements(
        &self,
        fields: &RootFields,
        elements: &[Element],
    ) -> Result<CompositeDocument, CompositionError> {
        let sections = reconstruct(elements)?;
        self.create(fields, &sections)
    }

    /// Replaces root fields and the whole section tree of an existing root.
    ///
    /// `expected_version` enables compare-and-swap; `None` keeps
    /// last-writer-wins semantics.
    pub fn edit(
        &self,
        root_id: RootId,
        fields: &RootFields,
        sections: &[SectionDraft],
        expected_version: Option<u32>,
    ) -> Result<CompositeDocument, CompositionError> {
        let kind = self.kind();
        self.repo
            .root_version(root_id)
            .map_err(CompositionError::Storage)?
            .ok_or(CompositionError::NotFound { kind, id: root_id })?;
        self.reject_invalid("replace", fields, sections)?;
        self.run_write(TreeMutation::Replace {
            root_id,
            expected_version,
            fields,
            sections,
        })
    }

    /// Replace variant taking the UI elements list.
    pub fn edit_from_elements(
        &self,
        root_id: RootId,
        fields: &RootFields,
        elements: &[Element],
        expected_version: Option<u32>,
    ) -> Result<CompositeDocument, CompositionError> {
        let sections = reconstruct(elements)?;
        self.edit(root_id, fields, &sections, expected_version)
    }

    /// Deletes one root with all sections and questions; returns the
    /// pre-delete snapshot for auditing.
    pub fn delete(&self, root_id: RootId) -> Result<CompositeDocument, CompositionError> {
        self.run_write(TreeMutation::Delete { root_id })
    }

    /// Loads one tree with its flattened elements view.
    pub fn read(&self, root_id: RootId) -> Result<CompositeView, CompositionError> {
        let document = self
            .repo
            .load_document(root_id)
            .map_err(CompositionError::Storage)?
            .ok_or(CompositionError::NotFound {
                kind: self.kind(),
                id: root_id,
            })?;
        let elements = flatten(&document.section_drafts());
        Ok(CompositeView { document, elements })
    }

    /// Lists roots of this collection without their children.
    pub fn list(&self, query: &CompositeListQuery) -> Result<Vec<CompositeRoot>, CompositionError> {
        self.repo.list_roots(query).map_err(CompositionError::Storage)
    }

    fn reject_invalid(
        &self,
        op: &'static str,
        fields: &RootFields,
        sections: &[SectionDraft],
    ) -> Result<(), CompositionError> {
        validate_tree(fields, sections).map_err(|err| {
            warn!(
                "event=composite_{op} module=composition status=rejected kind={} violations={}",
                self.kind(),
                err.violations.len()
            );
            CompositionError::from(err)
        })
    }

    fn run_write(&self, mutation: TreeMutation<'_>) -> Result<CompositeDocument, CompositionError> {
        let started_at = Instant::now();
        let op = mutation.name();
        let kind = self.kind();
        let deadline = self.write_timeout.map(|timeout| started_at + timeout);

        match self.repo.apply(mutation, deadline) {
            Ok(document) => {
                info!(
                    "event=composite_{op} module=composition status=ok kind={kind} root_uuid={} version={} sections={} questions={} duration_ms={}",
                    document.root.id,
                    document.root.version,
                    document.sections.len(),
                    document.question_count(),
                    started_at.elapsed().as_millis()
                );
                Ok(document)
            }
            Err(err) => {
                let mapped = match err {
                    RepoError::NotFound(id) => CompositionError::NotFound { kind, id },
                    RepoError::VersionConflict {
                        id,
                        expected,
                        actual,
                    } => CompositionError::VersionConflict {
                        kind,
                        id,
                        expected,
                        actual,
                    },
                    other => CompositionError::TransactionAborted { source: other },
                };
                match &mapped {
                    CompositionError::TransactionAborted { source } => error!(
                        "event=composite_{op} module=composition status=error kind={kind} duration_ms={} error={source}",
                        started_at.elapsed().as_millis()
                    ),
                    other => warn!(
                        "event=composite_{op} module=composition status=rejected kind={kind} error={other}"
                    ),
                }
                Err(mapped)
            }
        }
    }
}
