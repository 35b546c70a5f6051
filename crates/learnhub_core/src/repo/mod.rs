//! Repository layer: SQLite persistence behind use-case oriented traits.
//!
//! # Responsibility
//! - Keep SQL details inside the core persistence boundary.
//! - Map storage failures and semantic misses onto `RepoError`.
//!
//! # Invariants
//! - Repositories only accept connections migrated to `latest_version()`.
//! - Multi-step writes run in one explicitly passed transaction.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

pub mod catalog_repo;
pub mod composite_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by composite and catalog persistence.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("record not found: {0}")]
    NotFound(Uuid),
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict { id: Uuid, expected: u32, actual: u32 },
    #[error("write deadline exceeded before `{step}`")]
    DeadlineExceeded { step: &'static str },
    #[error("repository requires schema version {expected_version}, got {actual_version}")]
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    #[error("repository requires table `{0}`")]
    MissingRequiredTable(&'static str),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn encode_string_list(values: &[String]) -> RepoResult<String> {
    serde_json::to_string(values)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode string list: {err}")))
}

pub(crate) fn decode_string_list(value: &str, column: &'static str) -> RepoResult<Vec<String>> {
    serde_json::from_str(value)
        .map_err(|err| RepoError::InvalidData(format!("invalid json list in {column}: {err}")))
}
