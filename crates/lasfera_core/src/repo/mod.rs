//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the text unit store contracts used by services (iterate-all,
//!   filter by address prefix or range, get by id, update address links).
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Write paths validate LineCode pairs before persistence.
//! - Read paths reject invalid persisted LineCodes instead of masking them.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

use crate::db::DbError;
use crate::model::line_code::{LineCode, LineCodeError};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod annotation_repo;
pub mod folio_repo;
pub mod stanza_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by the edition store.
#[derive(Debug)]
pub enum RepoError {
    /// Address pair rejected before write.
    Validation(LineCodeError),
    Db(DbError),
    NotFound {
        entity: &'static str,
        id: String,
    },
    InvalidData(String),
}

impl RepoError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<LineCodeError> for RepoError {
    fn from(value: LineCodeError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of an insert-or-update keyed by a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert<Id> {
    Created(Id),
    Updated(Id),
}

impl<Id> Upsert<Id> {
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

impl<Id: Copy> Upsert<Id> {
    pub fn id(&self) -> Id {
        match self {
            Self::Created(id) | Self::Updated(id) => *id,
        }
    }
}

pub(crate) fn parse_stored_code(raw: Option<String>, column: &str) -> RepoResult<Option<LineCode>> {
    match raw {
        Some(value) => LineCode::parse(&value)
            .map(Some)
            .map_err(|_| RepoError::InvalidData(format!("invalid line code `{value}` in {column}"))),
        None => Ok(None),
    }
}

/// How a listing treats a stored line code that no longer parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoredCodes {
    /// Fail the read with `InvalidData`.
    Strict,
    /// Log the row and read the code as absent.
    Lenient,
}

pub(crate) fn read_stored_code(
    raw: Option<String>,
    column: &str,
    row_id: i64,
    codes: StoredCodes,
) -> RepoResult<Option<LineCode>> {
    match (parse_stored_code(raw, column), codes) {
        (Err(RepoError::InvalidData(message)), StoredCodes::Lenient) => {
            warn!(
                "event=stored_code_ignored module=repo column={} row_id={} error={}",
                column, row_id, message
            );
            Ok(None)
        }
        (result, _) => result,
    }
}
