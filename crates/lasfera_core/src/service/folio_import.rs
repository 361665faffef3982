//! Folio range import.
//!
//! # Responsibility
//! - Validate typed folio rows once at ingestion.
//! - Upsert each folio with its bounds and recompute its membership.
//!
//! # Invariants
//! - `"-"` and blank bound cells mean an open bound, never a literal value.
//! - Bounds are plain addresses; ranges and variants are rejected.
//! - Rows commit one at a time; a failing row never undoes earlier rows.
//! - Only store failures abort the batch.

use crate::model::folio::FolioId;
use crate::model::line_code::{AddressBounds, LineAddress, LineCode, LineCodeError};
use crate::model::stanza::StanzaId;
use crate::repo::folio_repo::FolioRepository;
use crate::repo::stanza_repo::StanzaRepository;
use crate::repo::{RepoError, RepoResult};
use crate::service::range_resolver::{RangeResolveError, RangeResolver};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Cell value meaning "no bound" in folio spreadsheets.
pub const OPEN_BOUND_SENTINEL: &str = "-";

/// One folio row as handed over by a loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolioImportRow {
    pub manuscript: String,
    pub folio: String,
    #[serde(default)]
    pub line_code_starts: Option<String>,
    #[serde(default)]
    pub next_start_line: Option<String>,
}

#[derive(Debug)]
pub enum FolioImportError {
    MissingField(&'static str),
    UnknownManuscript(String),
    Address {
        field: &'static str,
        source: LineCodeError,
    },
    BoundNotAddress {
        field: &'static str,
        value: String,
    },
    Repo(RepoError),
}

impl Display for FolioImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing field `{field}`"),
            Self::UnknownManuscript(siglum) => write!(f, "unknown manuscript `{siglum}`"),
            Self::Address { field, source } => write!(f, "invalid `{field}`: {source}"),
            Self::BoundNotAddress { field, value } => {
                write!(f, "`{field}` must be a single address, got `{value}`")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FolioImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Address { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            Self::MissingField(_) | Self::UnknownManuscript(_) | Self::BoundNotAddress { .. } => {
                None
            }
        }
    }
}

impl From<RepoError> for FolioImportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<RangeResolveError> for FolioImportError {
    fn from(value: RangeResolveError) -> Self {
        match value {
            RangeResolveError::Repo(err) => Self::Repo(err),
            RangeResolveError::FolioNotFound(id) => {
                Self::Repo(RepoError::not_found("folio", id))
            }
        }
    }
}

/// Validated content of a [`FolioImportRow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolioSpec {
    pub manuscript: String,
    pub label: String,
    pub bounds: AddressBounds,
}

impl FolioImportRow {
    /// Trims and parses the row without touching the store.
    pub fn validate(&self) -> Result<FolioSpec, FolioImportError> {
        let manuscript = required(&self.manuscript, "manuscript")?;
        let label = required(&self.folio, "folio")?;
        let start = parse_bound(self.line_code_starts.as_deref(), "line_code_starts")?;
        let end = parse_bound(self.next_start_line.as_deref(), "next_start_line")?;
        let bounds = AddressBounds::new(start, end).map_err(|source| FolioImportError::Address {
            field: "next_start_line",
            source,
        })?;
        Ok(FolioSpec {
            manuscript,
            label,
            bounds,
        })
    }
}

fn required(value: &str, field: &'static str) -> Result<String, FolioImportError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FolioImportError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

fn parse_bound(
    raw: Option<&str>,
    field: &'static str,
) -> Result<Option<LineAddress>, FolioImportError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() || trimmed == OPEN_BOUND_SENTINEL {
        return Ok(None);
    }
    let code =
        LineCode::parse(trimmed).map_err(|source| FolioImportError::Address { field, source })?;
    if code.is_range() || code.variant().is_some() {
        return Err(FolioImportError::BoundNotAddress {
            field,
            value: trimmed.to_string(),
        });
    }
    Ok(Some(code.start()))
}

/// Successful row outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolioImportOutcome {
    pub folio_id: FolioId,
    pub manuscript: String,
    pub label: String,
    pub created: bool,
    /// Resolved membership in reading order.
    pub members: Vec<StanzaId>,
}

pub type FolioRowResult = Result<FolioImportOutcome, FolioImportError>;

/// Per-row outcomes of one import batch, in input order.
#[derive(Debug, Default)]
pub struct FolioImportReport {
    pub rows: Vec<FolioRowResult>,
}

impl FolioImportReport {
    pub fn succeeded(&self) -> usize {
        self.rows.iter().filter(|row| row.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.succeeded()
    }
}

/// Imports folio rows and keeps their membership current.
pub struct FolioImporter<S: StanzaRepository, F: FolioRepository> {
    resolver: RangeResolver<S, F>,
}

impl<S: StanzaRepository, F: FolioRepository> FolioImporter<S, F> {
    pub fn new(resolver: RangeResolver<S, F>) -> Self {
        Self { resolver }
    }

    /// Imports one row: validate, resolve manuscript, compute membership, then
    /// write the folio and its membership together. A failed row writes nothing.
    pub fn import_row(&self, row: &FolioImportRow) -> FolioRowResult {
        let spec = row.validate()?;
        let folios = self.resolver.folios();
        if folios.get_manuscript(&spec.manuscript)?.is_none() {
            return Err(FolioImportError::UnknownManuscript(spec.manuscript));
        }

        let members = self.resolver.membership_for(&spec.bounds)?;
        let upsert = folios.store_folio(&spec.manuscript, &spec.label, &spec.bounds, &members)?;
        Ok(FolioImportOutcome {
            folio_id: upsert.id(),
            manuscript: spec.manuscript,
            label: spec.label,
            created: upsert.was_created(),
            members,
        })
    }

    /// Imports every row, continuing past row-level failures.
    ///
    /// Returns `Err` only when the store itself fails.
    pub fn import_rows(&self, rows: &[FolioImportRow]) -> RepoResult<FolioImportReport> {
        let mut report = FolioImportReport::default();
        for (index, row) in rows.iter().enumerate() {
            match self.import_row(row) {
                Err(FolioImportError::Repo(RepoError::Db(err))) => {
                    warn!(
                        "event=folio_import module=folio_import status=aborted row={} error={}",
                        index + 1,
                        err
                    );
                    return Err(RepoError::Db(err));
                }
                Err(err) => {
                    warn!(
                        "event=folio_import_row module=folio_import status=skipped row={} manuscript={} folio={} error={}",
                        index + 1,
                        row.manuscript.trim(),
                        row.folio.trim(),
                        err
                    );
                    report.rows.push(Err(err));
                }
                Ok(outcome) => report.rows.push(Ok(outcome)),
            }
        }
        info!(
            "event=folio_import module=folio_import status=ok rows={} succeeded={} failed={}",
            report.rows.len(),
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::{FolioImportError, FolioImportRow};
    use crate::model::line_code::{LineAddress, LineCodeError};

    fn row(start: Option<&str>, end: Option<&str>) -> FolioImportRow {
        FolioImportRow {
            manuscript: " Urb1 ".to_string(),
            folio: "1r".to_string(),
            line_code_starts: start.map(str::to_string),
            next_start_line: end.map(str::to_string),
        }
    }

    #[test]
    fn sentinel_and_blank_cells_are_open_bounds() {
        let spec = row(Some("01.01.01"), Some("-")).validate().unwrap();
        assert_eq!(spec.manuscript, "Urb1");
        assert_eq!(spec.bounds.start, Some(LineAddress::new(1, 1, 1).unwrap()));
        assert_eq!(spec.bounds.end, None);

        let spec = row(Some("  "), None).validate().unwrap();
        assert!(spec.bounds.is_unbounded());
    }

    #[test]
    fn bounds_must_be_plain_addresses_in_order() {
        assert!(matches!(
            row(Some("01.01.01a"), None).validate(),
            Err(FolioImportError::BoundNotAddress { field: "line_code_starts", .. })
        ));
        assert!(matches!(
            row(Some("01.01.01-01.01.04"), None).validate(),
            Err(FolioImportError::BoundNotAddress { .. })
        ));
        assert!(matches!(
            row(Some("1.1.1"), None).validate(),
            Err(FolioImportError::Address {
                source: LineCodeError::MalformedAddress(_),
                ..
            })
        ));
        assert!(matches!(
            row(Some("01.02.01"), Some("01.01.09")).validate(),
            Err(FolioImportError::Address {
                source: LineCodeError::RangeInverted { .. },
                ..
            })
        ));
    }

    #[test]
    fn blank_identity_fields_are_missing() {
        let mut bad = row(None, None);
        bad.folio = "   ".to_string();
        assert!(matches!(
            bad.validate(),
            Err(FolioImportError::MissingField("folio"))
        ));
    }

    #[test]
    fn rows_deserialize_with_optional_bounds() {
        let rows: Vec<FolioImportRow> = serde_json::from_str(
            r#"[{"manuscript": "Urb1", "folio": "1v", "line_code_starts": "01.01.05"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].next_start_line, None);
        assert_eq!(rows[0].line_code_starts.as_deref(), Some("01.01.05"));
    }
}
