//! Stanza and translation import.
//!
//! # Responsibility
//! - Upsert canonical stanzas keyed by their starting LineCode.
//! - Attach translations to the base stanza found by LineCode.
//!
//! # Invariants
//! - Codes are trimmed, then parsed strictly; malformed rows are rejected.
//! - A translation whose base stanza does not exist is skipped, not orphaned.
//! - Rows commit individually; only store failures abort the batch.

use crate::model::line_code::{LineCode, LineCodeError};
use crate::model::stanza::{
    StanzaId, StanzaInput, TranslationId, DEFAULT_STANZA_LANGUAGE, DEFAULT_TRANSLATION_LANGUAGE,
};
use crate::repo::stanza_repo::StanzaRepository;
use crate::repo::{RepoError, RepoResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanzaImportRow {
    #[serde(default)]
    pub line_code: String,
    #[serde(default, alias = "stanza_text")]
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationImportRow {
    #[serde(default)]
    pub line_code: String,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug)]
pub enum StanzaImportError {
    MissingField(&'static str),
    LineCode(LineCodeError),
    /// No canonical stanza starts at this code.
    UnknownTarget(String),
    Repo(RepoError),
}

impl Display for StanzaImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing field `{field}`"),
            Self::LineCode(err) => write!(f, "{err}"),
            Self::UnknownTarget(code) => write!(f, "no stanza starts at `{code}`"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StanzaImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::LineCode(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::MissingField(_) | Self::UnknownTarget(_) => None,
        }
    }
}

impl From<LineCodeError> for StanzaImportError {
    fn from(value: LineCodeError) -> Self {
        Self::LineCode(value)
    }
}

impl From<RepoError> for StanzaImportError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::LineCode(err),
            other => Self::Repo(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StanzaImportOutcome {
    pub stanza_id: StanzaId,
    pub line_code: LineCode,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationImportOutcome {
    pub translation_id: TranslationId,
    pub stanza_id: StanzaId,
    pub line_code: LineCode,
    pub created: bool,
}

/// Per-row outcomes of one import batch, in input order.
#[derive(Debug)]
pub struct ImportReport<T> {
    pub rows: Vec<Result<T, StanzaImportError>>,
}

impl<T> Default for ImportReport<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T> ImportReport<T> {
    pub fn succeeded(&self) -> usize {
        self.rows.iter().filter(|row| row.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.succeeded()
    }
}

/// Loads stanza and translation rows into the text unit store.
pub struct StanzaImporter<S: StanzaRepository> {
    repo: S,
}

impl<S: StanzaRepository> StanzaImporter<S> {
    pub fn new(repo: S) -> Self {
        Self { repo }
    }

    pub fn import_stanza(
        &self,
        row: &StanzaImportRow,
    ) -> Result<StanzaImportOutcome, StanzaImportError> {
        let line_code = parse_code(&row.line_code)?;
        let input = StanzaInput {
            starts: Some(line_code),
            ends: None,
            text: row.text.clone(),
            language: language_or(row.language.as_deref(), DEFAULT_STANZA_LANGUAGE),
            notes: row
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|notes| !notes.is_empty())
                .map(str::to_string),
        };
        let upsert = self.repo.upsert_stanza(&input)?;
        Ok(StanzaImportOutcome {
            stanza_id: upsert.id(),
            line_code,
            created: upsert.was_created(),
        })
    }

    pub fn import_translation(
        &self,
        row: &TranslationImportRow,
    ) -> Result<TranslationImportOutcome, StanzaImportError> {
        let line_code = parse_code(&row.line_code)?;
        let base = self
            .repo
            .find_stanza_by_code(&line_code)?
            .ok_or_else(|| StanzaImportError::UnknownTarget(line_code.render()))?;
        let language = language_or(row.language.as_deref(), DEFAULT_TRANSLATION_LANGUAGE);
        let upsert = self.repo.upsert_translation(
            base.id,
            Some(line_code),
            &row.translated_text,
            &language,
        )?;
        Ok(TranslationImportOutcome {
            translation_id: upsert.id(),
            stanza_id: base.id,
            line_code,
            created: upsert.was_created(),
        })
    }

    pub fn import_stanzas(
        &self,
        rows: &[StanzaImportRow],
    ) -> RepoResult<ImportReport<StanzaImportOutcome>> {
        let report = run_batch(rows, "stanza", |row| self.import_stanza(row))?;
        info!(
            "event=stanza_import module=stanza_import status=ok rows={} succeeded={} failed={}",
            report.rows.len(),
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    pub fn import_translations(
        &self,
        rows: &[TranslationImportRow],
    ) -> RepoResult<ImportReport<TranslationImportOutcome>> {
        let report = run_batch(rows, "translation", |row| self.import_translation(row))?;
        info!(
            "event=translation_import module=stanza_import status=ok rows={} succeeded={} failed={}",
            report.rows.len(),
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }
}

fn run_batch<R, T>(
    rows: &[R],
    kind: &str,
    mut import: impl FnMut(&R) -> Result<T, StanzaImportError>,
) -> RepoResult<ImportReport<T>> {
    let mut report = ImportReport::default();
    for (index, row) in rows.iter().enumerate() {
        match import(row) {
            Err(StanzaImportError::Repo(RepoError::Db(err))) => {
                return Err(RepoError::Db(err));
            }
            Err(err) => {
                warn!(
                    "event={kind}_import_row module=stanza_import status=skipped row={} error={}",
                    index + 1,
                    err
                );
                report.rows.push(Err(err));
            }
            Ok(outcome) => report.rows.push(Ok(outcome)),
        }
    }
    Ok(report)
}

fn parse_code(raw: &str) -> Result<LineCode, StanzaImportError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StanzaImportError::MissingField("line_code"));
    }
    Ok(LineCode::parse(trimmed)?)
}

fn language_or(raw: Option<&str>, default: &str) -> String {
    raw.map(str::trim)
        .filter(|language| !language.is_empty())
        .unwrap_or(default)
        .to_string()
}
