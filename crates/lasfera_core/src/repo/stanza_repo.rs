//! Stanza and translated stanza repository (the text unit store).
//!
//! # Responsibility
//! - Persist canonical stanzas and their translations.
//! - Serve address-ordered listings, prefix and range filters.
//!
//! # Invariants
//! - Listings are in reading order (`LineCode` position, base before
//!   variants, then id); unaddressed rows come last.
//! - `starts`/`ends` pairs are validated on every write.
//! - Upserts are keyed by canonical LineCode text, never by ordinal position.
//! - `*_lenient` listings never fail on an unparsable stored code; every
//!   other read rejects it.

use super::{read_stored_code, RepoError, RepoResult, StoredCodes, Upsert};
use crate::db::{ensure_schema, TableSpec};
use crate::model::line_code::{AddressBounds, BoundaryPolicy, LineCode};
use crate::model::stanza::{
    sort_by_address, validate_address_pair, Stanza, StanzaId, StanzaInput, TranslatedStanza,
    TranslationId,
};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Row};

const STANZA_SELECT_SQL: &str = "SELECT
    id,
    line_code_starts,
    line_code_ends,
    text,
    language,
    notes
FROM stanzas";

const TRANSLATION_SELECT_SQL: &str = "SELECT
    id,
    stanza_id,
    line_code_starts,
    text,
    language
FROM translated_stanzas";

const REQUIRED_TABLES: &[TableSpec] = &[
    (
        "stanzas",
        &["id", "line_code_starts", "line_code_ends", "text", "language", "notes"],
    ),
    (
        "translated_stanzas",
        &["id", "stanza_id", "line_code_starts", "text", "language"],
    ),
];

/// Text unit store contract.
pub trait StanzaRepository {
    fn create_stanza(&self, input: &StanzaInput) -> RepoResult<StanzaId>;
    /// Inserts or updates the stanza whose `starts` equals `input.starts`.
    fn upsert_stanza(&self, input: &StanzaInput) -> RepoResult<Upsert<StanzaId>>;
    fn get_stanza(&self, id: StanzaId) -> RepoResult<Option<Stanza>>;
    /// First stanza (lowest id) starting exactly at `code`.
    fn find_stanza_by_code(&self, code: &LineCode) -> RepoResult<Option<Stanza>>;
    /// All stanzas in reading order.
    fn list_stanzas(&self) -> RepoResult<Vec<Stanza>>;
    /// All stanzas for text-only passes. A stored address that does not
    /// parse is logged and read as absent instead of failing the listing.
    fn list_stanzas_lenient(&self) -> RepoResult<Vec<Stanza>>;
    /// Stanzas in `book` (and optionally `stanza`) in reading order.
    fn list_stanzas_by_prefix(&self, book: u8, stanza: Option<u8>) -> RepoResult<Vec<Stanza>>;
    /// Addressed stanzas whose start falls inside `bounds`, in reading order.
    fn list_stanzas_in_bounds(
        &self,
        bounds: &AddressBounds,
        policy: BoundaryPolicy,
    ) -> RepoResult<Vec<Stanza>>;
    fn update_stanza_text(&self, id: StanzaId, text: &str) -> RepoResult<()>;
    fn update_stanza_address(
        &self,
        id: StanzaId,
        starts: Option<LineCode>,
        ends: Option<LineCode>,
    ) -> RepoResult<()>;

    /// Inserts or updates the `(stanza_id, language)` translation.
    fn upsert_translation(
        &self,
        stanza_id: StanzaId,
        starts: Option<LineCode>,
        text: &str,
        language: &str,
    ) -> RepoResult<Upsert<TranslationId>>;
    fn get_translation(&self, id: TranslationId) -> RepoResult<Option<TranslatedStanza>>;
    /// All translations in reading order.
    fn list_translations(&self) -> RepoResult<Vec<TranslatedStanza>>;
    /// Translations with the same tolerance as [`Self::list_stanzas_lenient`].
    fn list_translations_lenient(&self) -> RepoResult<Vec<TranslatedStanza>>;
    fn update_translation_text(&self, id: TranslationId, text: &str) -> RepoResult<()>;
}

/// SQLite-backed text unit store.
pub struct SqliteStanzaRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStanzaRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }

    fn query_stanzas(&self, sql: &str, bind: &[&dyn rusqlite::ToSql]) -> RepoResult<Vec<Stanza>> {
        self.query_stanzas_with(sql, bind, StoredCodes::Strict)
    }

    fn query_stanzas_with(
        &self,
        sql: &str,
        bind: &[&dyn rusqlite::ToSql],
        codes: StoredCodes,
    ) -> RepoResult<Vec<Stanza>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(bind)?;
        let mut stanzas = Vec::new();
        while let Some(row) = rows.next()? {
            stanzas.push(parse_stanza_row(row, codes)?);
        }
        sort_by_address(&mut stanzas);
        Ok(stanzas)
    }

    fn query_translations(&self, codes: StoredCodes) -> RepoResult<Vec<TranslatedStanza>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TRANSLATION_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut translations = Vec::new();
        while let Some(row) = rows.next()? {
            translations.push(parse_translation_row(row, codes)?);
        }
        translations.sort_by(|a, b| {
            let key_a = a.starts.map(|code| code.sort_key());
            let key_b = b.starts.map(|code| code.sort_key());
            // `None` sorts first for Option; flip so unaddressed rows go last.
            key_a
                .is_none()
                .cmp(&key_b.is_none())
                .then(key_a.cmp(&key_b))
                .then(a.id.cmp(&b.id))
        });
        Ok(translations)
    }
}

impl StanzaRepository for SqliteStanzaRepository<'_> {
    fn create_stanza(&self, input: &StanzaInput) -> RepoResult<StanzaId> {
        input.validate()?;

        self.conn.execute(
            "INSERT INTO stanzas (
                line_code_starts,
                line_code_ends,
                text,
                language,
                notes
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                input.starts.map(|code| code.render()),
                input.ends.map(|code| code.render()),
                input.text.as_str(),
                input.language.as_str(),
                input.notes.as_deref(),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn upsert_stanza(&self, input: &StanzaInput) -> RepoResult<Upsert<StanzaId>> {
        input.validate()?;
        let Some(starts) = input.starts else {
            return Err(RepoError::InvalidData(
                "stanza upsert requires a starting line code".to_string(),
            ));
        };

        match self.find_stanza_by_code(&starts)? {
            Some(existing) => {
                self.conn.execute(
                    "UPDATE stanzas
                     SET
                        line_code_ends = ?2,
                        text = ?3,
                        language = ?4,
                        notes = COALESCE(?5, notes),
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE id = ?1;",
                    params![
                        existing.id,
                        input.ends.or(existing.ends).map(|code| code.render()),
                        input.text.as_str(),
                        input.language.as_str(),
                        input.notes.as_deref(),
                    ],
                )?;
                Ok(Upsert::Updated(existing.id))
            }
            None => self.create_stanza(input).map(Upsert::Created),
        }
    }

    fn get_stanza(&self, id: StanzaId) -> RepoResult<Option<Stanza>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{STANZA_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_stanza_row(row, StoredCodes::Strict)?));
        }
        Ok(None)
    }

    fn find_stanza_by_code(&self, code: &LineCode) -> RepoResult<Option<Stanza>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STANZA_SELECT_SQL}
             WHERE line_code_starts = ?1
             ORDER BY id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([code.render()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_stanza_row(row, StoredCodes::Strict)?));
        }
        Ok(None)
    }

    fn list_stanzas(&self) -> RepoResult<Vec<Stanza>> {
        self.query_stanzas(&format!("{STANZA_SELECT_SQL};"), &[])
    }

    fn list_stanzas_lenient(&self) -> RepoResult<Vec<Stanza>> {
        self.query_stanzas_with(
            &format!("{STANZA_SELECT_SQL};"),
            &[],
            StoredCodes::Lenient,
        )
    }

    fn list_stanzas_by_prefix(&self, book: u8, stanza: Option<u8>) -> RepoResult<Vec<Stanza>> {
        // Canonical codes are zero-padded, so a textual prefix is exact.
        let prefix = match stanza {
            Some(stanza) => format!("{book:02}.{stanza:02}.%"),
            None => format!("{book:02}.%"),
        };
        self.query_stanzas(
            &format!("{STANZA_SELECT_SQL} WHERE line_code_starts LIKE ?1;"),
            &[&prefix],
        )
    }

    fn list_stanzas_in_bounds(
        &self,
        bounds: &AddressBounds,
        policy: BoundaryPolicy,
    ) -> RepoResult<Vec<Stanza>> {
        let stanzas = self.query_stanzas(
            &format!("{STANZA_SELECT_SQL} WHERE line_code_starts IS NOT NULL;"),
            &[],
        )?;
        Ok(stanzas
            .into_iter()
            .filter(|stanza| {
                stanza
                    .starts
                    .is_some_and(|code| bounds.contains(code.start(), policy))
            })
            .collect())
    }

    fn update_stanza_text(&self, id: StanzaId, text: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE stanzas
             SET
                text = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, text],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("stanza", id));
        }
        Ok(())
    }

    fn update_stanza_address(
        &self,
        id: StanzaId,
        starts: Option<LineCode>,
        ends: Option<LineCode>,
    ) -> RepoResult<()> {
        validate_address_pair(starts, ends)?;

        let changed = self.conn.execute(
            "UPDATE stanzas
             SET
                line_code_starts = ?2,
                line_code_ends = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id,
                starts.map(|code| code.render()),
                ends.map(|code| code.render()),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("stanza", id));
        }
        Ok(())
    }

    fn upsert_translation(
        &self,
        stanza_id: StanzaId,
        starts: Option<LineCode>,
        text: &str,
        language: &str,
    ) -> RepoResult<Upsert<TranslationId>> {
        let existing: Option<TranslationId> = self
            .conn
            .query_row(
                "SELECT id
                 FROM translated_stanzas
                 WHERE stanza_id = ?1
                   AND language = ?2;",
                params![stanza_id, language],
                |row| row.get(0),
            )
            .optional()?;

        let starts = starts.map(|code| code.render());
        match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE translated_stanzas
                     SET
                        line_code_starts = ?2,
                        text = ?3,
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE id = ?1;",
                    params![id, starts, text],
                )?;
                Ok(Upsert::Updated(id))
            }
            None => {
                self.conn.execute(
                    "INSERT INTO translated_stanzas (
                        stanza_id,
                        line_code_starts,
                        text,
                        language
                    ) VALUES (?1, ?2, ?3, ?4);",
                    params![stanza_id, starts, text, language],
                )?;
                Ok(Upsert::Created(self.conn.last_insert_rowid()))
            }
        }
    }

    fn get_translation(&self, id: TranslationId) -> RepoResult<Option<TranslatedStanza>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TRANSLATION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_translation_row(row, StoredCodes::Strict)?));
        }
        Ok(None)
    }

    fn list_translations(&self) -> RepoResult<Vec<TranslatedStanza>> {
        self.query_translations(StoredCodes::Strict)
    }

    fn list_translations_lenient(&self) -> RepoResult<Vec<TranslatedStanza>> {
        self.query_translations(StoredCodes::Lenient)
    }

    fn update_translation_text(&self, id: TranslationId, text: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE translated_stanzas
             SET
                text = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, text],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("translated stanza", id));
        }
        Ok(())
    }
}

fn parse_stanza_row(row: &Row<'_>, codes: StoredCodes) -> RepoResult<Stanza> {
    let id: StanzaId = row.get("id")?;
    let mut stanza = Stanza {
        id,
        starts: read_stored_code(
            row.get("line_code_starts")?,
            "stanzas.line_code_starts",
            id,
            codes,
        )?,
        ends: read_stored_code(
            row.get("line_code_ends")?,
            "stanzas.line_code_ends",
            id,
            codes,
        )?,
        text: row.get("text")?,
        language: row.get("language")?,
        notes: row.get("notes")?,
    };
    if let Err(err) = validate_address_pair(stanza.starts, stanza.ends) {
        match codes {
            StoredCodes::Strict => {
                return Err(RepoError::InvalidData(format!(
                    "stanza {} has invalid address pair: {err}",
                    stanza.id
                )))
            }
            StoredCodes::Lenient => {
                warn!(
                    "event=stored_code_ignored module=repo column=stanzas.line_code_ends row_id={} error={}",
                    stanza.id, err
                );
                stanza.ends = None;
            }
        }
    }
    Ok(stanza)
}

fn parse_translation_row(row: &Row<'_>, codes: StoredCodes) -> RepoResult<TranslatedStanza> {
    let id: TranslationId = row.get("id")?;
    Ok(TranslatedStanza {
        id,
        stanza_id: row.get("stanza_id")?,
        starts: read_stored_code(
            row.get("line_code_starts")?,
            "translated_stanzas.line_code_starts",
            id,
            codes,
        )?,
        text: row.get("text")?,
        language: row.get("language")?,
    })
}
