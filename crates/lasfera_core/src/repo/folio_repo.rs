//! Manuscript/folio repository and derived folio membership links.
//!
//! # Responsibility
//! - Persist manuscripts and folios with their address bounds.
//! - Own the folio↔stanza link table, replaced wholesale per folio.
//!
//! # Invariants
//! - Folios are unique per `(manuscript, label)`.
//! - Stored bounds are plain addresses with `start <= end`.
//! - `replace_membership` and `store_folio` are atomic: readers see the old
//!   or the new state, never a folio with half-written links.

use super::{parse_stored_code, RepoError, RepoResult, Upsert};
use crate::db::{ensure_schema, TableSpec};
use crate::model::folio::{Folio, FolioId, Manuscript};
use crate::model::line_code::{AddressBounds, LineAddress};
use crate::model::stanza::StanzaId;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const FOLIO_SELECT_SQL: &str = "SELECT
    folios.id AS id,
    folios.manuscript_siglum AS manuscript_siglum,
    folios.label AS label,
    folios.range_start AS range_start,
    folios.range_end AS range_end
FROM folios";

const REQUIRED_TABLES: &[TableSpec] = &[
    ("manuscripts", &["siglum", "name"]),
    (
        "folios",
        &["id", "manuscript_siglum", "label", "range_start", "range_end"],
    ),
    ("folio_stanzas", &["folio_id", "stanza_id"]),
];

/// Repository interface for manuscripts, folios and membership links.
pub trait FolioRepository {
    /// Inserts a manuscript, or updates its name when the siglum exists.
    fn upsert_manuscript(&self, manuscript: &Manuscript) -> RepoResult<Upsert<String>>;
    fn get_manuscript(&self, siglum: &str) -> RepoResult<Option<Manuscript>>;
    fn list_manuscripts(&self) -> RepoResult<Vec<Manuscript>>;

    /// Inserts or updates the folio keyed by `(manuscript, label)` and sets its bounds.
    fn upsert_folio(
        &self,
        manuscript: &str,
        label: &str,
        bounds: &AddressBounds,
    ) -> RepoResult<Upsert<FolioId>>;
    /// Upserts the folio and replaces its membership in one transaction.
    fn store_folio(
        &self,
        manuscript: &str,
        label: &str,
        bounds: &AddressBounds,
        stanza_ids: &[StanzaId],
    ) -> RepoResult<Upsert<FolioId>>;
    fn get_folio(&self, id: FolioId) -> RepoResult<Option<Folio>>;
    fn find_folio(&self, manuscript: &str, label: &str) -> RepoResult<Option<Folio>>;
    /// All folios ordered by manuscript siglum, then id.
    fn list_folios(&self) -> RepoResult<Vec<Folio>>;

    /// Replaces the whole membership set of one folio.
    fn replace_membership(&self, folio_id: FolioId, stanza_ids: &[StanzaId]) -> RepoResult<()>;
    /// Member stanza ids as stored (unordered set semantics; sorted by id).
    fn list_membership(&self, folio_id: FolioId) -> RepoResult<Vec<StanzaId>>;
    /// Folios that currently list `stanza_id` as a member.
    fn list_folios_for_stanza(&self, stanza_id: StanzaId) -> RepoResult<Vec<Folio>>;
}

/// SQLite-backed folio repository.
pub struct SqliteFolioRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFolioRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }

    fn query_folios(&self, sql: &str, bind: &[&dyn rusqlite::ToSql]) -> RepoResult<Vec<Folio>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(bind)?;
        let mut folios = Vec::new();
        while let Some(row) = rows.next()? {
            folios.push(parse_folio_row(row)?);
        }
        Ok(folios)
    }
}

impl FolioRepository for SqliteFolioRepository<'_> {
    fn upsert_manuscript(&self, manuscript: &Manuscript) -> RepoResult<Upsert<String>> {
        let siglum = manuscript.siglum.trim();
        if siglum.is_empty() {
            return Err(RepoError::InvalidData(
                "manuscript siglum must not be blank".to_string(),
            ));
        }

        let existed = self.get_manuscript(siglum)?.is_some();
        self.conn.execute(
            "INSERT INTO manuscripts (siglum, name)
             VALUES (?1, ?2)
             ON CONFLICT(siglum) DO UPDATE SET name = COALESCE(excluded.name, manuscripts.name);",
            params![siglum, manuscript.name.as_deref()],
        )?;

        let siglum = siglum.to_string();
        Ok(if existed {
            Upsert::Updated(siglum)
        } else {
            Upsert::Created(siglum)
        })
    }

    fn get_manuscript(&self, siglum: &str) -> RepoResult<Option<Manuscript>> {
        let manuscript = self
            .conn
            .query_row(
                "SELECT siglum, name FROM manuscripts WHERE siglum = ?1;",
                [siglum],
                |row| {
                    Ok(Manuscript {
                        siglum: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(manuscript)
    }

    fn list_manuscripts(&self) -> RepoResult<Vec<Manuscript>> {
        let mut stmt = self
            .conn
            .prepare("SELECT siglum, name FROM manuscripts ORDER BY siglum ASC;")?;
        let mut rows = stmt.query([])?;
        let mut manuscripts = Vec::new();
        while let Some(row) = rows.next()? {
            manuscripts.push(Manuscript {
                siglum: row.get(0)?,
                name: row.get(1)?,
            });
        }
        Ok(manuscripts)
    }

    fn upsert_folio(
        &self,
        manuscript: &str,
        label: &str,
        bounds: &AddressBounds,
    ) -> RepoResult<Upsert<FolioId>> {
        write_folio(self.conn, manuscript, label, bounds)
    }

    fn store_folio(
        &self,
        manuscript: &str,
        label: &str,
        bounds: &AddressBounds,
        stanza_ids: &[StanzaId],
    ) -> RepoResult<Upsert<FolioId>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let upsert = write_folio(&tx, manuscript, label, bounds)?;
        write_membership(&tx, upsert.id(), stanza_ids)?;
        tx.commit()?;
        Ok(upsert)
    }

    fn get_folio(&self, id: FolioId) -> RepoResult<Option<Folio>> {
        let mut folios = self.query_folios(
            &format!("{FOLIO_SELECT_SQL} WHERE folios.id = ?1;"),
            &[&id],
        )?;
        Ok(folios.pop())
    }

    fn find_folio(&self, manuscript: &str, label: &str) -> RepoResult<Option<Folio>> {
        let mut folios = self.query_folios(
            &format!(
                "{FOLIO_SELECT_SQL}
                 WHERE folios.manuscript_siglum = ?1
                   AND folios.label = ?2;"
            ),
            &[&manuscript, &label],
        )?;
        Ok(folios.pop())
    }

    fn list_folios(&self) -> RepoResult<Vec<Folio>> {
        self.query_folios(
            &format!("{FOLIO_SELECT_SQL} ORDER BY folios.manuscript_siglum ASC, folios.id ASC;"),
            &[],
        )
    }

    fn replace_membership(&self, folio_id: FolioId, stanza_ids: &[StanzaId]) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let exists: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM folios WHERE id = ?1);",
            [folio_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepoError::not_found("folio", folio_id));
        }

        write_membership(&tx, folio_id, stanza_ids)?;
        tx.commit()?;
        Ok(())
    }

    fn list_membership(&self, folio_id: FolioId) -> RepoResult<Vec<StanzaId>> {
        let mut stmt = self.conn.prepare(
            "SELECT stanza_id
             FROM folio_stanzas
             WHERE folio_id = ?1
             ORDER BY stanza_id ASC;",
        )?;
        let mut rows = stmt.query([folio_id])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    fn list_folios_for_stanza(&self, stanza_id: StanzaId) -> RepoResult<Vec<Folio>> {
        self.query_folios(
            &format!(
                "{FOLIO_SELECT_SQL}
                 JOIN folio_stanzas ON folio_stanzas.folio_id = folios.id
                 WHERE folio_stanzas.stanza_id = ?1
                 ORDER BY folios.manuscript_siglum ASC, folios.id ASC;"
            ),
            &[&stanza_id],
        )
    }
}

fn write_folio(
    conn: &Connection,
    manuscript: &str,
    label: &str,
    bounds: &AddressBounds,
) -> RepoResult<Upsert<FolioId>> {
    // Re-validate: `AddressBounds` fields are public.
    let bounds = AddressBounds::new(bounds.start, bounds.end)?;
    let range_start = bounds.start.map(|address| address.to_string());
    let range_end = bounds.end.map(|address| address.to_string());

    let existing: Option<FolioId> = conn
        .query_row(
            "SELECT id FROM folios WHERE manuscript_siglum = ?1 AND label = ?2;",
            params![manuscript, label],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE folios
                 SET
                    range_start = ?2,
                    range_end = ?3,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![id, range_start, range_end],
            )?;
            Ok(Upsert::Updated(id))
        }
        None => {
            conn.execute(
                "INSERT INTO folios (
                    manuscript_siglum,
                    label,
                    range_start,
                    range_end
                ) VALUES (?1, ?2, ?3, ?4);",
                params![manuscript, label, range_start, range_end],
            )?;
            Ok(Upsert::Created(conn.last_insert_rowid()))
        }
    }
}

fn write_membership(
    conn: &Connection,
    folio_id: FolioId,
    stanza_ids: &[StanzaId],
) -> RepoResult<()> {
    conn.execute("DELETE FROM folio_stanzas WHERE folio_id = ?1;", [folio_id])?;
    let mut insert = conn
        .prepare("INSERT OR IGNORE INTO folio_stanzas (folio_id, stanza_id) VALUES (?1, ?2);")?;
    for stanza_id in stanza_ids {
        insert.execute(params![folio_id, stanza_id])?;
    }
    Ok(())
}

fn parse_folio_row(row: &Row<'_>) -> RepoResult<Folio> {
    let id: FolioId = row.get("id")?;
    let range_start = parse_bound(row.get("range_start")?, "folios.range_start")?;
    let range_end = parse_bound(row.get("range_end")?, "folios.range_end")?;
    AddressBounds::new(range_start, range_end)
        .map_err(|err| RepoError::InvalidData(format!("folio {id} has invalid range: {err}")))?;

    Ok(Folio {
        id,
        manuscript: row.get("manuscript_siglum")?,
        label: row.get("label")?,
        range_start,
        range_end,
    })
}

fn parse_bound(raw: Option<String>, column: &str) -> RepoResult<Option<LineAddress>> {
    let code = parse_stored_code(raw, column)?;
    match code {
        Some(code) if code.is_range() || code.variant().is_some() => Err(RepoError::InvalidData(
            format!("folio bound `{code}` in {column} is not a plain address"),
        )),
        Some(code) => Ok(Some(code.start())),
        None => Ok(None),
    }
}
