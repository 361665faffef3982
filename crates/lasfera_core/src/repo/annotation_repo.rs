//! Text annotation repository.
//!
//! # Responsibility
//! - Persist annotations with their polymorphic target and raw positions.
//! - Provide the single-row anchor update used by reconciliation.
//!
//! # Invariants
//! - Listing order is deterministic: `created_at ASC, uuid ASC`.
//! - Positions are stored as JSON text. A stored value that is not valid JSON
//!   (legacy rows) is read back as a JSON string so callers can classify it.
//! - Anchor updates touch exactly one row and never change `selected_text`.

use super::{RepoError, RepoResult};
use crate::db::{ensure_schema, TableSpec};
use crate::model::annotation::{
    AnnotationId, AnnotationKind, AnnotationTarget, TargetKind, TextAnnotation,
};
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use uuid::Uuid;

const ANNOTATION_SELECT_SQL: &str = "SELECT
    uuid,
    target_kind,
    target_id,
    selected_text,
    from_pos,
    to_pos,
    body,
    kind
FROM text_annotations";

const REQUIRED_TABLES: &[TableSpec] = &[(
    "text_annotations",
    &[
        "uuid",
        "target_kind",
        "target_id",
        "selected_text",
        "from_pos",
        "to_pos",
        "body",
        "kind",
        "created_at",
        "updated_at",
    ],
)];

/// Repository interface for annotations.
pub trait AnnotationRepository {
    fn create_annotation(&self, annotation: &TextAnnotation) -> RepoResult<AnnotationId>;
    fn get_annotation(&self, id: AnnotationId) -> RepoResult<Option<TextAnnotation>>;
    fn list_annotations(&self) -> RepoResult<Vec<TextAnnotation>>;
    fn list_annotations_for_target(
        &self,
        target: AnnotationTarget,
    ) -> RepoResult<Vec<TextAnnotation>>;
    /// Re-targets one annotation and overwrites its offsets.
    fn update_anchor(
        &self,
        id: AnnotationId,
        target: AnnotationTarget,
        from_pos: i64,
        to_pos: i64,
    ) -> RepoResult<()>;
}

/// SQLite-backed annotation repository.
pub struct SqliteAnnotationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAnnotationRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl AnnotationRepository for SqliteAnnotationRepository<'_> {
    fn create_annotation(&self, annotation: &TextAnnotation) -> RepoResult<AnnotationId> {
        self.conn.execute(
            "INSERT INTO text_annotations (
                uuid,
                target_kind,
                target_id,
                selected_text,
                from_pos,
                to_pos,
                body,
                kind
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                annotation.id.to_string(),
                annotation.target.kind().as_str(),
                annotation.target.id(),
                annotation.selected_text.as_str(),
                annotation.from_pos.as_ref().map(Value::to_string),
                annotation.to_pos.as_ref().map(Value::to_string),
                annotation.body.as_str(),
                annotation.kind.as_str(),
            ],
        )?;
        Ok(annotation.id)
    }

    fn get_annotation(&self, id: AnnotationId) -> RepoResult<Option<TextAnnotation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ANNOTATION_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_annotation_row(row)?));
        }
        Ok(None)
    }

    fn list_annotations(&self) -> RepoResult<Vec<TextAnnotation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ANNOTATION_SELECT_SQL} ORDER BY created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut annotations = Vec::new();
        while let Some(row) = rows.next()? {
            annotations.push(parse_annotation_row(row)?);
        }
        Ok(annotations)
    }

    fn list_annotations_for_target(
        &self,
        target: AnnotationTarget,
    ) -> RepoResult<Vec<TextAnnotation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ANNOTATION_SELECT_SQL}
             WHERE target_kind = ?1
               AND target_id = ?2
             ORDER BY created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query(params![target.kind().as_str(), target.id()])?;
        let mut annotations = Vec::new();
        while let Some(row) = rows.next()? {
            annotations.push(parse_annotation_row(row)?);
        }
        Ok(annotations)
    }

    fn update_anchor(
        &self,
        id: AnnotationId,
        target: AnnotationTarget,
        from_pos: i64,
        to_pos: i64,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE text_annotations
             SET
                target_kind = ?2,
                target_id = ?3,
                from_pos = ?4,
                to_pos = ?5,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                id.to_string(),
                target.kind().as_str(),
                target.id(),
                from_pos.to_string(),
                to_pos.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("annotation", id));
        }
        Ok(())
    }
}

fn parse_annotation_row(row: &Row<'_>) -> RepoResult<TextAnnotation> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in text_annotations.uuid"
        ))
    })?;

    let kind_text: String = row.get("target_kind")?;
    let target_kind = TargetKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid target kind `{kind_text}` in text_annotations.target_kind"
        ))
    })?;

    let annotation_kind_text: String = row.get("kind")?;
    let kind = AnnotationKind::parse(&annotation_kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid annotation kind `{annotation_kind_text}` in text_annotations.kind"
        ))
    })?;

    Ok(TextAnnotation {
        id,
        target: AnnotationTarget::from_parts(target_kind, row.get("target_id")?),
        selected_text: row.get("selected_text")?,
        from_pos: parse_position(row.get("from_pos")?),
        to_pos: parse_position(row.get("to_pos")?),
        body: row.get("body")?,
        kind,
    })
}

fn parse_position(raw: Option<String>) -> Option<Value> {
    raw.map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text)))
}
