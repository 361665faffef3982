//! Text annotation model.
//!
//! # Responsibility
//! - Define annotations anchored to a text-bearing record by character offsets.
//! - Interpret the loosely-typed stored positions.
//!
//! # Invariants
//! - `id` is stable across re-targeting; repair never recreates an annotation.
//! - `selected_text` is the durable anchor; offsets are hints that may be stale.
//! - `target` is one of the two text-bearing record kinds, never a free pair.

use crate::model::stanza::{StanzaId, TranslationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable annotation identifier.
pub type AnnotationId = Uuid;

/// Record an annotation currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AnnotationTarget {
    Stanza(StanzaId),
    TranslatedStanza(TranslationId),
}

impl AnnotationTarget {
    /// Stored `target_kind` tag.
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Stanza(_) => TargetKind::Stanza,
            Self::TranslatedStanza(_) => TargetKind::TranslatedStanza,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Stanza(id) | Self::TranslatedStanza(id) => *id,
        }
    }

    /// Rebuilds a target from its stored `(kind, id)` columns.
    pub fn from_parts(kind: TargetKind, id: i64) -> Self {
        match kind {
            TargetKind::Stanza => Self::Stanza(id),
            TargetKind::TranslatedStanza => Self::TranslatedStanza(id),
        }
    }
}

impl Display for AnnotationTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind().as_str(), self.id())
    }
}

/// Discriminant of [`AnnotationTarget`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    #[default]
    Stanza,
    TranslatedStanza,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stanza => "stanza",
            Self::TranslatedStanza => "translated_stanza",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stanza" => Some(Self::Stanza),
            "translated_stanza" => Some(Self::TranslatedStanza),
            _ => None,
        }
    }
}

/// Editorial category of an annotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Editorial note.
    #[default]
    Note,
    /// Textual variant.
    Variant,
    /// Cross reference.
    Reference,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Variant => "variant",
            Self::Reference => "reference",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "note" => Some(Self::Note),
            "variant" => Some(Self::Variant),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }
}

/// Stored position that is not a usable integer offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsablePosition(pub String);

impl Display for UnparsablePosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unparsable position value: {}", self.0)
    }
}

impl Error for UnparsablePosition {}

/// Annotation anchored to a text selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub id: AnnotationId,
    pub target: AnnotationTarget,
    /// Exact substring highlighted when the annotation was made.
    pub selected_text: String,
    /// Last known start offset, raw as stored (may be an object from older editors).
    pub from_pos: Option<Value>,
    /// Last known end offset, raw as stored.
    pub to_pos: Option<Value>,
    pub body: String,
    pub kind: AnnotationKind,
}

impl TextAnnotation {
    /// Creates an annotation with a fresh stable ID.
    pub fn new(
        target: AnnotationTarget,
        selected_text: impl Into<String>,
        body: impl Into<String>,
        kind: AnnotationKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            selected_text: selected_text.into(),
            from_pos: None,
            to_pos: None,
            body: body.into(),
            kind,
        }
    }

    /// Builder-style offset setter.
    pub fn with_offsets(mut self, from_pos: i64, to_pos: i64) -> Self {
        self.from_pos = Some(Value::from(from_pos));
        self.to_pos = Some(Value::from(to_pos));
        self
    }

    /// Interprets `from_pos` as a character offset.
    ///
    /// Returns `Ok(None)` when no position is stored.
    pub fn start_offset(&self) -> Result<Option<i64>, UnparsablePosition> {
        self.from_pos.as_ref().map(parse_offset).transpose()
    }

    /// True when the stored anchor already equals `(target, start, end)`.
    pub fn is_anchored_at(&self, target: AnnotationTarget, start: i64, end: i64) -> bool {
        self.target == target
            && self.from_pos.as_ref().and_then(Value::as_i64) == Some(start)
            && self.to_pos.as_ref().and_then(Value::as_i64) == Some(end)
    }
}

/// Accepts a JSON integer or a string holding one; rejects everything else.
pub fn parse_offset(value: &Value) -> Result<i64, UnparsablePosition> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| UnparsablePosition(value.to_string())),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| UnparsablePosition(value.to_string())),
        _ => Err(UnparsablePosition(value.to_string())),
    }
}
