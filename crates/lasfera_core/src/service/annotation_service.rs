//! Annotation creation contract.
//!
//! # Responsibility
//! - Validate create requests coming from the annotation endpoint.
//! - Persist accepted annotations against an existing text-bearing record.
//!
//! # Invariants
//! - Missing or blank required fields are client errors, reported by name.
//! - An annotation is never stored against a target that does not exist.

use crate::model::annotation::{
    AnnotationId, AnnotationKind, AnnotationTarget, TargetKind, TextAnnotation,
};
use crate::repo::annotation_repo::AnnotationRepository;
use crate::repo::stanza_repo::StanzaRepository;
use crate::repo::{RepoError, RepoResult};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Create request as posted by the editor front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateAnnotationRequest {
    /// Defaults to `stanza` when absent.
    #[serde(default)]
    pub target_kind: Option<String>,
    #[serde(default)]
    pub target_id: Option<i64>,
    #[serde(default)]
    pub selected_text: Option<String>,
    #[serde(default)]
    pub annotation_body: Option<String>,
    #[serde(default)]
    pub annotation_kind: Option<String>,
    #[serde(default)]
    pub from_pos: Option<Value>,
    #[serde(default)]
    pub to_pos: Option<Value>,
}

#[derive(Debug)]
pub enum AnnotationServiceError {
    MissingField(&'static str),
    InvalidKind(String),
    InvalidTargetKind(String),
    UnknownTarget(AnnotationTarget),
    Repo(RepoError),
}

impl Display for AnnotationServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field `{field}`"),
            Self::InvalidKind(kind) => write!(
                f,
                "invalid annotation kind `{kind}`; expected note|variant|reference"
            ),
            Self::InvalidTargetKind(kind) => write!(
                f,
                "invalid target kind `{kind}`; expected stanza|translated_stanza"
            ),
            Self::UnknownTarget(target) => write!(f, "target does not exist: {target}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AnnotationServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AnnotationServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl AnnotationServiceError {
    /// True for errors caused by the request rather than the store.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Repo(_))
    }
}

impl CreateAnnotationRequest {
    /// Checks required fields and enums, producing an unsaved annotation.
    pub fn into_annotation(self) -> Result<TextAnnotation, AnnotationServiceError> {
        let target_kind = match self.target_kind.as_deref().map(str::trim) {
            None | Some("") => TargetKind::default(),
            Some(raw) => TargetKind::parse(raw)
                .ok_or_else(|| AnnotationServiceError::InvalidTargetKind(raw.to_string()))?,
        };
        let target_id = self
            .target_id
            .ok_or(AnnotationServiceError::MissingField("target_id"))?;
        let selected_text = non_blank(self.selected_text, "selected_text")?;
        let body = non_blank(self.annotation_body, "annotation_body")?;
        let kind_text = non_blank(self.annotation_kind, "annotation_kind")?;
        let kind = AnnotationKind::parse(kind_text.trim())
            .ok_or(AnnotationServiceError::InvalidKind(kind_text))?;

        let mut annotation = TextAnnotation::new(
            AnnotationTarget::from_parts(target_kind, target_id),
            selected_text,
            body,
            kind,
        );
        annotation.from_pos = self.from_pos;
        annotation.to_pos = self.to_pos;
        Ok(annotation)
    }
}

fn non_blank(value: Option<String>, field: &'static str) -> Result<String, AnnotationServiceError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(AnnotationServiceError::MissingField(field)),
    }
}

/// Annotation use cases over the text unit store and annotation store.
pub struct AnnotationService<S: StanzaRepository, A: AnnotationRepository> {
    stanzas: S,
    annotations: A,
}

impl<S: StanzaRepository, A: AnnotationRepository> AnnotationService<S, A> {
    pub fn new(stanzas: S, annotations: A) -> Self {
        Self {
            stanzas,
            annotations,
        }
    }

    /// Validates and persists a create request.
    pub fn create(
        &self,
        request: CreateAnnotationRequest,
    ) -> Result<TextAnnotation, AnnotationServiceError> {
        let annotation = request.into_annotation()?;
        if !self.target_exists(annotation.target)? {
            return Err(AnnotationServiceError::UnknownTarget(annotation.target));
        }
        self.annotations.create_annotation(&annotation)?;
        info!(
            "event=annotation_create module=annotation_service status=ok annotation_id={} target={}",
            annotation.id, annotation.target
        );
        Ok(annotation)
    }

    pub fn get(&self, id: AnnotationId) -> RepoResult<Option<TextAnnotation>> {
        self.annotations.get_annotation(id)
    }

    pub fn list_for_target(&self, target: AnnotationTarget) -> RepoResult<Vec<TextAnnotation>> {
        self.annotations.list_annotations_for_target(target)
    }

    fn target_exists(&self, target: AnnotationTarget) -> RepoResult<bool> {
        Ok(match target {
            AnnotationTarget::Stanza(id) => self.stanzas.get_stanza(id)?.is_some(),
            AnnotationTarget::TranslatedStanza(id) => self.stanzas.get_translation(id)?.is_some(),
        })
    }
}
