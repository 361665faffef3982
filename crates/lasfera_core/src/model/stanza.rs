//! Stanza (text unit) and translated stanza records.
//!
//! # Responsibility
//! - Define the canonical text-bearing records addressed by LineCodes.
//! - Validate address pairs before they reach storage.
//!
//! # Invariants
//! - `ends` never sorts before `starts` when both are set.
//! - A stanza without `starts` has no address and never joins a folio.
//! - Stanzas are never deleted by core code.

use crate::model::line_code::{LineCode, LineCodeError};
use serde::{Deserialize, Serialize};

/// Storage identifier of a stanza row.
pub type StanzaId = i64;

/// Storage identifier of a translated stanza row.
pub type TranslationId = i64;

/// Default language tag for canonical stanzas.
pub const DEFAULT_STANZA_LANGUAGE: &str = "it";

/// Default language tag for translations.
pub const DEFAULT_TRANSLATION_LANGUAGE: &str = "en";

/// Canonical stanza read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stanza {
    pub id: StanzaId,
    pub starts: Option<LineCode>,
    pub ends: Option<LineCode>,
    /// Canonical text body. Annotations anchor into this string.
    pub text: String,
    pub language: String,
    pub notes: Option<String>,
}

impl Stanza {
    /// Returns the address used for ordering and folio membership.
    pub fn address(&self) -> Option<LineCode> {
        self.starts
    }
}

/// Write model for creating or upserting a stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanzaInput {
    pub starts: Option<LineCode>,
    pub ends: Option<LineCode>,
    pub text: String,
    pub language: String,
    pub notes: Option<String>,
}

impl StanzaInput {
    /// Creates an unaddressed stanza body in the default language.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            starts: None,
            ends: None,
            text: text.into(),
            language: DEFAULT_STANZA_LANGUAGE.to_string(),
            notes: None,
        }
    }

    /// Builder-style address setter.
    pub fn at(mut self, starts: LineCode) -> Self {
        self.starts = Some(starts);
        self
    }

    /// Checks the address pair invariant.
    pub fn validate(&self) -> Result<(), LineCodeError> {
        validate_address_pair(self.starts, self.ends)
    }
}

/// Translated stanza read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedStanza {
    pub id: TranslationId,
    /// Base stanza, when the translation is linked to one.
    pub stanza_id: Option<StanzaId>,
    pub starts: Option<LineCode>,
    pub text: String,
    pub language: String,
}

/// Checks that `ends` does not sort before `starts`.
///
/// Only positions are compared; a variant start may be closed by a plain end.
pub fn validate_address_pair(
    starts: Option<LineCode>,
    ends: Option<LineCode>,
) -> Result<(), LineCodeError> {
    if let (Some(starts), Some(ends)) = (starts, ends) {
        if ends.last() < starts.start() {
            return Err(LineCodeError::RangeInverted {
                start: starts.start(),
                end: ends.last(),
            });
        }
    }
    Ok(())
}

/// Sorts stanzas into reading order: addressed first by position, base
/// reading before variants, then by id; unaddressed stanzas last by id.
pub fn sort_by_address(stanzas: &mut [Stanza]) {
    stanzas.sort_by(|a, b| {
        let key_a = a.starts.map(|code| code.sort_key());
        let key_b = b.starts.map(|code| code.sort_key());
        match (key_a, key_b) {
            (Some(left), Some(right)) => left.cmp(&right).then(a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        }
    });
}
