//! Manuscript and folio records.
//!
//! # Responsibility
//! - Describe manuscript pages and the address range each page covers.
//!
//! # Invariants
//! - A folio belongs to exactly one manuscript and is unique per
//!   `(manuscript, label)`.
//! - Folio membership is derived from the range; it is never ground truth.

use crate::model::line_code::{AddressBounds, LineAddress};
use serde::{Deserialize, Serialize};

/// Storage identifier of a folio row.
pub type FolioId = i64;

/// Manuscript witness, identified by its siglum (e.g. `Urb1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manuscript {
    pub siglum: String,
    pub name: Option<String>,
}

/// One manuscript page and the text range written on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folio {
    pub id: FolioId,
    /// Owning manuscript siglum.
    pub manuscript: String,
    /// Page label such as `1r` or `12v`.
    pub label: String,
    /// `None` means open below.
    pub range_start: Option<LineAddress>,
    /// `None` means open above.
    pub range_end: Option<LineAddress>,
}

impl Folio {
    /// Address bounds for membership resolution.
    ///
    /// Ranges are validated by the repository on write.
    pub fn bounds(&self) -> AddressBounds {
        AddressBounds {
            start: self.range_start,
            end: self.range_end,
        }
    }
}
