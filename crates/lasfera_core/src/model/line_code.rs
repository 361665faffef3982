//! Hierarchical text addresses (`book.stanza.line`).
//!
//! # Responsibility
//! - Parse, validate and render LineCodes in their canonical dotted form.
//! - Provide the ordering and containment rules used by folio ranges.
//!
//! # Invariants
//! - A LineCode always renders as `BB.SS.LL`, `BB.SS.LL-BB.SS.LL` or
//!   `BB.SS.LLx` (`x` in `a..=z`); parse then render is the identity.
//! - A range never ends before it starts.
//! - A variant suffix never appears together with a range.
//! - Ordering only looks at `(book, stanza, line)`; the variant letter shares
//!   the position of its base address.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

// `[0-9]` instead of `\d`: the regex crate's `\d` also accepts non-ASCII digits.
static PLAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{2})\.([0-9]{2})\.([0-9]{2})(?:-([0-9]{2})\.([0-9]{2})\.([0-9]{2}))?$")
        .expect("valid line code regex")
});
static VARIANT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{2})\.([0-9]{2})\.([0-9]{2})([a-z])$").expect("valid variant regex")
});
static VARIANT_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}\.[0-9]{2}\.[0-9]{2}[a-z]?-[0-9]{2}\.[0-9]{2}\.[0-9]{2}[a-z]?$")
        .expect("valid variant range regex")
});

/// Parse failures for LineCode text. All of them reject the value outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCodeError {
    /// Input does not match any legal shape.
    MalformedAddress(String),
    /// Range end sorts before range start.
    RangeInverted {
        start: LineAddress,
        end: LineAddress,
    },
    /// Variant suffix combined with a range.
    VariantWithRange(String),
}

impl Display for LineCodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedAddress(value) => write!(
                f,
                "malformed line code `{value}`: expected `01.01.04`, `01.01.04-01.01.16` or `01.01.04a`"
            ),
            Self::RangeInverted { start, end } => {
                write!(f, "line code range ends before it starts: {start}-{end}")
            }
            Self::VariantWithRange(value) => {
                write!(f, "line code `{value}` combines a variant suffix with a range")
            }
        }
    }
}

impl Error for LineCodeError {}

/// One `(book, stanza, line)` position in the edition.
///
/// Field order matters: the derived `Ord` is the edition's reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineAddress {
    pub book: u8,
    pub stanza: u8,
    pub line: u8,
}

impl LineAddress {
    /// Builds an address; each component must fit the two-digit notation.
    pub fn new(book: u8, stanza: u8, line: u8) -> Result<Self, LineCodeError> {
        if book > 99 || stanza > 99 || line > 99 {
            return Err(LineCodeError::MalformedAddress(format!(
                "{book}.{stanza}.{line}"
            )));
        }
        Ok(Self { book, stanza, line })
    }
}

impl Display for LineAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}.{:02}.{:02}", self.book, self.stanza, self.line)
    }
}

impl FromStr for LineAddress {
    type Err = LineCodeError;

    /// Accepts only a plain point address (no range, no variant).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let code = LineCode::parse(value)?;
        if code.is_range() || code.variant().is_some() {
            return Err(LineCodeError::MalformedAddress(value.to_string()));
        }
        Ok(code.start())
    }
}

/// Parsed citation address, optionally ranged or variant-suffixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LineCode {
    start: LineAddress,
    end: Option<LineAddress>,
    variant: Option<char>,
}

impl LineCode {
    /// Parses the canonical text form.
    ///
    /// Input is matched exactly; callers trim spreadsheet/YAML cells first.
    ///
    /// # Errors
    /// - `VariantWithRange` for shapes like `01.02.07a-01.02.12`.
    /// - `RangeInverted` when the end address sorts before the start.
    /// - `MalformedAddress` for everything else that is not a legal shape.
    pub fn parse(value: &str) -> Result<Self, LineCodeError> {
        if let Some(caps) = PLAIN_RE.captures(value) {
            let start = address_from_captures(&caps, 1, value)?;
            let end = match caps.get(4) {
                Some(_) => Some(address_from_captures(&caps, 4, value)?),
                None => None,
            };
            return match end {
                Some(end) => Self::range(start, end),
                None => Ok(Self::point(start)),
            };
        }

        if let Some(caps) = VARIANT_RE.captures(value) {
            let start = address_from_captures(&caps, 1, value)?;
            let letter = caps
                .get(4)
                .and_then(|m| m.as_str().chars().next())
                .ok_or_else(|| LineCodeError::MalformedAddress(value.to_string()))?;
            return Self::with_variant(start, letter);
        }

        if VARIANT_RANGE_RE.is_match(value) {
            return Err(LineCodeError::VariantWithRange(value.to_string()));
        }

        Err(LineCodeError::MalformedAddress(value.to_string()))
    }

    /// Single-line address.
    pub fn point(start: LineAddress) -> Self {
        Self {
            start,
            end: None,
            variant: None,
        }
    }

    /// Closed range `[start, end]`.
    pub fn range(start: LineAddress, end: LineAddress) -> Result<Self, LineCodeError> {
        if end < start {
            return Err(LineCodeError::RangeInverted { start, end });
        }
        Ok(Self {
            start,
            end: Some(end),
            variant: None,
        })
    }

    /// Alternate reading anchored at `start`.
    pub fn with_variant(start: LineAddress, letter: char) -> Result<Self, LineCodeError> {
        if !letter.is_ascii_lowercase() {
            return Err(LineCodeError::MalformedAddress(format!("{start}{letter}")));
        }
        Ok(Self {
            start,
            end: None,
            variant: Some(letter),
        })
    }

    pub fn start(&self) -> LineAddress {
        self.start
    }

    pub fn end(&self) -> Option<LineAddress> {
        self.end
    }

    pub fn variant(&self) -> Option<char> {
        self.variant
    }

    pub fn is_range(&self) -> bool {
        self.end.is_some()
    }

    pub fn book(&self) -> u8 {
        self.start.book
    }

    /// Last position covered by this code (range end, or the start itself).
    pub fn last(&self) -> LineAddress {
        self.end.unwrap_or(self.start)
    }

    /// Compares reading positions, ignoring the variant suffix and range end.
    pub fn cmp_position(&self, other: &LineCode) -> Ordering {
        self.start.cmp(&other.start)
    }

    /// Whether `point` starts inside this code read as bounds: a range covers
    /// `start..=end`, a code without an end is open towards the end of the text.
    pub fn contains(&self, point: &LineCode) -> bool {
        self.contains_address(point.start)
    }

    pub fn contains_address(&self, address: LineAddress) -> bool {
        self.bounds().contains(address, BoundaryPolicy::Closed)
    }

    /// Bounds from `start` to the range end, open when there is none.
    pub fn bounds(&self) -> AddressBounds {
        AddressBounds {
            start: Some(self.start),
            end: self.end,
        }
    }

    /// Deterministic listing key: position first, base reading before its
    /// variants, then variants alphabetically.
    pub fn sort_key(&self) -> (LineAddress, Option<char>) {
        (self.start, self.variant)
    }

    /// Canonical text form.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl Display for LineCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.start)?;
        if let Some(letter) = self.variant {
            write!(f, "{letter}")?;
        }
        if let Some(end) = self.end {
            write!(f, "-{end}")?;
        }
        Ok(())
    }
}

impl FromStr for LineCode {
    type Err = LineCodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for LineCode {
    type Error = LineCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<LineCode> for String {
    fn from(value: LineCode) -> Self {
        value.render()
    }
}

/// Boundary rule applied at a folio's end address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// `[start, end)`: a line at `end` belongs to the next folio.
    #[default]
    HalfOpen,
    /// `[start, end]`.
    Closed,
}

/// Folio-style address bounds where either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressBounds {
    /// `None` means unbounded below.
    pub start: Option<LineAddress>,
    /// `None` means unbounded above.
    pub end: Option<LineAddress>,
}

impl AddressBounds {
    /// Builds bounds, rejecting an end that sorts before the start.
    pub fn new(
        start: Option<LineAddress>,
        end: Option<LineAddress>,
    ) -> Result<Self, LineCodeError> {
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(LineCodeError::RangeInverted { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// True when neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Membership test with open sides treated as infinite.
    pub fn contains(&self, address: LineAddress, policy: BoundaryPolicy) -> bool {
        let above_start = self.start.map_or(true, |start| address >= start);
        let below_end = match (self.end, policy) {
            (None, _) => true,
            (Some(end), BoundaryPolicy::HalfOpen) => address < end,
            (Some(end), BoundaryPolicy::Closed) => address <= end,
        };
        above_start && below_end
    }
}

fn address_from_captures(
    caps: &regex::Captures<'_>,
    first_group: usize,
    raw: &str,
) -> Result<LineAddress, LineCodeError> {
    let component = |index: usize| -> Result<u8, LineCodeError> {
        caps.get(index)
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .ok_or_else(|| LineCodeError::MalformedAddress(raw.to_string()))
    };
    LineAddress::new(
        component(first_group)?,
        component(first_group + 1)?,
        component(first_group + 2)?,
    )
}
