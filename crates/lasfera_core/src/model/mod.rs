//! Domain model for the edition's addressable text.
//!
//! # Responsibility
//! - Define LineCodes and the records addressed by them.
//! - Keep address validation next to the types it protects.
//!
//! # Invariants
//! - Every LineCode in the model is canonical; malformed text never gets
//!   past parsing.
//! - Annotation targets are an exhaustive enum over text-bearing records.

pub mod annotation;
pub mod folio;
pub mod line_code;
pub mod stanza;
