//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into maintenance passes and imports.
//! - Keep the CLI decoupled from storage details.

pub mod annotation_service;
pub mod folio_import;
pub mod outline;
pub mod range_resolver;
pub mod reconcile;
pub mod stanza_import;
