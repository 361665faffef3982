//! Text addressing and annotation reconciliation core for the La Sfera edition.
//! This crate is the single source of truth for addressing invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{load_config, stock_config_toml, ConfigError, PolicyConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::annotation::{AnnotationId, AnnotationKind, AnnotationTarget, TextAnnotation};
pub use model::folio::{Folio, FolioId, Manuscript};
pub use model::line_code::{AddressBounds, BoundaryPolicy, LineAddress, LineCode, LineCodeError};
pub use model::stanza::{Stanza, StanzaId, StanzaInput, TranslatedStanza, TranslationId};
pub use repo::annotation_repo::{AnnotationRepository, SqliteAnnotationRepository};
pub use repo::folio_repo::{FolioRepository, SqliteFolioRepository};
pub use repo::stanza_repo::{SqliteStanzaRepository, StanzaRepository};
pub use repo::{RepoError, RepoResult, Upsert};
pub use service::range_resolver::{resolve_membership, RangeResolver};
pub use service::reconcile::{Reconciler, RunMode};

/// Connection type returned by [`open_db`], re-exported for callers that
/// hold one without depending on `rusqlite` themselves.
pub use rusqlite::Connection;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
