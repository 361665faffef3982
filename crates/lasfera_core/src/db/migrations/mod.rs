//! Edition schema migrations.
//!
//! # Responsibility
//! - Bring a store up to the edition schema: text units and folios (v1),
//!   then text annotations (v2).
//! - Refuse stores written by a newer build.
//!
//! # Invariants
//! - Each pending step runs in its own transaction together with its
//!   `PRAGMA user_version` bump, so a store is never left between versions.
//! - Steps are append-only; a released step's SQL is never edited.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "edition",
        sql: include_str!("0001_edition.sql"),
    },
    Migration {
        version: 2,
        name: "text_annotations",
        sql: include_str!("0002_text_annotations.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Runs every step newer than the store's `user_version`.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stored = stored_version(conn)?;
    let latest = latest_version();
    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }

    for migration in MIGRATIONS.iter().filter(|migration| migration.version > stored) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;
        info!(
            "event=db_migrate module=db status=ok version={} step={}",
            migration.version, migration.name
        );
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
