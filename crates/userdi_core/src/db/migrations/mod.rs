//! User store schema migrations.
//!
//! # Responsibility
//! - Declare the `users` schema as named, ordered SQL steps.
//! - Bring a connection up to the latest schema in one transaction.
//!
//! # Invariants
//! - Versions start at 1 and increase by exactly one per step.
//! - `PRAGMA user_version` always equals the last applied step.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, Transaction};

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "users",
    sql: include_str!("0001_users.sql"),
}];

/// Result of bringing a connection up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub from_version: u32,
    pub to_version: u32,
}

impl MigrationOutcome {
    /// Number of migration steps applied by this run.
    pub fn applied(&self) -> u32 {
        self.to_version - self.from_version
    }
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Reads `PRAGMA user_version` from the connection.
pub fn current_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Applies every migration newer than the connection's schema version.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer binary.
/// - `Migration` naming the first step that failed; nothing is committed.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationOutcome> {
    let from_version = current_version(conn)?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let pending = &MIGRATIONS[from_version as usize..];
    if !pending.is_empty() {
        let tx = conn.transaction()?;
        for migration in pending {
            run_step(&tx, migration).map_err(|source| DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        }
        tx.commit()?;
        info!(
            "event=db_migrate module=db status=ok from_version={from_version} to_version={latest}"
        );
    }

    Ok(MigrationOutcome {
        from_version,
        to_version: latest,
    })
}

fn run_step(tx: &Transaction<'_>, migration: &Migration) -> rusqlite::Result<()> {
    tx.execute_batch(migration.sql)?;
    tx.pragma_update(None, "user_version", migration.version)
}
