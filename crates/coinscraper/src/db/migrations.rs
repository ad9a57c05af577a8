//! Versioned schema.
//!
//! Applied versions are recorded in `_migrations`. Each pending step runs in
//! its own transaction together with its bookkeeping row, so a step is
//! either fully applied and recorded or not at all.

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct Step {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        description: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
    },
    Step {
        version: 2,
        description: "create_tasks_table",
        sql: include_str!("sql/002_create_tasks.sql"),
    },
    Step {
        version: 3,
        description: "create_queue_units_table",
        sql: include_str!("sql/003_create_queue_units.sql"),
    },
];

/// Highest schema version this build knows about.
pub fn latest_version() -> u32 {
    STEPS.last().map(|s| s.version).unwrap_or(0)
}

/// Version recorded in `_migrations`, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Brings the schema up to [`latest_version`].
pub fn run_all(conn: &mut Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let found = current_version(conn)?;
    if found > latest_version() {
        return Err(DatabaseError::SchemaTooNew {
            found,
            supported: latest_version(),
        });
    }

    for step in STEPS.iter().filter(|s| s.version > found) {
        log::info!("Applying schema v{}: {}", step.version, step.description);

        let failed = |source| DatabaseError::Migration {
            version: step.version,
            description: step.description,
            source,
        };
        let tx = conn.transaction().map_err(failed)?;
        tx.execute_batch(step.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            params![
                step.version,
                step.description,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            ],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;
    }

    Ok(())
}
