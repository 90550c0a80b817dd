//! Database migrations
//!
//! SQL migrations are embedded as strings and applied in order on open. The
//! number of applied migrations is tracked in `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

/// Memories and version history (001)
pub const MEMORIES_SQL: &str = include_str!("001_memories.sql");

const MIGRATIONS: &[&str] = &[MEMORIES_SQL];

/// Apply every migration newer than the database's recorded version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let applied: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(applied.max(0) as usize) {
        conn.execute_batch(sql)?;
        conn.pragma_update(None, "user_version", (index + 1) as i64)?;
        debug!(migration = index + 1, "Applied migration");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('memories', 'memory_versions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
