//! Table definition and timestamp encoding for the `resourceone` table.
//!
//! Timestamps are persisted as integer microseconds since the Unix epoch so
//! that `time_updated > :threshold` compares numerically and the index on
//! `time_updated` serves the freshness filter.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::{Result, StoreError};

const MIGRATE_UP_SQL: &str = "
    CREATE TABLE IF NOT EXISTS resourceone (
        resourceone_id INTEGER PRIMARY KEY AUTOINCREMENT,
        label TEXT NOT NULL,
        time_created INTEGER NOT NULL,
        time_updated INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS r_tu_idx ON resourceone (time_updated ASC);
";

const MIGRATE_DOWN_SQL: &str = "
    DROP INDEX IF EXISTS r_tu_idx;
    DROP TABLE IF EXISTS resourceone;
";

/// Creates the table and its index. Safe to run repeatedly.
pub fn migrate_up(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATE_UP_SQL)?;
    tracing::info!(table = "resourceone", "Schema migrated up");
    Ok(())
}

/// Drops the table and its index. Safe to run repeatedly.
pub fn migrate_down(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATE_DOWN_SQL)?;
    tracing::info!(table = "resourceone", "Schema migrated down");
    Ok(())
}

/// Encodes a timestamp for storage.
pub fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

/// Decodes a stored timestamp.
pub fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp out of range: {micros}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'resourceone'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_migrate_up_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_up(&conn).unwrap();
        migrate_up(&conn).unwrap();
        assert!(table_exists(&conn));

        let index: String = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'resourceone'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index, "r_tu_idx");
    }

    #[test]
    fn test_migrate_down_drops_table() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_up(&conn).unwrap();
        migrate_down(&conn).unwrap();
        migrate_down(&conn).unwrap();
        assert!(!table_exists(&conn));
    }

    #[test]
    fn test_micros_roundtrip_preserves_precision() {
        let at = DateTime::from_timestamp_micros(1_712_345_678_901_234).unwrap();
        assert_eq!(from_micros(to_micros(at)).unwrap(), at);
    }

    #[test]
    fn test_out_of_range_timestamp_is_invalid_data() {
        assert!(matches!(from_micros(i64::MAX), Err(StoreError::InvalidData(_))));
    }
}
