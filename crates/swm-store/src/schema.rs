use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 2;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // In-memory and fresh databases legitimately fail this.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::debug!("startup WAL checkpoint complete");
    }

    // For v1 databases CREATE TABLE IF NOT EXISTS is a no-op on scars, so
    // the derived scar columns are added below.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scars (
            id                 TEXT PRIMARY KEY,
            vault              TEXT NOT NULL CHECK (vault IN ('A', 'B')),
            geoid_a            TEXT NOT NULL,
            geoid_b            TEXT NOT NULL,
            reason             TEXT NOT NULL,
            timestamp          TEXT NOT NULL,
            pre_entropy        REAL NOT NULL,
            post_entropy       REAL NOT NULL,
            delta_entropy      REAL NOT NULL,
            weight             REAL NOT NULL,
            cdp                REAL NOT NULL DEFAULT 0,
            semantic_polarity  REAL NOT NULL DEFAULT 0,
            mutation_frequency INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS geoids (
            id       TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            body     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entropy_measurements (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            cycle_id  INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            body      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cycle_stats (
            cycle_id  INTEGER PRIMARY KEY,
            timestamp TEXT NOT NULL,
            body      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scars_vault ON scars(vault);
        CREATE INDEX IF NOT EXISTS idx_scars_pair ON scars(geoid_a, geoid_b);
        CREATE INDEX IF NOT EXISTS idx_geoids_position ON geoids(position);
        ",
    )?;

    // v1 → v2: derived scar fields
    for (column, ddl) in [
        ("cdp", "ALTER TABLE scars ADD COLUMN cdp REAL NOT NULL DEFAULT 0;"),
        (
            "semantic_polarity",
            "ALTER TABLE scars ADD COLUMN semantic_polarity REAL NOT NULL DEFAULT 0;",
        ),
        (
            "mutation_frequency",
            "ALTER TABLE scars ADD COLUMN mutation_frequency INTEGER NOT NULL DEFAULT 1;",
        ),
    ] {
        if conn
            .prepare(&format!("SELECT {column} FROM scars LIMIT 0"))
            .is_err()
        {
            conn.execute_batch(ddl)?;
            tracing::info!(column, "migrated scars table");
        }
    }

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        for table in &[
            "metadata",
            "scars",
            "geoids",
            "entropy_measurements",
            "cycle_stats",
        ] {
            let count: i64 = conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert!(count >= 0, "table {table} should exist");
        }
    }

    #[test]
    fn test_schema_version_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_idempotent_initialize() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
    }

    #[test]
    fn test_busy_timeout_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);
    }

    #[test]
    fn test_vault_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO scars (id, vault, geoid_a, geoid_b, reason, timestamp,
                                pre_entropy, post_entropy, delta_entropy, weight)
             VALUES ('s1', 'C', 'a', 'b', 'r', 't', 0, 0, 0, 0.6)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_upgrade_v1_adds_derived_scar_columns() {
        let conn = Connection::open_in_memory().unwrap();

        conn.execute_batch(
            "
            CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            INSERT INTO metadata (key, value) VALUES ('schema_version', '1');

            CREATE TABLE scars (
                id            TEXT PRIMARY KEY,
                vault         TEXT NOT NULL CHECK (vault IN ('A', 'B')),
                geoid_a       TEXT NOT NULL,
                geoid_b       TEXT NOT NULL,
                reason        TEXT NOT NULL,
                timestamp     TEXT NOT NULL,
                pre_entropy   REAL NOT NULL,
                post_entropy  REAL NOT NULL,
                delta_entropy REAL NOT NULL,
                weight        REAL NOT NULL
            );

            INSERT INTO scars VALUES ('s1', 'A', 'a', 'b', 'old', '2025-01-01T00:00:00Z', 1, 1, 0, 0.7);
            ",
        )
        .unwrap();

        initialize(&conn).unwrap();

        let (cdp, freq): (f64, i64) = conn
            .query_row(
                "SELECT cdp, mutation_frequency FROM scars WHERE id = 's1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(cdp, 0.0);
        assert_eq!(freq, 1);
        assert_eq!(get_schema_version(&conn).unwrap(), Some(2));
    }
}
