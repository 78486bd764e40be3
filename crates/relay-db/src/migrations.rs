use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::TableName;

/// Create a catalog table if it does not exist yet.
///
/// Timestamps are unix milliseconds so the poller can compare them exactly.
pub fn ensure_catalog_table(conn: &Connection, table: &TableName) -> Result<()> {
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            id          INTEGER PRIMARY KEY,
            title       TEXT NOT NULL,
            cover       TEXT,
            link        TEXT,
            synopsis    TEXT,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_created
            ON {table}(created_at, id);
        "
    ))?;

    info!("Catalog table '{}' ready", table);
    Ok(())
}

/// Create the subscriber table with the full schema if it does not exist.
/// An existing, narrower table is left alone; the registry degrades to it.
pub fn ensure_subscriber_table(conn: &Connection, table: &TableName) -> Result<()> {
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            chat_id     TEXT PRIMARY KEY,
            chat_type   TEXT NOT NULL,
            title       TEXT,
            username    TEXT,
            first_name  TEXT,
            last_name   TEXT,
            is_active   INTEGER NOT NULL DEFAULT 1,
            source      TEXT,
            updated_at  TEXT
        );
        "
    ))?;

    info!("Subscriber table '{}' ready", table);
    Ok(())
}
