use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use relay_types::models::{CatalogRow, Watermark};
use relay_types::store::CatalogSource;

use crate::{Database, TableName, migrations};

const CATALOG_COLUMNS: &str = "id, title, cover, link, synopsis, created_at, updated_at";

/// Catalog tables as a row source for the poller and the search commands.
#[derive(Clone)]
pub struct SqliteCatalog {
    db: Arc<Database>,
}

impl SqliteCatalog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn ensure_tables(&self, tables: &[TableName]) -> Result<()> {
        self.db.with_conn(|conn| {
            for table in tables {
                migrations::ensure_catalog_table(conn, table)?;
            }
            Ok(())
        })
    }

    pub fn insert(&self, table: &TableName, row: &CatalogRow) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO {table} ({CATALOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                rusqlite::params![
                    row.id,
                    row.title,
                    row.cover,
                    row.link,
                    row.synopsis,
                    row.created_at.timestamp_millis(),
                    row.updated_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn latest_row_now(&self, table: &TableName) -> Result<Option<CatalogRow>> {
        self.db.with_conn(|conn| query_latest(conn, table))
    }

    pub fn rows_after_now(
        &self,
        table: &TableName,
        after: Option<Watermark>,
        limit: u32,
    ) -> Result<Vec<CatalogRow>> {
        self.db.with_conn(|conn| query_rows_after(conn, table, after, limit))
    }

    pub fn search_now(&self, table: &TableName, query: &str, limit: u32) -> Result<Vec<CatalogRow>> {
        self.db.with_conn(|conn| query_search(conn, table, query, limit))
    }
}

#[async_trait]
impl CatalogSource for SqliteCatalog {
    async fn latest_row(&self, table: &str) -> Result<Option<CatalogRow>> {
        let table = TableName::new(table)?;
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.latest_row_now(&table))
            .await
            .context("catalog query task failed")?
    }

    async fn rows_after(
        &self,
        table: &str,
        after: Option<Watermark>,
        limit: u32,
    ) -> Result<Vec<CatalogRow>> {
        let table = TableName::new(table)?;
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.rows_after_now(&table, after, limit))
            .await
            .context("catalog query task failed")?
    }

    async fn search(&self, table: &str, query: &str, limit: u32) -> Result<Vec<CatalogRow>> {
        let table = TableName::new(table)?;
        let query = query.to_string();
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.search_now(&table, &query, limit))
            .await
            .context("catalog query task failed")?
    }
}

fn query_latest(conn: &Connection, table: &TableName) -> Result<Option<CatalogRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATALOG_COLUMNS} FROM {table} ORDER BY created_at DESC, id DESC LIMIT 1"
    ))?;
    let row = stmt.query_row([], map_row).optional()?;
    Ok(row)
}

fn query_rows_after(
    conn: &Connection,
    table: &TableName,
    after: Option<Watermark>,
    limit: u32,
) -> Result<Vec<CatalogRow>> {
    // Strictly newer than the cursor timestamp; the id only orders ties.
    let cursor = after.map(|w| w.timestamp.timestamp_millis()).unwrap_or(i64::MIN);
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATALOG_COLUMNS} FROM {table}
         WHERE created_at > ?1
         ORDER BY created_at ASC, id ASC
         LIMIT ?2"
    ))?;

    let rows = stmt
        .query_map(rusqlite::params![cursor, limit], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_search(conn: &Connection, table: &TableName, query: &str, limit: u32) -> Result<Vec<CatalogRow>> {
    let pattern = format!("%{}%", escape_like(query.trim()));
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATALOG_COLUMNS} FROM {table}
         WHERE title LIKE ?1 ESCAPE '\\'
         ORDER BY created_at DESC, id DESC
         LIMIT ?2"
    ))?;

    let rows = stmt
        .query_map(rusqlite::params![pattern, limit], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CatalogRow> {
    Ok(CatalogRow {
        id: row.get(0)?,
        title: row.get(1)?,
        cover: row.get(2)?,
        link: row.get(3)?,
        synopsis: row.get(4)?,
        created_at: millis_to_utc(row.get(5)?),
        updated_at: millis_to_utc(row.get(6)?),
    })
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
