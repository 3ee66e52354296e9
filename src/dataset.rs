use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, Row};

use crate::record::BusinessRecord;

/// Open the dataset store, creating the file and schema if needed.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open dataset {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS business_records (
            id           INTEGER PRIMARY KEY,
            encid        TEXT NOT NULL,
            name         TEXT NOT NULL,
            categories   TEXT NOT NULL,
            price_range  TEXT NOT NULL,
            phone        TEXT NOT NULL,
            address      TEXT NOT NULL,
            city         TEXT NOT NULL,
            state        TEXT NOT NULL,
            zip_code     TEXT NOT NULL,
            country      TEXT NOT NULL,
            rating       REAL NOT NULL,
            review_count INTEGER NOT NULL,
            url          TEXT NOT NULL,
            pushed_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_encid ON business_records(encid);
        ",
    )?;
    Ok(())
}

/// Append one record. Rows are never updated or removed.
pub fn push(conn: &Connection, r: &BusinessRecord) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO business_records
         (encid, name, categories, price_range, phone, address, city, state, zip_code,
          country, rating, review_count, url, pushed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )?;
    stmt.execute(rusqlite::params![
        r.encid, r.name, r.categories, r.price_range, r.phone, r.address, r.city, r.state,
        r.zip_code, r.country, r.rating, r.review_count, r.url,
        chrono::Utc::now().to_rfc3339(),
    ])?;
    Ok(())
}

pub fn count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM business_records", [], |row| row.get(0))?;
    Ok(n as usize)
}

pub struct StoredRecord {
    pub record: BusinessRecord,
    pub pushed_at: String,
}

/// Most recent `limit` records, newest first.
pub fn latest(conn: &Connection, limit: usize) -> Result<Vec<StoredRecord>> {
    let sql = format!(
        "SELECT {} FROM business_records ORDER BY id DESC LIMIT {}",
        COLUMNS, limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredRecord {
                record: record_from_row(row)?,
                pushed_at: row.get(13)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every record in insertion order.
pub fn all(conn: &Connection) -> Result<Vec<BusinessRecord>> {
    let sql = format!("SELECT {} FROM business_records ORDER BY id", COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const COLUMNS: &str = "encid, name, categories, price_range, phone, address, city, state, \
                       zip_code, country, rating, review_count, url, pushed_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<BusinessRecord> {
    Ok(BusinessRecord {
        encid: row.get(0)?,
        name: row.get(1)?,
        categories: row.get(2)?,
        price_range: row.get(3)?,
        phone: row.get(4)?,
        address: row.get(5)?,
        city: row.get(6)?,
        state: row.get(7)?,
        zip_code: row.get(8)?,
        country: row.get(9)?,
        rating: row.get(10)?,
        review_count: row.get(11)?,
        url: row.get(12)?,
    })
}
