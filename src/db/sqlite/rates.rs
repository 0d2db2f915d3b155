//! Metal rate history
//!
//! Append-only: every accepted fetch adds rows, nothing is updated in place.
//! The newest row per symbol is the current rate.

use super::{parse_column, time_column, to_db_time};
use crate::error::Result;
use crate::sources::types::{Metal, MetalRate};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const RATE_COLUMNS: &str = "symbol, rate_per_gram, source, recorded_at";

fn rate_from_row(row: &Row<'_>) -> rusqlite::Result<MetalRate> {
    Ok(MetalRate {
        symbol: parse_column(row, 0)?,
        rate_per_gram: parse_column(row, 1)?,
        source: row.get(2)?,
        recorded_at: time_column(row, 3)?,
    })
}

/// Insert a rate set in one transaction
pub fn insert_rates(conn: &mut Connection, rates: &[MetalRate]) -> Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO metal_rates (symbol, rate_per_gram, source, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for rate in rates {
            stmt.execute(params![
                rate.symbol.symbol(),
                rate.rate_per_gram.to_string(),
                rate.source,
                to_db_time(&rate.recorded_at),
            ])?;
        }
    }
    tx.commit()?;

    tracing::debug!("Stored {} metal rates", rates.len());
    Ok(())
}

/// Latest rate for every symbol that has history
pub fn latest_rates(conn: &Connection) -> Result<Vec<MetalRate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM metal_rates
         WHERE id IN (SELECT MAX(id) FROM metal_rates GROUP BY symbol)
         ORDER BY symbol",
        RATE_COLUMNS
    ))?;

    let rates = stmt
        .query_map([], rate_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rates)
}

/// Latest rate for one symbol
pub fn latest_rate(conn: &Connection, metal: Metal) -> Result<Option<MetalRate>> {
    let result = conn.query_row(
        &format!(
            "SELECT {} FROM metal_rates WHERE symbol = ?1 ORDER BY id DESC LIMIT 1",
            RATE_COLUMNS
        ),
        params![metal.symbol()],
        rate_from_row,
    );

    match result {
        Ok(rate) => Ok(Some(rate)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Rates recorded at or after `since`, newest first
pub fn rate_history(
    conn: &Connection,
    since: DateTime<Utc>,
    metal: Option<Metal>,
) -> Result<Vec<MetalRate>> {
    let since = to_db_time(&since);

    let rates = match metal {
        Some(metal) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM metal_rates
                 WHERE recorded_at >= ?1 AND symbol = ?2
                 ORDER BY recorded_at DESC, id DESC",
                RATE_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![since, metal.symbol()], rate_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM metal_rates
                 WHERE recorded_at >= ?1
                 ORDER BY recorded_at DESC, id DESC",
                RATE_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![since], rate_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };

    Ok(rates)
}

/// Total number of history rows
pub fn count_rates(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM metal_rates", [], |row| row.get(0))?;
    Ok(count)
}
