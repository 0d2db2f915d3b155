//! SQLite database module

pub mod models;
pub mod migrations;
mod rates;
mod making_charges;

use crate::error::{AppError, Result};
use crate::sources::types::{Metal, MetalRate};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use models::*;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Timestamp format stored in TEXT columns. Fixed width, so text order is
/// chronological order.
const DB_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// SQLite database wrapper
///
/// Every call waits at most `lock_timeout` for the connection (and SQLite's
/// own busy handler waits the same for file locks) and then fails with
/// `Unavailable` instead of hanging the request.
pub struct SqliteDb {
    conn: Mutex<Connection>,
    lock_timeout: Duration,
}

impl SqliteDb {
    /// Open (or create) the database file
    pub fn new(path: &Path, lock_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        tracing::info!("Opened SQLite database at {:?}", path);
        Self::from_connection(conn, lock_timeout)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory(lock_timeout: Duration) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, lock_timeout)
    }

    fn from_connection(conn: Connection, lock_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(lock_timeout)?;

        let db = Self {
            conn: Mutex::new(conn),
            lock_timeout,
        };

        // Run migrations
        db.run_migrations()?;

        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        migrations::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.try_lock_for(self.lock_timeout).ok_or_else(|| {
            tracing::warn!(
                "SQLite connection busy for more than {}ms",
                self.lock_timeout.as_millis()
            );
            AppError::Unavailable("rate store is busy".to_string())
        })
    }

    // ========== Metal Rate Methods ==========

    /// Append a rate set to history
    pub fn insert_rates(&self, rates: &[MetalRate]) -> Result<()> {
        let mut conn = self.lock()?;
        rates::insert_rates(&mut conn, rates)
    }

    /// Latest persisted rate for every symbol
    pub fn latest_rates(&self) -> Result<Vec<MetalRate>> {
        let conn = self.lock()?;
        rates::latest_rates(&conn)
    }

    /// Latest persisted rate for one symbol
    pub fn latest_rate(&self, metal: Metal) -> Result<Option<MetalRate>> {
        let conn = self.lock()?;
        rates::latest_rate(&conn, metal)
    }

    /// Rate history since a point in time
    pub fn rate_history(&self, since: DateTime<Utc>, metal: Option<Metal>) -> Result<Vec<MetalRate>> {
        let conn = self.lock()?;
        rates::rate_history(&conn, since, metal)
    }

    /// Number of history rows
    pub fn count_rates(&self) -> Result<i64> {
        let conn = self.lock()?;
        rates::count_rates(&conn)
    }

    // ========== Making-Charge Rule Methods ==========

    pub fn list_rules(&self, include_inactive: bool) -> Result<Vec<MakingChargeRule>> {
        let conn = self.lock()?;
        making_charges::list_rules(&conn, include_inactive)
    }

    pub fn get_rule(&self, id: i64) -> Result<Option<MakingChargeRule>> {
        let conn = self.lock()?;
        making_charges::get_rule(&conn, id)
    }

    pub fn create_rule(&self, rule: NewMakingChargeRule) -> Result<MakingChargeRule> {
        let conn = self.lock()?;
        making_charges::create_rule(&conn, rule)
    }

    pub fn update_rule(&self, id: i64, update: MakingChargeRuleUpdate) -> Result<MakingChargeRule> {
        let conn = self.lock()?;
        making_charges::update_rule(&conn, id, update)
    }

    pub fn delete_rule(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        making_charges::delete_rule(&conn, id)
    }

    /// Highest-precedence rule in force at `now`
    pub fn resolve_rule(
        &self,
        query: &RuleQuery,
        now: DateTime<Utc>,
    ) -> Result<Option<MakingChargeRule>> {
        let conn = self.lock()?;
        making_charges::resolve_rule(&conn, query, now)
    }
}

// ========== Column Helpers ==========

/// Truncate to the millisecond precision TEXT timestamps keep, so a value
/// handed back to a caller equals the one read back later
pub fn to_db_precision(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(3)
}

pub(crate) fn to_db_time(time: &DateTime<Utc>) -> String {
    time.format(DB_TIME_FORMAT).to_string()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_text<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| conversion_error(idx, format!("{}: {:?}", e, raw)))
}

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, DB_TIME_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|e| conversion_error(idx, format!("{}: {:?}", e, raw)))
}

/// Read a TEXT column through `FromStr` (decimals, enums)
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    parse_text(idx, &raw)
}

pub(crate) fn opt_parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_text(idx, &r)).transpose()
}

pub(crate) fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_time(idx, &raw)
}

pub(crate) fn opt_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_time(idx, &r)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_time_format_round_trip_and_ordering() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(1500);

        let a = to_db_time(&earlier);
        let b = to_db_time(&later);
        assert!(a < b);
        assert_eq!(a.len(), b.len());
        assert_eq!(parse_time(0, &a).unwrap().timestamp_millis(), earlier.timestamp_millis());
    }

    #[test]
    fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pricing.db");

        {
            let db = SqliteDb::new(&path, Duration::from_secs(2)).unwrap();
            db.insert_rates(&[MetalRate {
                symbol: Metal::Gold,
                rate_per_gram: dec!(6800),
                source: "metals_api".to_string(),
                recorded_at: Utc::now(),
            }])
            .unwrap();
        }

        let db = SqliteDb::new(&path, Duration::from_secs(2)).unwrap();
        assert_eq!(db.count_rates().unwrap(), 1);
        assert_eq!(
            db.latest_rate(Metal::Gold).unwrap().unwrap().rate_per_gram,
            dec!(6800)
        );
    }

    #[test]
    fn test_busy_connection_fails_closed() {
        let db = SqliteDb::open_in_memory(Duration::from_millis(20)).unwrap();
        let _held = db.conn.lock();

        assert!(matches!(db.latest_rates(), Err(AppError::Unavailable(_))));
    }
}
