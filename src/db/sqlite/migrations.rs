//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_metal_rates", CREATE_METAL_RATES_TABLE)?;
    run_migration(conn, "002_making_charge_rules", CREATE_MAKING_CHARGE_RULES_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

// Decimal columns are TEXT so values round-trip exactly; timestamps are
// fixed-width UTC strings so they compare correctly as text.

const CREATE_METAL_RATES_TABLE: &str = r#"
CREATE TABLE metal_rates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    rate_per_gram TEXT NOT NULL,
    source TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_metal_rates_symbol ON metal_rates(symbol, id);
CREATE INDEX IF NOT EXISTS idx_metal_rates_recorded_at ON metal_rates(recorded_at);
"#;

const CREATE_MAKING_CHARGE_RULES_TABLE: &str = r#"
CREATE TABLE making_charge_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER,
    purity_id INTEGER,
    charge_type TEXT NOT NULL CHECK (charge_type IN ('percentage', 'per_gram', 'fixed')),
    rate_value TEXT NOT NULL,
    minimum_charge TEXT NOT NULL DEFAULT '0',
    maximum_charge TEXT,
    weight_min TEXT,
    weight_max TEXT,
    effective_from TEXT NOT NULL,
    effective_to TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_making_charge_rules_lookup
    ON making_charge_rules(category_id, purity_id, is_active);
"#;
