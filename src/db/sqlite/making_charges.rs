//! Making-charge rule storage and resolution

use super::models::{MakingChargeRule, MakingChargeRuleUpdate, NewMakingChargeRule, RuleQuery};
use super::{opt_parse_column, opt_time_column, parse_column, time_column, to_db_time};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const RULE_COLUMNS: &str = "id, category_id, purity_id, charge_type, rate_value, minimum_charge,
    maximum_charge, weight_min, weight_max, effective_from, effective_to, is_active, description";

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<MakingChargeRule> {
    Ok(MakingChargeRule {
        id: row.get(0)?,
        category_id: row.get(1)?,
        purity_id: row.get(2)?,
        charge_type: parse_column(row, 3)?,
        rate_value: parse_column(row, 4)?,
        minimum_charge: parse_column(row, 5)?,
        maximum_charge: opt_parse_column(row, 6)?,
        weight_min: opt_parse_column(row, 7)?,
        weight_max: opt_parse_column(row, 8)?,
        effective_from: time_column(row, 9)?,
        effective_to: opt_time_column(row, 10)?,
        is_active: row.get::<_, i32>(11)? == 1,
        description: row.get(12)?,
    })
}

/// List rules, newest first
pub fn list_rules(conn: &Connection, include_inactive: bool) -> Result<Vec<MakingChargeRule>> {
    let sql = if include_inactive {
        format!("SELECT {} FROM making_charge_rules ORDER BY id DESC", RULE_COLUMNS)
    } else {
        format!(
            "SELECT {} FROM making_charge_rules WHERE is_active = 1 ORDER BY id DESC",
            RULE_COLUMNS
        )
    };

    let mut stmt = conn.prepare(&sql)?;
    let rules = stmt
        .query_map([], rule_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rules)
}

/// Get a rule by id
pub fn get_rule(conn: &Connection, id: i64) -> Result<Option<MakingChargeRule>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM making_charge_rules WHERE id = ?1", RULE_COLUMNS),
        params![id],
        rule_from_row,
    );

    match result {
        Ok(rule) => Ok(Some(rule)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Create a new rule
pub fn create_rule(conn: &Connection, new_rule: NewMakingChargeRule) -> Result<MakingChargeRule> {
    let mut rule = new_rule.into_rule(0, Utc::now());
    rule.validate()?;

    conn.execute(
        "INSERT INTO making_charge_rules (
            category_id, purity_id, charge_type, rate_value, minimum_charge, maximum_charge,
            weight_min, weight_max, effective_from, effective_to, is_active, description
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            rule.category_id,
            rule.purity_id,
            rule.charge_type.as_str(),
            rule.rate_value.to_string(),
            rule.minimum_charge.to_string(),
            rule.maximum_charge.map(|v| v.to_string()),
            rule.weight_min.map(|v| v.to_string()),
            rule.weight_max.map(|v| v.to_string()),
            to_db_time(&rule.effective_from),
            rule.effective_to.as_ref().map(to_db_time),
            rule.is_active as i32,
            rule.description,
        ],
    )?;

    rule.id = conn.last_insert_rowid();
    tracing::info!(
        "Created making-charge rule {} ({} {})",
        rule.id,
        rule.charge_type,
        rule.rate_value
    );

    Ok(rule)
}

/// Apply a typed partial update
pub fn update_rule(
    conn: &Connection,
    id: i64,
    update: MakingChargeRuleUpdate,
) -> Result<MakingChargeRule> {
    let mut rule = get_rule(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("Making-charge rule {}", id)))?;

    if update.is_empty() {
        return Ok(rule);
    }

    update.apply_to(&mut rule);
    rule.validate()?;

    conn.execute(
        "UPDATE making_charge_rules SET
            category_id = ?1,
            purity_id = ?2,
            charge_type = ?3,
            rate_value = ?4,
            minimum_charge = ?5,
            maximum_charge = ?6,
            weight_min = ?7,
            weight_max = ?8,
            effective_from = ?9,
            effective_to = ?10,
            is_active = ?11,
            description = ?12,
            updated_at = datetime('now')
         WHERE id = ?13",
        params![
            rule.category_id,
            rule.purity_id,
            rule.charge_type.as_str(),
            rule.rate_value.to_string(),
            rule.minimum_charge.to_string(),
            rule.maximum_charge.map(|v| v.to_string()),
            rule.weight_min.map(|v| v.to_string()),
            rule.weight_max.map(|v| v.to_string()),
            to_db_time(&rule.effective_from),
            rule.effective_to.as_ref().map(to_db_time),
            rule.is_active as i32,
            rule.description,
            id,
        ],
    )?;

    tracing::info!("Updated making-charge rule {}", id);
    Ok(rule)
}

/// Delete a rule
pub fn delete_rule(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn.execute("DELETE FROM making_charge_rules WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Find the single applicable rule.
///
/// Precedence: exact (category, purity), category-only, purity-only, then
/// generic. Within a tier the latest `effective_from` wins. Rules with a
/// weight range are skipped when the weight falls outside it.
pub fn resolve_rule(
    conn: &Connection,
    query: &RuleQuery,
    now: DateTime<Utc>,
) -> Result<Option<MakingChargeRule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM making_charge_rules
         WHERE is_active = 1
           AND effective_from <= ?1
           AND (effective_to IS NULL OR effective_to >= ?1)
           AND (category_id = ?2 OR category_id IS NULL)
           AND (purity_id = ?3 OR purity_id IS NULL)
         ORDER BY (category_id IS NULL) ASC,
                  (purity_id IS NULL) ASC,
                  effective_from DESC,
                  id DESC",
        RULE_COLUMNS
    ))?;

    let candidates = stmt.query_map(
        params![to_db_time(&now), query.category_id, query.purity_id],
        rule_from_row,
    )?;

    for candidate in candidates {
        let rule = candidate?;
        if query.weight.map_or(true, |w| rule.matches_weight(w)) {
            return Ok(Some(rule));
        }
    }

    Ok(None)
}
