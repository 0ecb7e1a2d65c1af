//! Per-owner, per-period quota for the high-cost extraction capability.
//! The check is read-only; consumption is a single conditional UPDATE so
//! concurrent pipelines can never push `used` past the limit.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct QuotaState {
    pub used: i64,
    pub limit: i64,
    pub period_key: String,
}

impl QuotaState {
    pub fn exhausted(&self) -> bool {
        self.used >= self.limit
    }

    pub fn remaining(&self) -> i64 {
        (self.limit - self.used).max(0)
    }
}

/// Calendar-month period key, e.g. "2024-01".
pub fn period_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Read the owner's quota state for a period. Never mutates; a missing
/// row means nothing was used yet.
pub fn check(conn: &Connection, owner_id: i64, period: &str, limit: i64) -> Result<QuotaState> {
    let used: i64 = conn
        .query_row(
            "SELECT used FROM ai_quota WHERE owner_id = ?1 AND period_key = ?2",
            params![owner_id, period],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    Ok(QuotaState {
        used,
        limit,
        period_key: period.to_string(),
    })
}

/// Consume one unit. The guarded UPDATE is atomic against concurrent
/// runs for the same owner; returns false when the limit was already
/// reached (a plain read-then-write here would be a race).
pub fn try_consume(conn: &Connection, owner_id: i64, period: &str, limit: i64) -> Result<bool> {
    // keep max_uses in step with the configured limit so a raised quota
    // takes effect mid-period
    conn.execute(
        "INSERT INTO ai_quota (owner_id, period_key, used, max_uses) VALUES (?1, ?2, 0, ?3) \
         ON CONFLICT(owner_id, period_key) DO UPDATE SET max_uses = excluded.max_uses",
        params![owner_id, period, limit],
    )?;
    let changed = conn.execute(
        "UPDATE ai_quota SET used = used + 1 \
         WHERE owner_id = ?1 AND period_key = ?2 AND used < max_uses",
        params![owner_id, period],
    )?;
    Ok(changed == 1)
}
