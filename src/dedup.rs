//! Deduplication and persistence gate. Candidates whose reference number
//! was already stored for the owner are excluded; candidates without a
//! reference have no natural key and always pass. A late uniqueness
//! conflict from a concurrent run counts as a duplicate, not a failure.

use std::collections::HashSet;

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::TransactionCandidate;

pub struct InsertReport {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Non-empty reference numbers already persisted for the owner.
pub fn existing_references(conn: &Connection, owner_id: i64) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT reference_number FROM transactions \
         WHERE owner_id = ?1 AND reference_number IS NOT NULL AND reference_number != ''",
    )?;
    let refs = stmt
        .query_map([owner_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(refs)
}

/// Insert a batch for one owner, excluding duplicates by reference
/// number. The whole batch goes in one transaction.
pub fn insert_batch(
    conn: &Connection,
    owner_id: i64,
    document_id: Option<i64>,
    candidates: &[TransactionCandidate],
) -> Result<InsertReport> {
    let mut seen = existing_references(conn, owner_id)?;
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0usize;
    let mut duplicates = 0usize;

    for candidate in candidates {
        let reference = candidate
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        if let Some(r) = reference {
            if seen.contains(r) {
                duplicates += 1;
                debug!(reference = r, "duplicate reference, excluded from insert");
                continue;
            }
        }
        let outcome = tx.execute(
            "INSERT INTO transactions (owner_id, document_id, date, description, merchant, \
             amount, currency, amount_reference, reference_number, category_id, needs_review, \
             extraction_confidence, raw_source) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                owner_id,
                document_id,
                candidate.date.map(|d| d.format("%Y-%m-%d").to_string()),
                candidate.description,
                candidate.merchant,
                candidate.amount,
                candidate.currency,
                candidate.amount_reference,
                reference,
                candidate.category_id,
                candidate.needs_review,
                candidate.extraction_confidence,
                candidate.raw_source,
            ],
        );
        match outcome {
            Ok(_) => {
                inserted += 1;
                if let Some(r) = reference {
                    seen.insert(r.to_string());
                }
            }
            // only a lost race on the reference index counts as a
            // duplicate; other constraint failures (foreign keys) propagate
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                warn!(reference = ?reference, "uniqueness conflict on insert, counted as duplicate");
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tx.commit()?;
    Ok(InsertReport {
        inserted,
        duplicates,
    })
}
