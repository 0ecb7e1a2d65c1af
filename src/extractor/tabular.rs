//! Tabular extraction: detect a known column-set signature on the first
//! row, then map every row into a candidate. Rows whose date or amount
//! cannot be parsed under the declared locale are dropped and counted.

use tracing::debug;

use crate::locale::{self, DateOrder};
use crate::models::{fold, RowRecord, TransactionCandidate};
use crate::profiles;

pub(crate) struct TabularExtraction {
    pub candidates: Vec<TransactionCandidate>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnSignature {
    /// Distinct debit and credit columns; debit values become negative.
    DebitCredit,
    /// Combined signed amount plus a running balance column.
    AmountBalance,
    /// Fallback: generic synonym matching for date/description/amount.
    Generic,
}

fn detect_signature(row: &RowRecord) -> ColumnSignature {
    let has = |synonyms: &[&str]| row.get_any(synonyms).is_some();
    // value-date columns ("FECHA VALOR") must not pass for amount columns
    let has_amount = row
        .get_any_excluding(profiles::AMOUNT_COLUMNS, profiles::DATE_COLUMNS)
        .is_some();
    if has(profiles::DEBIT_COLUMNS) && has(profiles::CREDIT_COLUMNS) {
        ColumnSignature::DebitCredit
    } else if has_amount && has(profiles::BALANCE_COLUMNS) {
        ColumnSignature::AmountBalance
    } else {
        ColumnSignature::Generic
    }
}

pub(crate) fn extract(
    rows: &[RowRecord],
    date_order: DateOrder,
    default_currency: &str,
) -> TabularExtraction {
    let Some(first) = rows.first() else {
        return TabularExtraction {
            candidates: Vec::new(),
            skipped: 0,
        };
    };
    let signature = detect_signature(first);
    debug!(?signature, rows = rows.len(), "tabular signature detected");

    let mut candidates = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        match extract_row(row, signature, date_order, default_currency) {
            Some(candidate) => candidates.push(candidate),
            None => {
                skipped += 1;
                debug!(?row, "row skipped");
            }
        }
    }
    TabularExtraction { candidates, skipped }
}

fn extract_row(
    row: &RowRecord,
    signature: ColumnSignature,
    date_order: DateOrder,
    default_currency: &str,
) -> Option<TransactionCandidate> {
    let (_, date_raw) = row.get_any(profiles::DATE_COLUMNS)?;
    let date = locale::parse_date(date_raw, date_order)?;

    let description = row
        .get_any(profiles::DESCRIPTION_COLUMNS)
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default();
    let folded = fold(&description);
    if folded.contains("SALDO ANTERIOR") || folded.contains("SALDO FINAL") {
        // balance summary rows are not transactions
        return None;
    }

    let amount = match signature {
        ColumnSignature::DebitCredit => {
            let debit = row
                .get_any(profiles::DEBIT_COLUMNS)
                .map(|(_, v)| v)
                .filter(|v| !v.trim().is_empty())
                .and_then(locale::parse_amount);
            let credit = row
                .get_any(profiles::CREDIT_COLUMNS)
                .map(|(_, v)| v)
                .filter(|v| !v.trim().is_empty())
                .and_then(locale::parse_amount);
            match (debit, credit) {
                (Some(d), None) => Some(-d.abs()),
                (None, Some(c)) => Some(c.abs()),
                // both populated: the larger magnitude is the movement
                (Some(d), Some(c)) => {
                    if d.abs() >= c.abs() {
                        Some(-d.abs())
                    } else {
                        Some(c.abs())
                    }
                }
                (None, None) => None,
            }
        }
        ColumnSignature::AmountBalance | ColumnSignature::Generic => row
            .get_any_excluding(profiles::AMOUNT_COLUMNS, profiles::DATE_COLUMNS)
            .and_then(|(_, v)| locale::parse_amount(v))
            .or_else(|| {
                row.get_any(profiles::DEBIT_COLUMNS)
                    .and_then(|(_, v)| locale::parse_amount(v))
                    .map(|d| -d.abs())
            })
            .or_else(|| {
                row.get_any(profiles::CREDIT_COLUMNS)
                    .and_then(|(_, v)| locale::parse_amount(v))
                    .map(|c| c.abs())
            }),
    }?;

    let reference = row
        .get_any(profiles::REFERENCE_COLUMNS)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let currency = row
        .get_any(profiles::CURRENCY_COLUMNS)
        .map(|(_, v)| fold(v.trim()))
        .filter(|v| !v.is_empty())
        .map(|v| {
            if v.contains("USD") || v.contains("U$S") || v.contains("DOLAR") {
                "USD".to_string()
            } else {
                default_currency.to_string()
            }
        })
        .unwrap_or_else(|| default_currency.to_string());

    Some(TransactionCandidate {
        date: Some(date),
        merchant: super::derive_merchant(&description),
        description,
        amount,
        currency,
        reference,
        raw_source: serde_json::to_string(row).unwrap_or_default(),
        extraction_confidence: profiles::CONFIDENCE_TABULAR,
        category_id: None,
        amount_reference: None,
        needs_review: false,
    })
}
