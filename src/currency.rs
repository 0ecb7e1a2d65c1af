//! Best-effort conversion to the reference currency. Rates are cached
//! per (date, from, to); the external source is only consulted on a
//! cache miss. Any failure yields None — conversion never blocks a
//! transaction from being persisted.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

/// External rate provider, consumed behind a trait and only on cache
/// misses.
pub trait RateSource {
    fn fetch_rate(&self, date: NaiveDate, from: &str, to: &str) -> anyhow::Result<f64>;

    /// Recorded in the cache's `source` column.
    fn name(&self) -> &'static str {
        "external"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Conversion {
    pub amount: f64,
    pub rate: f64,
    pub rate_date: NaiveDate,
}

pub fn to_reference_currency(
    conn: &Connection,
    source: Option<&dyn RateSource>,
    amount: f64,
    currency: &str,
    date: NaiveDate,
    reference_currency: &str,
) -> Option<Conversion> {
    if currency.eq_ignore_ascii_case(reference_currency) {
        return Some(Conversion {
            amount,
            rate: 1.0,
            rate_date: date,
        });
    }

    let iso = date.format("%Y-%m-%d").to_string();
    match conn
        .query_row(
            "SELECT rate FROM exchange_rates \
             WHERE date = ?1 AND from_currency = ?2 AND to_currency = ?3",
            params![iso, currency, reference_currency],
            |row| row.get::<_, f64>(0),
        )
        .optional()
    {
        Ok(Some(rate)) => return Some(convert(amount, rate, date)),
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "exchange rate cache lookup failed");
            return None;
        }
    }

    let Some(source) = source else {
        debug!(currency, "no rate source wired; amount left unconverted");
        return None;
    };
    match source.fetch_rate(date, currency, reference_currency) {
        Ok(rate) if rate > 0.0 => {
            // idempotent upsert; a concurrent run caching first is fine
            if let Err(e) = conn.execute(
                "INSERT OR IGNORE INTO exchange_rates (date, from_currency, to_currency, rate, source) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![iso, currency, reference_currency, rate, source.name()],
            ) {
                warn!(error = %e, "failed to cache exchange rate");
            }
            Some(convert(amount, rate, date))
        }
        Ok(rate) => {
            warn!(rate, currency, "rate source returned a non-positive rate");
            None
        }
        Err(e) => {
            warn!(error = %e, currency, %date, "rate fetch failed; amount left unconverted");
            None
        }
    }
}

fn convert(amount: f64, rate: f64, rate_date: NaiveDate) -> Conversion {
    Conversion {
        amount: (amount * rate * 100.0).round() / 100.0,
        rate,
        rate_date,
    }
}
