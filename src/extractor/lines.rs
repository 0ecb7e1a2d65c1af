//! Free-text line extraction: a bank-specific line profile when the
//! classifier resolved the bank, otherwise a generic scraper that looks
//! for a date token and the last currency-shaped token on each line.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::locale::{self, DateOrder};
use crate::models::{fold, Bank, TransactionCandidate};
use crate::profiles;

pub(crate) struct LineExtraction {
    pub candidates: Vec<TransactionCandidate>,
    pub skipped: usize,
    pub bank_profile: bool,
}

pub(crate) fn extract(text: &str, bank: Bank, default_currency: &str) -> LineExtraction {
    if let Some((re, date_order, version)) = profiles::line_profile(bank) {
        let out = extract_with_profile(text, re, date_order, default_currency);
        if !out.candidates.is_empty() {
            return out;
        }
        debug!(
            bank = bank.key(),
            version, "bank line profile matched nothing, falling back to generic"
        );
    }
    extract_generic(text, default_currency)
}

fn extract_with_profile(
    text: &str,
    re: &Regex,
    date_order: DateOrder,
    default_currency: &str,
) -> LineExtraction {
    let mut candidates = Vec::new();
    let mut skipped = 0usize;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = re.captures(line) else {
            // headers, footers and wrapped detail lines; not movements
            continue;
        };
        let Some(date) = locale::parse_date(&caps["date"], date_order) else {
            skipped += 1;
            debug!(line, "matched line had an unparseable date");
            continue;
        };
        let Some(amount) = locale::parse_amount(&caps["amount"]) else {
            skipped += 1;
            debug!(line, "matched line had an unparseable amount");
            continue;
        };
        let description = caps["desc"].trim().to_string();
        let reference = caps
            .name("ref")
            .map(|m| m.as_str().trim().to_string())
            .filter(|r| !r.is_empty());
        candidates.push(TransactionCandidate {
            date: Some(date),
            merchant: super::derive_merchant(&description),
            description,
            amount,
            currency: default_currency.to_string(),
            reference,
            raw_source: line.to_string(),
            extraction_confidence: profiles::CONFIDENCE_BANK_LINE,
            category_id: None,
            amount_reference: None,
            needs_review: false,
        });
    }
    LineExtraction {
        candidates,
        skipped,
        bank_profile: true,
    }
}

fn date_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{4}-\d{2}-\d{2}|\d{2}[/-]\d{2}[/-]\d{2,4})\b").expect("date token regex")
    })
}

fn amount_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[-+]?\(?\$?\s?\d+(?:[.,]\d{3})*[.,]\d{2}\)?-?").expect("amount token regex")
    })
}

fn extract_generic(text: &str, default_currency: &str) -> LineExtraction {
    let mut candidates = Vec::new();
    let mut skipped = 0usize;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(date_match) = date_token_re().find(line) else {
            continue;
        };
        let amounts: Vec<_> = amount_token_re().find_iter(line).collect();
        let Some(amount_match) = amounts.last() else {
            continue;
        };
        let Some(date) = locale::parse_date(date_match.as_str(), DateOrder::DayFirst) else {
            skipped += 1;
            continue;
        };
        let Some(amount) = locale::parse_amount(amount_match.as_str()) else {
            skipped += 1;
            continue;
        };
        let mut description = line.to_string();
        for m in amounts.iter().rev() {
            description.replace_range(m.range(), "");
        }
        description = description.replacen(date_match.as_str(), "", 1);
        let description = description.split_whitespace().collect::<Vec<_>>().join(" ");
        candidates.push(TransactionCandidate {
            date: Some(date),
            merchant: super::derive_merchant(&description),
            description,
            amount,
            currency: default_currency.to_string(),
            reference: None,
            raw_source: line.to_string(),
            extraction_confidence: profiles::CONFIDENCE_GENERIC_LINE,
            category_id: None,
            amount_reference: None,
            needs_review: false,
        });
    }
    LineExtraction {
        candidates,
        skipped,
        bank_profile: false,
    }
}

/// Statement closing/period date from the document header, when one of
/// the known phrases is present.
pub(crate) fn statement_date(text: &str) -> Option<NaiveDate> {
    let folded = fold(text);
    for re in profiles::statement_date_patterns() {
        if let Some(caps) = re.captures(&folded) {
            if let Some(date) = locale::parse_date(&caps[1], DateOrder::DayFirst) {
                return Some(date);
            }
        }
    }
    None
}
