//! Extraction engine: parsed content + classification into normalized
//! transaction candidates with a pipeline confidence score.
//!
//! Strategy selection is done once per document: tabular rows when
//! present, otherwise a bank-specific line profile, otherwise the
//! generic line scraper. Unparseable rows are dropped and counted, never
//! fabricated into zero-amount candidates.

mod lines;
mod tabular;

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::models::{
    fold, Bank, DocumentClassification, ExtractionMethod, ExtractionResult, ParsedContent,
    TransactionCandidate,
};
use crate::profiles;

pub fn extract(
    content: &ParsedContent,
    classification: &DocumentClassification,
    file_name: &str,
) -> ExtractionResult {
    let (candidates, skipped, strategy) = if content.has_rows() {
        let out = tabular::extract(
            &content.rows,
            profiles::REGION_DATE_ORDER,
            profiles::DEFAULT_CURRENCY,
        );
        (out.candidates, out.skipped, "tabular")
    } else if content.has_text() {
        let out = lines::extract(&content.text, classification.bank, profiles::DEFAULT_CURRENCY);
        let strategy = if out.bank_profile {
            "bank-lines"
        } else {
            "generic-lines"
        };
        (out.candidates, out.skipped, strategy)
    } else {
        (Vec::new(), 0, "empty")
    };

    debug!(
        file_name,
        strategy,
        candidates = candidates.len(),
        skipped,
        "extraction finished"
    );

    let pipeline_confidence = pipeline_confidence(&candidates);
    let bank_name_guess = (classification.bank != Bank::Unknown)
        .then(|| classification.bank.name().to_string());
    let statement_date = if content.has_text() {
        lines::statement_date(&content.text)
    } else {
        None
    };

    ExtractionResult {
        candidates,
        bank_name_guess,
        statement_date,
        pipeline_confidence,
        method: ExtractionMethod::Deterministic,
    }
}

/// Aggregate 0-100 quality estimate for a whole document: base 50, up to
/// 20 for candidate count, and up to 10 each for the fractions of
/// candidates with a date, a non-zero amount and a real description.
/// Zero candidates score 0, not 50.
pub fn pipeline_confidence(candidates: &[TransactionCandidate]) -> u8 {
    if candidates.is_empty() {
        return 0;
    }
    let n = candidates.len() as f64;
    let dated = candidates.iter().filter(|c| c.date.is_some()).count() as f64;
    let amounts = candidates.iter().filter(|c| c.amount != 0.0).count() as f64;
    let described = candidates
        .iter()
        .filter(|c| c.description.trim().len() > 3)
        .count() as f64;

    let score = 50.0
        + (n * 2.0).min(20.0)
        + 10.0 * dated / n
        + 10.0 * amounts / n
        + 10.0 * described / n;
    score.min(100.0) as u8
}

fn card_mask_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+\*+\s?\d{2,4}$").expect("card mask regex"))
}

fn trailing_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+\d{6,}$").expect("trailing ref regex"))
}

/// Derive a merchant from a raw description: fold, strip payment-channel
/// prefixes, trailing card masks and reference tails, collapse spaces.
/// Falls back to the folded description when stripping eats everything.
pub fn derive_merchant(description: &str) -> String {
    let mut merchant = fold(description).trim().to_string();
    loop {
        let mut stripped = false;
        for prefix in profiles::MERCHANT_PREFIXES {
            if let Some(rest) = merchant.strip_prefix(prefix) {
                merchant = rest.trim_start_matches([' ', '*', '-', ':']).to_string();
                stripped = true;
            }
        }
        if !stripped {
            break;
        }
    }
    let merchant = card_mask_re().replace_all(&merchant, "");
    let merchant = trailing_ref_re().replace_all(&merchant, "");
    let cleaned = merchant.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        fold(description).trim().to_string()
    } else {
        cleaned
    }
}
