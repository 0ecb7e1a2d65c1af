use chrono::NaiveDate;

/// Declared day/month ordering for a source. Only pre-declared orderings
/// are ever accepted; there is no "guess any date" fallback, because a
/// wrong guess silently swaps day and month for two-digit-leading values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    DayFirst,
    MonthFirst,
}

/// Parse a numeric token under mixed regional conventions.
///
/// Statements in this domain mix "1.234,56" (point grouping, comma
/// decimal) with "1,234.56". The rule: when both separators appear, the
/// one occurring later in the string is the decimal separator. With a
/// single separator kind, a repeated separator is grouping; a single
/// occurrence with exactly 3 trailing digits in a valid grouping shape
/// (1-3 leading digits) is grouping, otherwise it is the decimal point.
/// Returns None for tokens that are not numeric at all; a wrong guess
/// here silently corrupts amounts, so no stdlib locale-fixed parse.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut s = raw.trim().to_string();
    for token in ["U$S", "u$s", "US$", "ARS", "USD", "$"] {
        s = s.replace(token, "");
    }
    let s = s.replace('"', "").replace('\u{a0}', " ");
    let mut s = s.trim();

    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest.trim();
    } else if let Some(rest) = s.strip_suffix('-') {
        // some statements print debits with a trailing minus
        negative = true;
        s = rest.trim();
    }
    if let Some(rest) = s.strip_prefix('+') {
        s = rest.trim();
    }

    if s.is_empty() || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if s.chars().any(|c| !c.is_ascii_digit() && c != '.' && c != ',') {
        return None;
    }

    let normalized = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) => {
            if dot > comma {
                s.replace(',', "")
            } else {
                s.replace('.', "").replace(',', ".")
            }
        }
        (Some(_), None) => normalize_single_separator(s, '.'),
        (None, Some(_)) => normalize_single_separator(s, ','),
        (None, None) => s.to_string(),
    };

    let value: f64 = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}

fn normalize_single_separator(s: &str, sep: char) -> String {
    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() > 2 {
        // repeated separator can only be grouping: 1.234.567
        return parts.concat();
    }
    let (head, tail) = (parts[0], parts[1]);
    if tail.len() == 3 && (1..=3).contains(&head.len()) {
        // grouping shape: 1.234 / 12,345
        format!("{head}{tail}")
    } else if sep == ',' {
        format!("{head}.{tail}")
    } else {
        s.to_string()
    }
}

/// Format an amount back under a locale convention, 2 decimal places.
/// `decimal_comma` selects "1.234,56"; otherwise "1,234.56".
pub fn format_amount(value: f64, decimal_comma: bool) -> String {
    let negative = value < 0.0;
    let fixed = format!("{:.2}", value.abs());
    let (int_part, dec_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let grouping = if decimal_comma { '.' } else { ',' };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(grouping);
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();
    let decimal = if decimal_comma { ',' } else { '.' };
    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped}{decimal}{dec_part}")
}

/// Parse a date token under a declared ordering. ISO `YYYY-MM-DD` is
/// always accepted; otherwise `DD/MM/YYYY`, `DD-MM-YYYY` and `DD/MM/YY`
/// (or the month-first equivalents) per the declared order. Anything
/// else is a parse failure and the caller drops the row.
pub fn parse_date(raw: &str, order: DateOrder) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    let sep = if raw.contains('/') {
        '/'
    } else if raw.contains('-') {
        '-'
    } else {
        return None;
    };
    let parts: Vec<&str> = raw.split(sep).collect();
    if parts.len() != 3 {
        return None;
    }
    let a: u32 = parts[0].trim().parse().ok()?;
    let b: u32 = parts[1].trim().parse().ok()?;
    let year_raw = parts[2].trim();
    if year_raw.len() != 2 && year_raw.len() != 4 {
        return None;
    }
    let mut year: i32 = year_raw.parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    let (day, month) = match order {
        DateOrder::DayFirst => (a, b),
        DateOrder::MonthFirst => (b, a),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}
