//! Static extraction configuration: column synonyms, per-bank line
//! patterns and confidence constants. New banks and layouts are added by
//! appending rows here, not by writing new types.

use std::sync::OnceLock;

use regex::Regex;

use crate::locale::DateOrder;
use crate::models::Bank;

/// Default currency of the region's statements.
pub const DEFAULT_CURRENCY: &str = "ARS";

/// Declared day/month ordering for the region.
pub const REGION_DATE_ORDER: DateOrder = DateOrder::DayFirst;

// Per-candidate confidence constants. Calibration data: tabular layouts
// are the most reliable, generic line scraping the least.
pub const CONFIDENCE_TABULAR: u8 = 90;
pub const CONFIDENCE_BANK_LINE: u8 = 75;
pub const CONFIDENCE_GENERIC_LINE: u8 = 55;

// Column-name synonyms, folded (uppercase, accent-stripped). Matching is
// by containment, so "DEBITO" also finds "DEBITO EN $".
pub const DATE_COLUMNS: &[&str] = &["FECHA", "DATE"];
pub const DESCRIPTION_COLUMNS: &[&str] = &[
    "DESCRIPCION",
    "CONCEPTO",
    "DETALLE",
    "MOVIMIENTO",
    "LEYENDA",
    "DESCRIPTION",
    "PAYEE",
];
pub const DEBIT_COLUMNS: &[&str] = &["DEBITO", "EGRESO", "CARGO", "RETIRO", "DEBIT"];
pub const CREDIT_COLUMNS: &[&str] = &["CREDITO", "INGRESO", "ABONO", "DEPOSITO", "CREDIT"];
pub const AMOUNT_COLUMNS: &[&str] = &["IMPORTE", "MONTO", "VALOR", "AMOUNT"];
pub const BALANCE_COLUMNS: &[&str] = &["SALDO", "BALANCE"];
pub const REFERENCE_COLUMNS: &[&str] = &["REFERENCIA", "COMPROBANTE", "NRO", "REFERENCE"];
pub const CURRENCY_COLUMNS: &[&str] = &["MONEDA", "DIVISA", "CURRENCY"];

/// Keywords that mark a spreadsheet row as the real header row. The true
/// header is often several rows below decorative preamble.
pub fn header_keywords() -> impl Iterator<Item = &'static str> {
    DATE_COLUMNS
        .iter()
        .chain(DESCRIPTION_COLUMNS)
        .chain(DEBIT_COLUMNS)
        .chain(CREDIT_COLUMNS)
        .chain(AMOUNT_COLUMNS)
        .chain(BALANCE_COLUMNS)
        .copied()
}

/// Payment-channel prefixes stripped (after folding) when deriving the
/// merchant from a raw description.
pub const MERCHANT_PREFIXES: &[&str] = &[
    "MERPAGO*",
    "MERPAGO",
    "MP*",
    "PAGO QR",
    "COMPRA VISA DEBITO",
    "COMPRA CON TARJETA",
    "COMPRA TARJETA",
    "DEBITO AUTOMATICO",
    "DEBITO INMEDIATO",
    "DEBIN",
    "PAGO EN COMERCIO",
];

/// A named, versioned line-pattern rule set for one bank's free-text
/// statements. The pattern must expose `date`, `desc` and `amount`
/// capture groups; `ref` and `balance` are optional.
pub struct LineProfile {
    pub bank: Bank,
    pub version: u16,
    pub pattern: &'static str,
    pub date_order: DateOrder,
}

pub const LINE_PROFILES: &[LineProfile] = &[
    // Galicia: "02/01/24  COMPRA VISA DEBITO NETFLIX  00012345  -1.234,56  45.678,90"
    LineProfile {
        bank: Bank::Galicia,
        version: 1,
        pattern: r"^(?P<date>\d{2}/\d{2}/\d{2,4})\s+(?P<desc>.+?)(?:\s+(?P<ref>\d{6,}))?\s+(?P<amount>-?\d[\d.]*,\d{2}-?)\s+(?P<balance>-?\d[\d.]*,\d{2})\s*$",
        date_order: DateOrder::DayFirst,
    },
    // Santander: "02-01-2024  TRANSFERENCIA RECIBIDA  12345678  1.234,56  45.678,90"
    LineProfile {
        bank: Bank::Santander,
        version: 1,
        pattern: r"^(?P<date>\d{2}-\d{2}-\d{4})\s+(?P<desc>.+?)(?:\s+(?P<ref>\d{6,}))?\s+(?P<amount>-?\d[\d.]*,\d{2})\s+(?P<balance>-?\d[\d.]*,\d{2})\s*$",
        date_order: DateOrder::DayFirst,
    },
    // BBVA: "02/01/2024 PAGO SERVICIO EDESUR -3.500,00 12.345,67"
    LineProfile {
        bank: Bank::Bbva,
        version: 1,
        pattern: r"^(?P<date>\d{2}/\d{2}/\d{4})\s+(?P<desc>.+?)\s+(?P<amount>-?\d[\d.]*,\d{2})\s+(?P<balance>-?\d[\d.]*,\d{2})\s*$",
        date_order: DateOrder::DayFirst,
    },
    // Mercado Pago: "02-01-2024  PAGO QR ALMACEN DON JOSE  $ -1.500,00  100200300"
    LineProfile {
        bank: Bank::MercadoPago,
        version: 1,
        pattern: r"^(?P<date>\d{2}-\d{2}-\d{4})\s+(?P<desc>.+?)\s+\$?\s?(?P<amount>-?\d[\d.]*,\d{2})(?:\s+(?P<ref>\d{8,}))?\s*$",
        date_order: DateOrder::DayFirst,
    },
];

fn compiled_profiles() -> &'static Vec<(Bank, u16, DateOrder, Regex)> {
    static COMPILED: OnceLock<Vec<(Bank, u16, DateOrder, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        LINE_PROFILES
            .iter()
            .map(|p| {
                let re = Regex::new(p.pattern).expect("line profile pattern");
                (p.bank, p.version, p.date_order, re)
            })
            .collect()
    })
}

/// Line profile for a bank, if one is configured.
pub fn line_profile(bank: Bank) -> Option<(&'static Regex, DateOrder, u16)> {
    compiled_profiles()
        .iter()
        .find(|(b, _, _, _)| *b == bank)
        .map(|(_, version, order, re)| (re, *order, *version))
}

/// Header phrases that carry the statement closing/period date. Applied
/// to folded text; group 1 captures the date token.
pub const STATEMENT_DATE_PATTERNS: &[&str] = &[
    r"CIERRE ACTUAL[:\s]+(\d{2}/\d{2}/\d{2,4})",
    r"RESUMEN AL[:\s]+(\d{2}/\d{2}/\d{2,4})",
    r"EXTRACTO AL[:\s]+(\d{2}/\d{2}/\d{2,4})",
    r"PERIODO[^\n]*AL\s+(\d{2}/\d{2}/\d{2,4})",
];

pub fn statement_date_patterns() -> &'static Vec<Regex> {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        STATEMENT_DATE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("statement date pattern"))
            .collect()
    })
}
