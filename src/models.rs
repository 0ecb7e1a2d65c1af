use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Uppercase and strip the Spanish accents that show up in statement
/// headers, so "Descripción" and "DESCRIPCION" compare equal.
pub(crate) fn fold(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'Á' | 'à' | 'À' => 'A',
            'é' | 'É' | 'è' | 'È' => 'E',
            'í' | 'Í' | 'ì' | 'Ì' => 'I',
            'ó' | 'Ó' | 'ò' | 'Ò' => 'O',
            'ú' | 'Ú' | 'ù' | 'Ù' | 'ü' | 'Ü' => 'U',
            'ñ' | 'Ñ' => 'N',
            _ => c.to_ascii_uppercase(),
        })
        .collect()
}

/// A document as handed to the pipeline by an upload handler. Immutable;
/// consumed once per run.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: i64,
    pub owner_id: i64,
    pub media_type: String,
    pub original_name: String,
    pub bytes: Vec<u8>,
}

/// One tabular row, with column order preserved. Header lookup is
/// case- and accent-insensitive, and matches on containment so that
/// "DEBITO EN $" is found by the synonym "DEBITO".
#[derive(Debug, Clone, Default, Serialize)]
pub struct RowRecord {
    fields: Vec<(String, String)>,
}

impl RowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, header: impl Into<String>, value: impl Into<String>) {
        self.fields.push((header.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.trim().is_empty())
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(h, _)| h.as_str())
    }

    /// Value of the first column whose folded header contains `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        let want = fold(name);
        self.fields
            .iter()
            .find(|(h, _)| fold(h).contains(&want))
            .map(|(_, v)| v.as_str())
    }

    /// First column (in column order) whose folded header matches any of
    /// the given synonyms. An exact folded match anywhere in the row wins
    /// over containment, so "FECHA VALOR" cannot shadow an "IMPORTE"
    /// column via the VALOR synonym. Returns the matched header and the
    /// value.
    pub fn get_any(&self, synonyms: &[&str]) -> Option<(&str, &str)> {
        self.get_any_excluding(synonyms, &[])
    }

    /// `get_any`, skipping columns whose folded header also matches one
    /// of the excluded synonyms.
    pub fn get_any_excluding(
        &self,
        synonyms: &[&str],
        excluded: &[&str],
    ) -> Option<(&str, &str)> {
        let excluded_header = |h: &str| {
            let folded = fold(h);
            excluded.iter().any(|e| folded.contains(e))
        };
        self.fields
            .iter()
            .filter(|(h, _)| !excluded_header(h))
            .find(|(h, _)| synonyms.iter().any(|s| fold(h) == *s))
            .or_else(|| {
                self.fields
                    .iter()
                    .filter(|(h, _)| !excluded_header(h))
                    .find(|(h, _)| {
                        let folded = fold(h);
                        synonyms.iter().any(|s| folded.contains(s))
                    })
            })
            .map(|(h, v)| (h.as_str(), v.as_str()))
    }
}

/// Output of the content parser: free text, tabular rows, or both.
#[derive(Debug, Clone, Default)]
pub struct ParsedContent {
    pub text: String,
    pub rows: Vec<RowRecord>,
}

impl ParsedContent {
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocType {
    BankStatement,
    CreditCardStatement,
    TransactionExport,
    Receipt,
    Unknown,
}

impl DocType {
    pub fn key(&self) -> &'static str {
        match self {
            Self::BankStatement => "bank_statement",
            Self::CreditCardStatement => "credit_card_statement",
            Self::TransactionExport => "transaction_export",
            Self::Receipt => "receipt",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bank {
    Galicia,
    Santander,
    Bbva,
    Macro,
    Nacion,
    MercadoPago,
    Uala,
    Brubank,
    Unknown,
}

impl Bank {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Galicia => "galicia",
            Self::Santander => "santander",
            Self::Bbva => "bbva",
            Self::Macro => "macro",
            Self::Nacion => "nacion",
            Self::MercadoPago => "mercadopago",
            Self::Uala => "uala",
            Self::Brubank => "brubank",
            Self::Unknown => "unknown",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Galicia => "Banco Galicia",
            Self::Santander => "Banco Santander",
            Self::Bbva => "BBVA",
            Self::Macro => "Banco Macro",
            Self::Nacion => "Banco de la Nación Argentina",
            Self::MercadoPago => "Mercado Pago",
            Self::Uala => "Ualá",
            Self::Brubank => "Brubank",
            Self::Unknown => "Unknown",
        }
    }
}

/// What the classifier decided a document is. Type and bank are scored
/// independently; either can be unresolved while the other is not.
#[derive(Debug, Clone)]
pub struct DocumentClassification {
    pub doc_type: DocType,
    pub type_confidence: u8,
    pub matched_patterns: Vec<&'static str>,
    pub bank: Bank,
    pub bank_confidence: u8,
}

impl DocumentClassification {
    pub fn unknown() -> Self {
        Self {
            doc_type: DocType::Unknown,
            type_confidence: 0,
            matched_patterns: Vec::new(),
            bank: Bank::Unknown,
            bank_confidence: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Debit,
    Credit,
}

/// A provisionally extracted transaction. Later stages only append
/// fields (category, converted amount, review flag); nothing rewrites
/// what an earlier stage produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCandidate {
    pub date: Option<NaiveDate>,
    pub description: String,
    pub merchant: String,
    /// Signed: negative is a debit, positive a credit.
    pub amount: f64,
    pub currency: String,
    pub reference: Option<String>,
    /// Opaque echo of the originating row or line, kept for audit.
    pub raw_source: String,
    pub extraction_confidence: u8,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub amount_reference: Option<f64>,
    #[serde(default)]
    pub needs_review: bool,
}

impl TransactionCandidate {
    /// Derived from the sign, so `amount < 0 ⟺ Debit` cannot drift.
    pub fn kind(&self) -> TransactionKind {
        if self.amount < 0.0 {
            TransactionKind::Debit
        } else {
            TransactionKind::Credit
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Deterministic,
    AiAssisted,
    Hybrid,
}

impl ExtractionMethod {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::AiAssisted => "ai_assisted",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Everything one extraction pass produced for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub candidates: Vec<TransactionCandidate>,
    pub bank_name_guess: Option<String>,
    pub statement_date: Option<NaiveDate>,
    pub pipeline_confidence: u8,
    pub method: ExtractionMethod,
}

impl ExtractionResult {
    pub fn empty() -> Self {
        Self {
            candidates: Vec::new(),
            bank_name_guess: None,
            statement_date: None,
            pipeline_confidence: 0,
            method: ExtractionMethod::Deterministic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Description,
    Merchant,
    Both,
}

impl MatchField {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Merchant => "merchant",
            Self::Both => "both",
        }
    }

    pub fn from_key(key: &str) -> Self {
        match key {
            "merchant" => Self::Merchant,
            "both" => Self::Both,
            _ => Self::Description,
        }
    }
}

/// One owner-defined categorization rule. Immutable once created;
/// evaluated in priority-descending order, ties broken by rowid.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub id: Option<i64>,
    pub owner_id: i64,
    pub keyword: String,
    pub match_field: MatchField,
    pub priority: i64,
    pub case_sensitive: bool,
    pub is_pattern: bool,
    pub category_id: i64,
}

/// Cached conversion rate, unique per (date, from, to). A cache, not a
/// ledger: rows are created lazily on first lookup miss.
#[derive(Debug, Clone)]
pub struct ExchangeRateEntry {
    pub date: NaiveDate,
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub source: Option<String>,
}
