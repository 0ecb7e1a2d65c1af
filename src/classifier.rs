//! Document-type and bank-identity classification over parsed text.
//!
//! Both catalogs are static configuration; adding a document type or a
//! bank means appending an entry. Type and bank are scored independently
//! so a document can resolve one and not the other.

use tracing::debug;

use crate::models::{fold, Bank, DocType, DocumentClassification};

struct TypeGroup {
    doc_type: DocType,
    priority: u8,
    patterns: &'static [&'static str],
}

// Ordered catalog; patterns are folded substrings.
const TYPE_GROUPS: &[TypeGroup] = &[
    TypeGroup {
        doc_type: DocType::CreditCardStatement,
        priority: 80,
        patterns: &[
            "TARJETA DE CREDITO",
            "RESUMEN DE TARJETA",
            "PAGO MINIMO",
            "CIERRE ACTUAL",
            "LIMITE DE COMPRA",
            "VISA",
            "MASTERCARD",
        ],
    },
    TypeGroup {
        doc_type: DocType::BankStatement,
        priority: 70,
        patterns: &[
            "RESUMEN DE CUENTA",
            "EXTRACTO BANCARIO",
            "CAJA DE AHORRO",
            "CUENTA CORRIENTE",
            "SALDO ANTERIOR",
            "SALDO ACTUAL",
            "CBU",
            "MOVIMIENTOS",
        ],
    },
    TypeGroup {
        doc_type: DocType::Receipt,
        priority: 50,
        patterns: &[
            "COMPROBANTE DE PAGO",
            "FACTURA",
            "TICKET",
            "TOTAL A PAGAR",
            "CONDICION IVA",
        ],
    },
    TypeGroup {
        doc_type: DocType::TransactionExport,
        priority: 40,
        patterns: &["FECHA", "DESCRIPCION", "IMPORTE", "SALDO", "DEBITO", "CREDITO"],
    },
];

// Flat ordered bank catalog; first textual match wins, no scoring.
const BANK_KEYWORDS: &[(Bank, &[&str])] = &[
    (Bank::Galicia, &["BANCO GALICIA", "GALICIA"]),
    (Bank::Santander, &["SANTANDER", "BANCO RIO"]),
    (Bank::Bbva, &["BBVA", "BANCO FRANCES"]),
    (Bank::Macro, &["BANCO MACRO"]),
    (Bank::Nacion, &["BANCO DE LA NACION", "BANCO NACION"]),
    (Bank::MercadoPago, &["MERCADO PAGO", "MERCADOPAGO", "MERPAGO"]),
    (Bank::Uala, &["UALA"]),
    (Bank::Brubank, &["BRUBANK"]),
];

/// Classify parsed text. No match is not an error: downstream stages
/// tolerate an unknown type and an unknown bank.
pub fn classify(text: &str) -> DocumentClassification {
    if text.trim().is_empty() {
        return DocumentClassification::unknown();
    }
    let folded = fold(text);

    let mut best: Option<(DocType, u8, u8, Vec<&'static str>)> = None;
    for group in TYPE_GROUPS {
        let matched: Vec<&'static str> = group
            .patterns
            .iter()
            .filter(|p| folded.contains(**p))
            .copied()
            .collect();
        if matched.is_empty() {
            continue;
        }
        let confidence = group_confidence(matched.len(), group.patterns.len(), group.priority);
        let better = match &best {
            None => true,
            Some((_, best_conf, best_prio, _)) => {
                confidence > *best_conf || (confidence == *best_conf && group.priority > *best_prio)
            }
        };
        if better {
            best = Some((group.doc_type, confidence, group.priority, matched));
        }
    }

    let (doc_type, type_confidence, matched_patterns) = match best {
        Some((doc_type, confidence, _, matched)) => (doc_type, confidence, matched),
        None => (DocType::Unknown, 0, Vec::new()),
    };

    let (bank, bank_confidence) = BANK_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| folded.contains(k)))
        .map(|(bank, _)| (*bank, 100))
        .unwrap_or((Bank::Unknown, 0));

    debug!(
        doc_type = doc_type.key(),
        type_confidence,
        bank = bank.key(),
        "document classified"
    );

    DocumentClassification {
        doc_type,
        type_confidence,
        matched_patterns,
        bank,
        bank_confidence,
    }
}

fn group_confidence(matched: usize, total: usize, priority: u8) -> u8 {
    let score = matched as f64 / total as f64 * 50.0
        + f64::from(priority) / 2.0
        + matched as f64 * 5.0;
    score.min(100.0) as u8
}
