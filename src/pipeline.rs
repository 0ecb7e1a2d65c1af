//! End-to-end document processing: parse, classify, extract, escalate,
//! categorize, convert, persist. One call per uploaded document; the
//! outcome is always recorded in the `documents` table, including
//! failures.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::categorizer;
use crate::classifier;
use crate::content;
use crate::currency::{self, RateSource};
use crate::dedup;
use crate::error::Result;
use crate::escalation::{self, EnhancedExtractor};
use crate::extractor;
use crate::models::{ExtractionMethod, SourceDocument};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Completed,
    Failed,
}

/// What one pipeline run did, as reported back to the caller. The same
/// facts are persisted on the document row.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    pub inserted: usize,
    pub duplicates: usize,
    /// True when the identical file was already processed for this owner
    /// and the run stopped before extraction.
    pub duplicate_document: bool,
    pub pipeline_confidence: u8,
    pub method: ExtractionMethod,
    pub needs_review: bool,
    pub bank_name_guess: Option<String>,
    pub error: Option<String>,
}

impl ProcessOutcome {
    fn failed(error: String) -> Self {
        Self {
            status: ProcessStatus::Failed,
            inserted: 0,
            duplicates: 0,
            duplicate_document: false,
            pipeline_confidence: 0,
            method: ExtractionMethod::Deterministic,
            needs_review: false,
            bank_name_guess: None,
            error: Some(error),
        }
    }

    fn duplicate() -> Self {
        Self {
            status: ProcessStatus::Completed,
            inserted: 0,
            duplicates: 0,
            duplicate_document: true,
            pipeline_confidence: 0,
            method: ExtractionMethod::Deterministic,
            needs_review: false,
            bank_name_guess: None,
            error: None,
        }
    }
}

pub struct Pipeline<'a> {
    conn: &'a Connection,
    settings: Settings,
    enhanced: Option<&'a dyn EnhancedExtractor>,
    rates: Option<&'a dyn RateSource>,
}

impl<'a> Pipeline<'a> {
    pub fn new(conn: &'a Connection, settings: Settings) -> Self {
        Self {
            conn,
            settings,
            enhanced: None,
            rates: None,
        }
    }

    pub fn with_enhanced_extractor(mut self, extractor: &'a dyn EnhancedExtractor) -> Self {
        self.enhanced = Some(extractor);
        self
    }

    pub fn with_rate_source(mut self, source: &'a dyn RateSource) -> Self {
        self.rates = Some(source);
        self
    }

    /// Process one uploaded document. Never returns Err: failures are
    /// recorded on the document row and reported in the outcome.
    pub fn process_document(&self, doc: &SourceDocument) -> ProcessOutcome {
        let checksum = compute_checksum(&doc.bytes);

        match self.already_processed(doc.owner_id, &checksum) {
            Ok(true) => {
                info!(
                    owner_id = doc.owner_id,
                    file_name = %doc.original_name,
                    "identical document already processed; skipping"
                );
                return ProcessOutcome::duplicate();
            }
            Ok(false) => {}
            Err(e) => return ProcessOutcome::failed(e.to_string()),
        }

        match self.run(doc, &checksum) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    owner_id = doc.owner_id,
                    file_name = %doc.original_name,
                    error = %e,
                    "document processing failed"
                );
                let message = e.to_string();
                if let Err(record_err) = self.record_failure(doc, &checksum, &message) {
                    warn!(error = %record_err, "failed to record the failed document");
                }
                ProcessOutcome::failed(message)
            }
        }
    }

    fn already_processed(&self, owner_id: i64, checksum: &str) -> Result<bool> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM documents \
                 WHERE owner_id = ?1 AND checksum = ?2 AND status = 'completed'",
                params![owner_id, checksum],
                |row| row.get(0),
            )
            .optional()?;
        Ok(existing.is_some())
    }

    fn run(&self, doc: &SourceDocument, checksum: &str) -> Result<ProcessOutcome> {
        let today = Utc::now().date_naive();

        let parsed = content::parse(&doc.bytes, &doc.media_type, &doc.original_name)?;
        let classification = classifier::classify(&parsed.text);
        let deterministic = extractor::extract(&parsed, &classification, &doc.original_name);

        let outcome = escalation::escalate(
            self.conn,
            self.enhanced,
            deterministic,
            &parsed.text,
            &doc.original_name,
            doc.owner_id,
            &self.settings,
            today,
        )?;
        let mut result = outcome.result;
        let needs_review = outcome.needs_review;

        let rules = categorizer::load_rules(self.conn, doc.owner_id)?;
        let existing = dedup::existing_references(self.conn, doc.owner_id)?;
        for candidate in &mut result.candidates {
            let already_stored = candidate
                .reference
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .is_some_and(|r| existing.contains(r));
            if already_stored {
                // the insert gate will exclude it; no categorization or
                // rate fetch for a row that is not going in
                continue;
            }
            if candidate.category_id.is_none() {
                candidate.category_id = categorizer::categorize(candidate, &rules);
            }
            let rate_date = candidate.date.or(result.statement_date).unwrap_or(today);
            candidate.amount_reference = currency::to_reference_currency(
                self.conn,
                self.rates,
                candidate.amount,
                &candidate.currency,
                rate_date,
                &self.settings.reference_currency,
            )
            .map(|conversion| conversion.amount);
        }

        let document_id = self.record_document(doc, checksum, &result)?;
        let report = dedup::insert_batch(
            self.conn,
            doc.owner_id,
            Some(document_id),
            &result.candidates,
        )?;

        info!(
            owner_id = doc.owner_id,
            file_name = %doc.original_name,
            inserted = report.inserted,
            duplicates = report.duplicates,
            confidence = result.pipeline_confidence,
            method = result.method.key(),
            "document processed"
        );

        Ok(ProcessOutcome {
            status: ProcessStatus::Completed,
            inserted: report.inserted,
            duplicates: report.duplicates,
            duplicate_document: false,
            pipeline_confidence: result.pipeline_confidence,
            method: result.method,
            needs_review,
            bank_name_guess: result.bank_name_guess,
            error: None,
        })
    }

    fn record_document(
        &self,
        doc: &SourceDocument,
        checksum: &str,
        result: &crate::models::ExtractionResult,
    ) -> Result<i64> {
        let dates: Vec<NaiveDate> = result.candidates.iter().filter_map(|c| c.date).collect();
        let start = dates.iter().min().map(|d| d.format("%Y-%m-%d").to_string());
        let end = dates.iter().max().map(|d| d.format("%Y-%m-%d").to_string());

        self.conn.execute(
            "INSERT INTO documents (owner_id, file_name, media_type, checksum, status, \
             record_count, date_range_start, date_range_end, pipeline_confidence, method, error) \
             VALUES (?1, ?2, ?3, ?4, 'completed', ?5, ?6, ?7, ?8, ?9, NULL) \
             ON CONFLICT(owner_id, checksum) DO UPDATE SET \
             status = 'completed', record_count = excluded.record_count, \
             date_range_start = excluded.date_range_start, \
             date_range_end = excluded.date_range_end, \
             pipeline_confidence = excluded.pipeline_confidence, \
             method = excluded.method, error = NULL, \
             processed_at = datetime('now')",
            params![
                doc.owner_id,
                doc.original_name,
                doc.media_type,
                checksum,
                result.candidates.len() as i64,
                start,
                end,
                result.pipeline_confidence,
                result.method.key(),
            ],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM documents WHERE owner_id = ?1 AND checksum = ?2",
            params![doc.owner_id, checksum],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn record_failure(&self, doc: &SourceDocument, checksum: &str, error: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO documents (owner_id, file_name, media_type, checksum, status, error) \
             VALUES (?1, ?2, ?3, ?4, 'failed', ?5) \
             ON CONFLICT(owner_id, checksum) DO UPDATE SET \
             status = 'failed', error = excluded.error, processed_at = datetime('now')",
            params![doc.owner_id, doc.original_name, doc.media_type, checksum, error],
        )?;
        Ok(())
    }
}

pub fn compute_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use chrono::NaiveDate;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn settings() -> Settings {
        Settings {
            data_dir: String::new(),
            reference_currency: "USD".to_string(),
            escalation_threshold: 60,
            monthly_ai_quota: 10,
        }
    }

    fn csv_doc(owner_id: i64, name: &str, body: &str) -> SourceDocument {
        SourceDocument {
            id: 0,
            owner_id,
            media_type: "text/csv".to_string(),
            original_name: name.to_string(),
            bytes: body.as_bytes().to_vec(),
        }
    }

    const STATEMENT: &str = "\
FECHA;DESCRIPCION;DEBITO EN $;CREDITO EN $;REFERENCIA
15/01/2024;NETFLIX SUSCRIPCION;1.234,56;;REF001
16/01/2024;ACREDITACION SUELDO;;500.000,00;REF002
17/01/2024;COMPRA COTO SUCURSAL 12;15.800,00;;REF003
";

    struct FixedRate {
        rate: f64,
        calls: std::cell::Cell<usize>,
    }

    impl FixedRate {
        fn new(rate: f64) -> Self {
            Self {
                rate,
                calls: std::cell::Cell::new(0),
            }
        }
    }

    impl RateSource for FixedRate {
        fn fetch_rate(&self, _date: NaiveDate, _from: &str, _to: &str) -> anyhow::Result<f64> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.rate)
        }
    }

    struct FailingRate;

    impl RateSource for FailingRate {
        fn fetch_rate(&self, _date: NaiveDate, _from: &str, _to: &str) -> anyhow::Result<f64> {
            anyhow::bail!("offline")
        }
    }

    #[test]
    fn test_end_to_end_csv_statement() {
        let (_dir, conn) = test_db();
        let pipeline = Pipeline::new(&conn, settings());
        let outcome = pipeline.process_document(&csv_doc(1, "resumen-enero.csv", STATEMENT));

        assert_eq!(outcome.status, ProcessStatus::Completed);
        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.duplicates, 0);
        assert!(!outcome.needs_review, "high-confidence run must not escalate");
        assert_eq!(outcome.method, ExtractionMethod::Deterministic);

        // amounts are signed; debits negative
        let netflix_amount: f64 = conn
            .query_row(
                "SELECT amount FROM transactions WHERE reference_number = 'REF001'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(netflix_amount, -1234.56);
        let sueldo_amount: f64 = conn
            .query_row(
                "SELECT amount FROM transactions WHERE reference_number = 'REF002'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(sueldo_amount, 500_000.0);

        // seeded rules categorized the recognizable merchants
        let netflix_category: String = conn
            .query_row(
                "SELECT c.name FROM transactions t JOIN categories c ON t.category_id = c.id \
                 WHERE t.reference_number = 'REF001'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(netflix_category, "Suscripciones");

        // the document row records the run
        let (status, count, confidence): (String, i64, i64) = conn
            .query_row(
                "SELECT status, record_count, pipeline_confidence FROM documents",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(status, "completed");
        assert_eq!(count, 3);
        assert!(confidence >= 60);
    }

    #[test]
    fn test_identical_document_is_skipped() {
        let (_dir, conn) = test_db();
        let pipeline = Pipeline::new(&conn, settings());
        pipeline.process_document(&csv_doc(1, "resumen.csv", STATEMENT));
        let second = pipeline.process_document(&csv_doc(1, "renamed-copy.csv", STATEMENT));
        assert!(second.duplicate_document);
        assert_eq!(second.status, ProcessStatus::Completed);
        assert_eq!(second.inserted, 0);
        let count: i64 = conn
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_cross_document_dedup_by_reference() {
        let (_dir, conn) = test_db();
        let pipeline = Pipeline::new(&conn, settings());
        pipeline.process_document(&csv_doc(1, "enero.csv", STATEMENT));
        // a different file repeating two references
        let overlap = "\
FECHA;DESCRIPCION;DEBITO EN $;CREDITO EN $;REFERENCIA
15/01/2024;NETFLIX SUSCRIPCION;1.234,56;;REF001
17/01/2024;COMPRA COTO SUCURSAL 12;15.800,00;;REF003
18/01/2024;FARMACITY PALERMO;3.200,00;;REF004
";
        let outcome = pipeline.process_document(&csv_doc(1, "enero-bis.csv", overlap));
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 2);
    }

    #[test]
    fn test_unsupported_format_is_recorded_as_failed() {
        let (_dir, conn) = test_db();
        let pipeline = Pipeline::new(&conn, settings());
        let doc = SourceDocument {
            id: 0,
            owner_id: 1,
            media_type: "image/png".to_string(),
            original_name: "foto.png".to_string(),
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
        };
        let outcome = pipeline.process_document(&doc);
        assert_eq!(outcome.status, ProcessStatus::Failed);
        assert!(outcome.error.is_some());
        let (status, error): (String, String) = conn
            .query_row("SELECT status, error FROM documents", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(status, "failed");
        assert!(error.contains("Unsupported"));
        // a failed attempt does not block a later retry from inserting
        let count: i64 = conn
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_rate_source_fills_reference_amounts() {
        let (_dir, conn) = test_db();
        let source = FixedRate::new(0.001);
        let pipeline = Pipeline::new(&conn, settings()).with_rate_source(&source);
        pipeline.process_document(&csv_doc(1, "resumen.csv", STATEMENT));
        let converted: f64 = conn
            .query_row(
                "SELECT amount_reference FROM transactions WHERE reference_number = 'REF001'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(converted, -1.23);
    }

    #[test]
    fn test_duplicates_skip_categorization_and_rate_fetches() {
        let (_dir, conn) = test_db();
        // first file lands without any rate source; nothing is cached
        Pipeline::new(&conn, settings()).process_document(&csv_doc(1, "enero.csv", STATEMENT));

        let overlap = "\
FECHA;DESCRIPCION;DEBITO EN $;CREDITO EN $;REFERENCIA
15/01/2024;NETFLIX SUSCRIPCION;1.234,56;;REF001
18/01/2024;FARMACITY PALERMO;3.200,00;;REF004
";
        let source = FixedRate::new(0.001);
        let pipeline = Pipeline::new(&conn, settings()).with_rate_source(&source);
        let outcome = pipeline.process_document(&csv_doc(1, "enero-bis.csv", overlap));
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 1);
        // only the fresh candidate's date was fetched
        assert_eq!(source.calls.get(), 1);
        let converted: f64 = conn
            .query_row(
                "SELECT amount_reference FROM transactions WHERE reference_number = 'REF004'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(converted, -3.2);
    }

    #[test]
    fn test_rate_failure_never_blocks_persistence() {
        let (_dir, conn) = test_db();
        let pipeline = Pipeline::new(&conn, settings()).with_rate_source(&FailingRate);
        let outcome = pipeline.process_document(&csv_doc(1, "resumen.csv", STATEMENT));
        assert_eq!(outcome.status, ProcessStatus::Completed);
        assert_eq!(outcome.inserted, 3);
        let unconverted: i64 = conn
            .query_row(
                "SELECT count(*) FROM transactions WHERE amount_reference IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(unconverted, 3);
    }

    #[test]
    fn test_checksum_is_stable_hex_sha256() {
        let checksum = compute_checksum(b"hola");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"hola"));
        assert_ne!(checksum, compute_checksum(b"chau"));
    }
}
