//! Escalation controller: decide whether a deterministic extraction is
//! good enough, and when it is not, retry through the quota-limited
//! high-cost capability. Every outcome below the threshold forces human
//! review; AI-derived candidates are always reviewed regardless of their
//! own reported confidence.

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{ExtractionMethod, ExtractionResult};
use crate::quota;
use crate::settings::Settings;

/// The external high-cost extraction capability, consumed as an opaque
/// collaborator. Failures are transport-shaped and handled by the
/// controller's fallback, never propagated.
pub trait EnhancedExtractor {
    fn extract_enhanced(
        &self,
        text: &str,
        file_name: &str,
        owner_id: i64,
    ) -> anyhow::Result<ExtractionResult>;
}

pub struct EscalationOutcome {
    pub result: ExtractionResult,
    pub needs_review: bool,
}

#[allow(clippy::too_many_arguments)]
pub fn escalate(
    conn: &Connection,
    enhanced: Option<&dyn EnhancedExtractor>,
    deterministic: ExtractionResult,
    text: &str,
    file_name: &str,
    owner_id: i64,
    settings: &Settings,
    today: NaiveDate,
) -> Result<EscalationOutcome> {
    if deterministic.pipeline_confidence >= settings.escalation_threshold {
        return Ok(EscalationOutcome {
            result: deterministic,
            needs_review: false,
        });
    }

    let period = quota::period_key(today);
    let Some(extractor) = enhanced else {
        info!(
            owner_id,
            confidence = deterministic.pipeline_confidence,
            "low confidence but no enhanced extractor wired; keeping deterministic result for review"
        );
        return Ok(flag_for_review(deterministic, None));
    };

    let state = quota::check(conn, owner_id, &period, settings.monthly_ai_quota)?;
    if state.exhausted() {
        info!(
            owner_id,
            period,
            used = state.used,
            "AI quota exhausted; keeping deterministic result for review"
        );
        return Ok(flag_for_review(deterministic, None));
    }

    match extractor.extract_enhanced(text, file_name, owner_id) {
        Ok(ai_result) => {
            // consume only after a confirmed successful invocation
            if !quota::try_consume(conn, owner_id, &period, settings.monthly_ai_quota)? {
                warn!(owner_id, period, "quota was consumed by a concurrent run after a successful AI call");
            }
            info!(
                owner_id,
                candidates = ai_result.candidates.len(),
                "escalated extraction replaced the deterministic result"
            );
            Ok(flag_for_review(ai_result, Some(ExtractionMethod::AiAssisted)))
        }
        Err(e) => {
            warn!(owner_id, error = %e, "enhanced extraction failed; keeping deterministic result");
            Ok(flag_for_review(deterministic, Some(ExtractionMethod::Hybrid)))
        }
    }
}

fn flag_for_review(
    mut result: ExtractionResult,
    method: Option<ExtractionMethod>,
) -> EscalationOutcome {
    if let Some(method) = method {
        result.method = method;
    }
    for candidate in &mut result.candidates {
        candidate.needs_review = true;
    }
    EscalationOutcome {
        result,
        needs_review: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::models::TransactionCandidate;
    use std::cell::Cell;

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

    fn candidate(description: &str) -> TransactionCandidate {
        TransactionCandidate {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 15),
            description: description.to_string(),
            merchant: description.to_string(),
            amount: -100.0,
            currency: "ARS".to_string(),
            reference: None,
            raw_source: String::new(),
            extraction_confidence: 90,
            category_id: None,
            amount_reference: None,
            needs_review: false,
        }
    }

    fn result_with_confidence(confidence: u8) -> ExtractionResult {
        ExtractionResult {
            candidates: vec![candidate("UNO"), candidate("DOS")],
            bank_name_guess: None,
            statement_date: None,
            pipeline_confidence: confidence,
            method: ExtractionMethod::Deterministic,
        }
    }

    struct CountingExtractor {
        calls: Cell<usize>,
        fail: bool,
    }

    impl CountingExtractor {
        fn new(fail: bool) -> Self {
            Self {
                calls: Cell::new(0),
                fail,
            }
        }
    }

    impl EnhancedExtractor for CountingExtractor {
        fn extract_enhanced(
            &self,
            _text: &str,
            _file_name: &str,
            _owner_id: i64,
        ) -> anyhow::Result<ExtractionResult> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                anyhow::bail!("transport error");
            }
            // the AI reports perfect confidence; review is forced anyway
            Ok(result_with_confidence(100))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()
    }

    #[test]
    fn test_confidence_at_threshold_skips_escalation() {
        let (_dir, conn) = test_db();
        let extractor = CountingExtractor::new(false);
        let out = escalate(
            &conn,
            Some(&extractor),
            result_with_confidence(60),
            "texto",
            "doc.pdf",
            1,
            &settings(),
            today(),
        )
        .unwrap();
        assert_eq!(extractor.calls.get(), 0);
        assert!(!out.needs_review);
        assert_eq!(out.result.method, ExtractionMethod::Deterministic);
        assert!(out.result.candidates.iter().all(|c| !c.needs_review));
    }

    #[test]
    fn test_confidence_59_invokes_ai_exactly_once_and_forces_review() {
        let (_dir, conn) = test_db();
        let extractor = CountingExtractor::new(false);
        let out = escalate(
            &conn,
            Some(&extractor),
            result_with_confidence(59),
            "texto",
            "doc.pdf",
            1,
            &settings(),
            today(),
        )
        .unwrap();
        assert_eq!(extractor.calls.get(), 1);
        assert!(out.needs_review);
        assert_eq!(out.result.method, ExtractionMethod::AiAssisted);
        assert_eq!(out.result.pipeline_confidence, 100);
        assert!(out.result.candidates.iter().all(|c| c.needs_review));
    }

    #[test]
    fn test_successful_escalation_consumes_quota() {
        let (_dir, conn) = test_db();
        let extractor = CountingExtractor::new(false);
        escalate(
            &conn,
            Some(&extractor),
            result_with_confidence(10),
            "t",
            "f",
            7,
            &settings(),
            today(),
        )
        .unwrap();
        let state = quota::check(&conn, 7, "2024-01", 10).unwrap();
        assert_eq!(state.used, 1);
    }

    #[test]
    fn test_failed_invocation_keeps_deterministic_as_hybrid() {
        let (_dir, conn) = test_db();
        let extractor = CountingExtractor::new(true);
        let out = escalate(
            &conn,
            Some(&extractor),
            result_with_confidence(30),
            "t",
            "f",
            1,
            &settings(),
            today(),
        )
        .unwrap();
        assert_eq!(extractor.calls.get(), 1);
        assert_eq!(out.result.method, ExtractionMethod::Hybrid);
        assert!(out.needs_review);
        assert!(out.result.candidates.iter().all(|c| c.needs_review));
        // a failed call is not billed
        let state = quota::check(&conn, 1, "2024-01", 10).unwrap();
        assert_eq!(state.used, 0);
    }

    #[test]
    fn test_exhausted_quota_keeps_deterministic_with_review() {
        let (_dir, conn) = test_db();
        let mut cfg = settings();
        cfg.monthly_ai_quota = 1;
        quota::try_consume(&conn, 1, "2024-01", 1).unwrap();
        let extractor = CountingExtractor::new(false);
        let out = escalate(
            &conn,
            Some(&extractor),
            result_with_confidence(30),
            "t",
            "f",
            1,
            &cfg,
            today(),
        )
        .unwrap();
        assert_eq!(extractor.calls.get(), 0);
        assert_eq!(out.result.method, ExtractionMethod::Deterministic);
        assert!(out.needs_review);
    }

    #[test]
    fn test_no_extractor_wired_still_forces_review() {
        let (_dir, conn) = test_db();
        let out = escalate(
            &conn,
            None,
            result_with_confidence(30),
            "t",
            "f",
            1,
            &settings(),
            today(),
        )
        .unwrap();
        assert_eq!(out.result.method, ExtractionMethod::Deterministic);
        assert!(out.needs_review);
        assert!(out.result.candidates.iter().all(|c| c.needs_review));
    }

    #[test]
    fn test_configurable_threshold() {
        let (_dir, conn) = test_db();
        let mut cfg = settings();
        cfg.escalation_threshold = 40;
        let extractor = CountingExtractor::new(false);
        let out = escalate(
            &conn,
            Some(&extractor),
            result_with_confidence(45),
            "t",
            "f",
            1,
            &cfg,
            today(),
        )
        .unwrap();
        assert_eq!(extractor.calls.get(), 0);
        assert!(!out.needs_review);
    }
}
