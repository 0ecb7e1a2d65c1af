//! Rule-based auto-categorization. Rules are evaluated in priority-
//! descending order (ties broken by insertion order); the first match
//! wins and no match leaves the candidate for manual categorization.

use regex::Regex;
use rusqlite::Connection;

use crate::error::Result;
use crate::models::{fold, CategoryRule, MatchField, TransactionCandidate};

/// Owner rules plus the shared defaults (owner 0), pre-ordered.
pub fn load_rules(conn: &Connection, owner_id: i64) -> Result<Vec<CategoryRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, keyword, match_field, priority, case_sensitive, is_pattern, category_id \
         FROM category_rules WHERE owner_id IN (0, ?1) \
         ORDER BY priority DESC, id ASC",
    )?;
    let rules = stmt
        .query_map([owner_id], |row| {
            Ok(CategoryRule {
                id: Some(row.get(0)?),
                owner_id: row.get(1)?,
                keyword: row.get(2)?,
                match_field: MatchField::from_key(&row.get::<_, String>(3)?),
                priority: row.get(4)?,
                case_sensitive: row.get(5)?,
                is_pattern: row.get(6)?,
                category_id: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rules)
}

/// First matching rule's category, or None. A candidate that already
/// carries a category is never re-categorized.
pub fn categorize(candidate: &TransactionCandidate, rules: &[CategoryRule]) -> Option<i64> {
    if candidate.category_id.is_some() {
        return candidate.category_id;
    }
    rules
        .iter()
        .find(|rule| rule_matches(rule, &candidate.description, &candidate.merchant))
        .map(|rule| rule.category_id)
}

fn rule_matches(rule: &CategoryRule, description: &str, merchant: &str) -> bool {
    let haystack = match rule.match_field {
        MatchField::Description => description.to_string(),
        MatchField::Merchant => merchant.to_string(),
        MatchField::Both => format!("{description} {merchant}"),
    };

    if rule.is_pattern {
        let pattern = if rule.case_sensitive {
            rule.keyword.clone()
        } else {
            format!("(?i){}", rule.keyword)
        };
        return Regex::new(&pattern)
            .map(|re| re.is_match(&haystack))
            .unwrap_or(false);
    }

    let (haystack, keyword) = if rule.case_sensitive {
        (haystack, rule.keyword.clone())
    } else {
        (fold(&haystack), fold(&rule.keyword))
    };

    if keyword.contains('%') {
        // LIKE-style wildcard: % expands to any run of characters
        let pattern = keyword
            .split('%')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        return Regex::new(&format!("(?s)^{pattern}$"))
            .map(|re| re.is_match(&haystack))
            .unwrap_or(false);
    }

    haystack.contains(&keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};

    fn rule(keyword: &str, priority: i64, category_id: i64) -> CategoryRule {
        CategoryRule {
            id: None,
            owner_id: 1,
            keyword: keyword.to_string(),
            match_field: MatchField::Description,
            priority,
            case_sensitive: false,
            is_pattern: false,
            category_id,
        }
    }

    fn candidate(description: &str, merchant: &str) -> TransactionCandidate {
        TransactionCandidate {
            date: None,
            description: description.to_string(),
            merchant: merchant.to_string(),
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

    fn sort(mut rules: Vec<CategoryRule>) -> Vec<CategoryRule> {
        // mirror the SQL ordering for in-memory tests
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        rules
    }

    #[test]
    fn test_priority_ordering_beats_definition_order() {
        let rules = sort(vec![rule("CAFE", 5, 10), rule("CAFE MARTINEZ", 10, 20)]);
        let c = candidate("CAFE MARTINEZ PALERMO", "CAFE MARTINEZ");
        assert_eq!(categorize(&c, &rules), Some(20));
    }

    #[test]
    fn test_no_match_returns_none() {
        let rules = vec![rule("NETFLIX", 10, 1)];
        assert_eq!(
            categorize(&candidate("COMPRA FERRETERIA", "FERRETERIA"), &rules),
            None
        );
    }

    #[test]
    fn test_precategorized_candidate_untouched() {
        let rules = vec![rule("NETFLIX", 10, 1)];
        let mut c = candidate("NETFLIX SUSCRIPCION", "NETFLIX");
        c.category_id = Some(99);
        assert_eq!(categorize(&c, &rules), Some(99));
    }

    #[test]
    fn test_match_field_merchant_and_both() {
        let mut merchant_rule = rule("NETFLIX", 10, 1);
        merchant_rule.match_field = MatchField::Merchant;
        let c = candidate("COMPRA VISA DEBITO", "NETFLIX.COM");
        assert_eq!(categorize(&c, &[merchant_rule]), Some(1));

        let mut both_rule = rule("NETFLIX", 10, 2);
        both_rule.match_field = MatchField::Both;
        let c2 = candidate("NETFLIX SUSCRIPCION", "OTRA COSA");
        assert_eq!(categorize(&c2, &[both_rule]), Some(2));
    }

    #[test]
    fn test_case_insensitive_and_accent_folding() {
        let rules = vec![rule("suscripcion", 10, 1)];
        let c = candidate("Netflix Suscripción", "NETFLIX");
        assert_eq!(categorize(&c, &rules), Some(1));
    }

    #[test]
    fn test_case_sensitive_rule() {
        let mut r = rule("Netflix", 10, 1);
        r.case_sensitive = true;
        assert_eq!(categorize(&candidate("NETFLIX", "NETFLIX"), &[r.clone()]), None);
        assert_eq!(categorize(&candidate("Netflix", "Netflix"), &[r]), Some(1));
    }

    #[test]
    fn test_wildcard_keyword() {
        let rules = vec![rule("PAGO%SERVICIO%", 10, 7)];
        assert_eq!(
            categorize(&candidate("PAGO DE SERVICIO EDESUR", "EDESUR"), &rules),
            Some(7)
        );
        assert_eq!(categorize(&candidate("SERVICIO PAGO", "X"), &rules), None);
    }

    #[test]
    fn test_regex_rule() {
        let mut r = rule(r"^UBER\s+(TRIP|EATS)", 10, 3);
        r.is_pattern = true;
        assert_eq!(categorize(&candidate("UBER TRIP BUE", "UBER"), &[r.clone()]), Some(3));
        assert_eq!(categorize(&candidate("MI UBER FAVORITO", "UBER"), &[r]), None);
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let mut r = rule("(", 10, 1);
        r.is_pattern = true;
        assert_eq!(categorize(&candidate("(", "("), &[r]), None);
    }

    #[test]
    fn test_load_rules_orders_by_priority_then_rowid() {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        let cat: i64 = conn
            .query_row("SELECT id FROM categories LIMIT 1", [], |r| r.get(0))
            .unwrap();
        conn.execute(
            "INSERT INTO category_rules (owner_id, keyword, priority, category_id) VALUES (5, 'BAJA', 1, ?1)",
            [cat],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO category_rules (owner_id, keyword, priority, category_id) VALUES (5, 'ALTA', 999, ?1)",
            [cat],
        )
        .unwrap();
        let rules = load_rules(&conn, 5).unwrap();
        assert_eq!(rules[0].keyword, "ALTA");
        // shared defaults (owner 0) are included too
        assert!(rules.iter().any(|r| r.owner_id == 0));
        // another owner does not see owner 5's rules
        let other = load_rules(&conn, 6).unwrap();
        assert!(other.iter().all(|r| r.owner_id == 0));
    }

    #[test]
    fn test_seeded_netflix_rule_applies() {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        let rules = load_rules(&conn, 1).unwrap();
        let c = candidate("NETFLIX SUSCRIPCION", "NETFLIX");
        let category = categorize(&c, &rules).expect("seeded rules cover NETFLIX");
        let name: String = conn
            .query_row("SELECT name FROM categories WHERE id = ?1", [category], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(name, "Suscripciones");
    }
}
