// SPDX-License-Identifier: Apache-2.0

//! PII Classifier
//!
//! A pure decision procedure over (column name, declared type, optional
//! sample values). The heuristic chain is an ordered list of rules; the
//! first rule whose predicate matches decides the strategy. Output is
//! advisory only — nothing here mutates data, and the caller must submit a
//! confirmed rule list to actually erase anything.

pub mod patterns;

use serde::{Deserialize, Serialize};

use crate::engine::types::ColumnMeta;
use crate::redact::Strategy;

/// Column names containing any of these are operationally load-bearing and
/// never suggested for redaction. Checked before everything else.
const SAFE_KEYWORDS: &[&str] = &[
    "id", "date", "time", "amount", "balance", "price", "merchant", "status", "code", "type",
    "sku", "created", "updated", "is_active",
];

/// Columns matching these get MASK (structured identifiers with a useful
/// tail) rather than a full pseudonym.
const MASK_KEYWORDS: &[&str] = &["ssn", "phone", "card", "mobile", "balance"];

/// Generic PII names that warrant HASH, but only on textual columns.
const PII_KEYWORDS: &[&str] = &[
    "name", "email", "ssn", "social", "phone", "mobile", "addr", "city", "zip", "card", "credit",
    "dob", "birth", "password",
];

/// The classifier's verdict for one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub strategy: Strategy,
    pub reason: String,
}

/// One step of the heuristic chain: a named predicate over the column's
/// name/type facts, and the strategy it decides.
struct NameRule {
    strategy: Strategy,
    reason: &'static str,
    predicate: fn(&str, bool) -> bool,
}

fn matches_safe_list(name: &str, _textual: bool) -> bool {
    SAFE_KEYWORDS.iter().any(|k| name.contains(k))
}

fn matches_email_keyword(name: &str, _textual: bool) -> bool {
    name.contains("email")
}

fn matches_mask_keyword(name: &str, _textual: bool) -> bool {
    MASK_KEYWORDS.iter().any(|k| name.contains(k))
}

fn matches_generic_pii(name: &str, textual: bool) -> bool {
    textual && PII_KEYWORDS.iter().any(|k| name.contains(k))
}

/// The ordered chain. First match wins; deep scanning (rule 5) and the
/// IGNORE default live outside because they are not pure name predicates.
static NAME_RULES: [NameRule; 4] = [
    NameRule {
        strategy: Strategy::Preserve,
        reason: "safe-list match",
        predicate: matches_safe_list,
    },
    NameRule {
        strategy: Strategy::EmailMask,
        reason: "keyword",
        predicate: matches_email_keyword,
    },
    NameRule {
        strategy: Strategy::Mask,
        reason: "PII identified",
        predicate: matches_mask_keyword,
    },
    NameRule {
        strategy: Strategy::Hash,
        reason: "generic PII match",
        predicate: matches_generic_pii,
    },
];

/// Runs only the name/type rules. `None` means the chain fell through and
/// deep scanning applies (for textual columns).
fn classify_by_name(column: &ColumnMeta) -> Option<(Strategy, &'static str)> {
    let name = column.name.to_lowercase();
    let textual = column.is_textual();
    NAME_RULES
        .iter()
        .find(|rule| (rule.predicate)(&name, textual))
        .map(|rule| (rule.strategy, rule.reason))
}

/// True when classification of this column would consult sample values.
/// Callers use this to avoid fetching samples that cannot change the
/// outcome.
pub fn needs_samples(column: &ColumnMeta) -> bool {
    classify_by_name(column).is_none() && column.is_textual()
}

/// Classifies one column given whatever samples the caller managed to
/// fetch. Samples are only consulted when no name rule matched and the
/// column is textual; a sampling failure upstream simply shows up here as
/// an empty slice, degrading the verdict to IGNORE.
pub fn classify(column: &ColumnMeta, samples: &[String]) -> Classification {
    let (strategy, reason) = match classify_by_name(column) {
        Some((strategy, reason)) => (strategy, reason.to_string()),
        None if column.is_textual() => match patterns::first_match(samples) {
            Some(pattern) => (Strategy::Hash, format!("deep-scan match: {}", pattern)),
            None => (Strategy::Ignore, "default".to_string()),
        },
        None => (Strategy::Ignore, "default".to_string()),
    };

    Classification {
        table: column.table.clone(),
        column: column.name.clone(),
        data_type: column.data_type.clone(),
        strategy,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: &str) -> ColumnMeta {
        ColumnMeta {
            table: "users".into(),
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    #[test]
    fn safe_keywords_always_preserve() {
        for name in ["user_id", "created_at", "status", "order_amount"] {
            let c = classify(&col(name, "text"), &["bob@host.org".into()]);
            assert_eq!(c.strategy, Strategy::Preserve, "column {}", name);
            assert_eq!(c.reason, "safe-list match");
        }
    }

    #[test]
    fn safe_list_outranks_email_keyword() {
        // "email_id" contains both "email" and the safe keyword "id";
        // the safe rule sits earlier in the chain.
        let c = classify(&col("email_id", "text"), &[]);
        assert_eq!(c.strategy, Strategy::Preserve);
    }

    #[test]
    fn email_columns_get_email_mask() {
        let c = classify(&col("contact_email", "character varying"), &[]);
        assert_eq!(c.strategy, Strategy::EmailMask);
        assert_eq!(c.reason, "keyword");
    }

    #[test]
    fn structured_identifiers_get_mask() {
        for name in ["ssn", "phone_number", "card_no", "mobile"] {
            let c = classify(&col(name, "text"), &[]);
            assert_eq!(c.strategy, Strategy::Mask, "column {}", name);
            assert_eq!(c.reason, "PII identified");
        }
    }

    #[test]
    fn generic_pii_requires_textual_type() {
        let c = classify(&col("full_name", "text"), &[]);
        assert_eq!(c.strategy, Strategy::Hash);
        assert_eq!(c.reason, "generic PII match");

        // Same name, numeric type: the generic rule does not apply and the
        // column is not sampled either.
        let numeric = col("full_name", "integer");
        let c = classify(&numeric, &[]);
        assert_eq!(c.strategy, Strategy::Ignore);
        assert!(!needs_samples(&numeric));
    }

    #[test]
    fn deep_scan_catches_pii_shaped_content() {
        let anonymous = col("field_7", "text");
        assert!(needs_samples(&anonymous));

        let c = classify(&anonymous, &["123-45-6789".into()]);
        assert_eq!(c.strategy, Strategy::Hash);
        assert_eq!(c.reason, "deep-scan match: SSN");
    }

    #[test]
    fn unsampled_fallthrough_is_ignore() {
        let c = classify(&col("field_7", "text"), &[]);
        assert_eq!(c.strategy, Strategy::Ignore);
        assert_eq!(c.reason, "default");
    }
}
