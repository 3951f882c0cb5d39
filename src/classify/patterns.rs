//! Fixed PII pattern library for deep-scan classification.
//!
//! Order matters: patterns are tried in the order listed and the first hit
//! anywhere in a sample set wins, so the library is a slice, not a map.

use std::sync::LazyLock;

use regex::Regex;

pub struct PiiPattern {
    pub name: &'static str,
    pub regex: Regex,
}

static PATTERNS: LazyLock<Vec<PiiPattern>> = LazyLock::new(|| {
    vec![
        PiiPattern {
            name: "EMAIL",
            regex: Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").expect("static pattern"),
        },
        PiiPattern {
            name: "PHONE",
            regex: Regex::new(r"^\+?1?\d{9,15}$").expect("static pattern"),
        },
        PiiPattern {
            name: "CREDIT_CARD",
            regex: Regex::new(r"^\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}$").expect("static pattern"),
        },
        PiiPattern {
            name: "SSN",
            regex: Regex::new(r"^\d{3}-?\d{2}-?\d{4}$").expect("static pattern"),
        },
    ]
});

/// The fixed, ordered pattern library.
pub fn pattern_library() -> &'static [PiiPattern] {
    &PATTERNS
}

/// Tests samples against the library in fixed order; returns the name of
/// the first pattern matched anywhere across samples and patterns.
pub fn first_match(samples: &[String]) -> Option<&'static str> {
    for sample in samples {
        for pattern in pattern_library() {
            if pattern.regex.is_match(sample) {
                return Some(pattern.name);
            }
        }
    }
    None
}
