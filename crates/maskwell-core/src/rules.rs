//! Built-in rule set.
//!
//! | category        | priority | replacement | cache key          |
//! |-----------------|----------|-------------|--------------------|
//! | email           | 110      | placeholder | lower-cased        |
//! | ip              | 106      | placeholder | exact              |
//! | token           | 105      | placeholder | exact              |
//! | url             | 100      | placeholder | exact              |
//! | address         | 95       | placeholder | collapsed spaces   |
//! | crypto_address  | 80       | placeholder | exact              |
//! | credit_card     | 75       | placeholder | digits only        |
//! | iban            | 74       | normalize   | n/a                |
//! | ssn             | 70       | placeholder | digits only        |
//! | username        | 60       | placeholder | lower-cased        |
//! | date            | 50       | placeholder | exact              |
//! | amount          | 40       | placeholder | collapsed spaces   |
//! | phone           | 30       | placeholder | digits only        |
//! | name            | 10       | placeholder | collapsed spaces   |

use crate::detector::{EntityRecognizer, ModelDetector, PatternDetector};
use crate::error::{Error, Result};
use crate::policy::{Rule, RuleRegistry};
use crate::types::{KeyNormalization, ReplacementMode};
use std::sync::Arc;

pub const EMAIL: &str = "email";
pub const IP: &str = "ip";
pub const TOKEN: &str = "token";
pub const URL: &str = "url";
pub const ADDRESS: &str = "address";
pub const CRYPTO_ADDRESS: &str = "crypto_address";
pub const CREDIT_CARD: &str = "credit_card";
pub const IBAN: &str = "iban";
pub const SSN: &str = "ssn";
pub const USERNAME: &str = "username";
pub const DATE: &str = "date";
pub const AMOUNT: &str = "amount";
pub const PHONE: &str = "phone";
pub const NAME: &str = "name";

/// `(category, priority, mode, normalization, patterns, min_digits)`
type PatternRow = (
    &'static str,
    i32,
    ReplacementMode,
    KeyNormalization,
    &'static [&'static str],
    usize,
);

const PATTERN_RULES: &[PatternRow] = &[
    (
        EMAIL,
        110,
        ReplacementMode::Placeholder,
        KeyNormalization::Lowercase,
        &[r"(?i)\b[a-z0-9._%+-]+@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}\b"],
        0,
    ),
    (
        IP,
        106,
        ReplacementMode::Placeholder,
        KeyNormalization::Exact,
        &[
            r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b",
            r"\b(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}\b",
        ],
        0,
    ),
    (
        TOKEN,
        105,
        ReplacementMode::Placeholder,
        KeyNormalization::Exact,
        // JWT-shaped: header.payload.signature, header starting "ey"
        &[r"\bey[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}"],
        0,
    ),
    (
        URL,
        100,
        ReplacementMode::Placeholder,
        KeyNormalization::Exact,
        &[
            r"https?://(?:www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b[-a-zA-Z0-9()@:%_+.~#?&/=]*",
            r"\bwww\.[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z]{2,10}\b[-a-zA-Z0-9()@:%_+.~#?&/=]*",
        ],
        0,
    ),
    (
        ADDRESS,
        95,
        ReplacementMode::Placeholder,
        KeyNormalization::CollapseWhitespace,
        &[r"\b\d{1,5}\s\w+(?:\s\w+){0,5},?\s\w+,\s[A-Z]{2}\s\d{5}\b"],
        0,
    ),
    (
        CRYPTO_ADDRESS,
        80,
        ReplacementMode::Placeholder,
        KeyNormalization::Exact,
        &[
            r"\b[13][a-km-zA-HJ-NP-Z1-9]{25,34}\b",
            r"\b0x[0-9a-fA-F]{40}\b",
        ],
        0,
    ),
    (
        CREDIT_CARD,
        75,
        ReplacementMode::Placeholder,
        KeyNormalization::DigitsOnly,
        &[r"\b(?:\d[ -]?){12,18}\d\b"],
        13,
    ),
    (
        IBAN,
        74,
        ReplacementMode::Normalize,
        KeyNormalization::Exact,
        &[r"\b[A-Z]{2}\d{2}(?: ?[A-Z0-9]{4}){2,7}(?: ?[A-Z0-9]{1,3})?\b"],
        0,
    ),
    (
        SSN,
        70,
        ReplacementMode::Placeholder,
        KeyNormalization::DigitsOnly,
        &[r"\b\d{3}-\d{2}-\d{4}\b"],
        0,
    ),
    (
        USERNAME,
        60,
        ReplacementMode::Placeholder,
        KeyNormalization::Lowercase,
        &[r"\B@\w{2,}"],
        0,
    ),
    (
        DATE,
        50,
        ReplacementMode::Placeholder,
        KeyNormalization::Exact,
        &[
            r"\b\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4}\b",
            r"\b\d{4}-\d{2}-\d{2}\b",
        ],
        0,
    ),
    (
        AMOUNT,
        40,
        ReplacementMode::Placeholder,
        KeyNormalization::CollapseWhitespace,
        &[
            r"\$\s?\d+(?:,\d{3})*(?:\.\d{2})?",
            r"(?i)\b\d+(?:,\d{3})*(?:[.,]\d{2})?\s?(?:USD|EUR|GBP|PLN|zł|dollars?|euros?|pounds?)",
            r"\b(?:USD|EUR|GBP|PLN)\s?\d+(?:,\d{3})*(?:\.\d{2})?",
        ],
        0,
    ),
    (
        PHONE,
        30,
        ReplacementMode::Placeholder,
        KeyNormalization::DigitsOnly,
        &[
            r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
            r"\+?\d{1,3}[-.\s]?\(?\d{1,4}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,9}",
        ],
        10,
    ),
];

/// Luhn checksum over the digits of a candidate card number
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn compile(category: &str, idx: usize, pattern: &str) -> Result<PatternDetector> {
    PatternDetector::new(format!("{category}#{idx}"), pattern).map_err(|source| {
        Error::InvalidPattern {
            category: category.to_string(),
            source,
        }
    })
}

/// Build a pattern rule from raw regex sources
pub fn pattern_rule(category: &str, priority: i32, patterns: &[&str]) -> Result<Rule> {
    let mut rule = Rule::new(category, priority);
    for (idx, pattern) in patterns.iter().enumerate() {
        rule = rule.with_detector(compile(category, idx, pattern)?);
    }
    Ok(rule)
}

/// The full built-in registry.
///
/// `name` is only registered when a recognizer is supplied.
pub fn builtin(recognizer: Option<Arc<dyn EntityRecognizer>>) -> Result<RuleRegistry> {
    let mut registry = RuleRegistry::new();
    for &(category, priority, mode, normalization, patterns, min_digits) in PATTERN_RULES {
        let mut rule = Rule::new(category, priority)
            .with_mode(mode)
            .with_normalization(normalization);
        for (idx, pattern) in patterns.iter().enumerate() {
            let mut detector = compile(category, idx, pattern)?.with_min_digits(min_digits);
            if category == CREDIT_CARD {
                detector = detector.with_validator(luhn_valid);
            }
            rule = rule.with_detector(detector);
        }
        registry.register(rule)?;
    }

    if let Some(recognizer) = recognizer {
        registry.register(
            Rule::new(NAME, 10)
                .with_normalization(KeyNormalization::CollapseWhitespace)
                .with_detector(ModelDetector::new(recognizer, &["PERSON", "PER"])),
        )?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_all(registry: &RuleRegistry, category: &str, text: &str) -> Vec<String> {
        let rule = registry.get(category).unwrap();
        rule.detectors()
            .iter()
            .flat_map(|d| d.detect(text).unwrap())
            .map(|s| s.value)
            .collect()
    }

    #[test]
    fn test_builtin_compiles_every_pattern() {
        let registry = builtin(None).unwrap();
        assert_eq!(registry.len(), PATTERN_RULES.len());
        assert!(registry.get(NAME).is_none());
    }

    #[test]
    fn test_builtin_registers_name_with_recognizer() {
        let recognizer: Arc<dyn EntityRecognizer> =
            Arc::new(crate::detector::HeuristicNameRecognizer);
        let registry = builtin(Some(recognizer)).unwrap();
        let name = registry.get(NAME).unwrap();
        assert_eq!(name.priority(), 10);
        assert_eq!(name.detectors().len(), 1);
    }

    #[test]
    fn test_email_pattern() {
        let registry = builtin(None).unwrap();
        assert_eq!(
            detect_all(&registry, EMAIL, "mail John.Doe@Example.co.uk now"),
            vec!["John.Doe@Example.co.uk"]
        );
    }

    #[test]
    fn test_phone_requires_ten_digits() {
        let registry = builtin(None).unwrap();
        let found = detect_all(&registry, PHONE, "Call me at +1 (123) 456-7890");
        assert!(found.iter().any(|v| v.contains("456-7890")));
        assert!(detect_all(&registry, PHONE, "room 12-34").is_empty());
    }

    #[test]
    fn test_amount_patterns() {
        let registry = builtin(None).unwrap();
        let found = detect_all(&registry, AMOUNT, "The price is $1,234.56 or 1,234.56 USD");
        assert!(found.contains(&"$1,234.56".to_string()));
        assert!(found.contains(&"1,234.56 USD".to_string()));
    }

    #[test]
    fn test_credit_card_requires_luhn() {
        let registry = builtin(None).unwrap();
        assert_eq!(
            detect_all(&registry, CREDIT_CARD, "card 4111 1111 1111 1111."),
            vec!["4111 1111 1111 1111"]
        );
        assert!(detect_all(&registry, CREDIT_CARD, "card 4111 1111 1111 1112").is_empty());
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111-1111-1111-1111"));
        assert!(!luhn_valid("4111-1111-1111-1112"));
        assert!(!luhn_valid("1234"));
    }

    #[test]
    fn test_dates_and_ssn() {
        let registry = builtin(None).unwrap();
        let dates = detect_all(&registry, DATE, "due 2025-12-31 or 12/31/2025");
        assert_eq!(dates, vec!["12/31/2025", "2025-12-31"]);
        assert_eq!(
            detect_all(&registry, SSN, "His SSN is 123-45-6789."),
            vec!["123-45-6789"]
        );
    }

    #[test]
    fn test_address_pattern() {
        let registry = builtin(None).unwrap();
        assert_eq!(
            detect_all(&registry, ADDRESS, "Send it to 123 Main St, Springfield, IL 62704."),
            vec!["123 Main St, Springfield, IL 62704"]
        );
    }

    #[test]
    fn test_pattern_rule_reports_invalid_regex() {
        let err = pattern_rule("custom", 1, &["(oops"]).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { category, .. } if category == "custom"));
    }
}
