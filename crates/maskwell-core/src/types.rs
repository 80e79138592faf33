//! Value types shared by every stage of the engine.
//!
//! Offsets are UTF-8 byte offsets into the input text (NOT char indices),
//! always on char boundaries, with `end > start`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Any placeholder-shaped token, base or localized: `[LABEL_12]`.
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]\s]+)_(\d+)\]").expect("placeholder regex"));

/// A placeholder as emitted by the cache, before localization.
static BASE_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Z][A-Z0-9_]*)_(\d+)\]").expect("base placeholder regex"));

/// How a detector produces its spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    /// Stateless, pure function of the text (regex)
    Pattern,
    /// Backed by an injected entity recognizer
    Model,
}

/// A raw span reported by a detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub value: String,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(value: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            value: value.into(),
            start,
            end,
        }
    }

    /// Checks the span against the text it was detected in.
    pub fn is_valid_for(&self, text: &str) -> bool {
        self.start < self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
            && text[self.start..self.end] == self.value
    }
}

/// A span tagged with the category and priority of the rule that found it.
///
/// The matched value is zeroized when the candidate is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub category: String,
    pub priority: i32,
    pub start: usize,
    pub end: usize,
    pub value: String,
}

impl Candidate {
    pub fn new(category: &str, priority: i32, span: Span) -> Self {
        Self {
            category: category.to_string(),
            priority,
            start: span.start,
            end: span.end,
            value: span.value,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when `[start, end)` shares at least one byte with this candidate.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

impl Zeroize for Candidate {
    fn zeroize(&mut self) {
        self.value.zeroize();
    }
}

impl Drop for Candidate {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// What an accepted match is replaced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementMode {
    /// Reversible `[CATEGORY_n]` token from the placeholder cache
    #[default]
    Placeholder,
    /// Character-class shape: letters to `X`/`x`, digits to `0`
    Normalize,
}

/// How a matched value is turned into a cache key.
///
/// Two mentions with the same key share one placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyNormalization {
    #[default]
    Exact,
    /// Emails, handles
    Lowercase,
    /// Phones, card numbers, SSNs
    DigitsOnly,
    /// Names, amounts, addresses
    CollapseWhitespace,
}

impl KeyNormalization {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Self::Exact => value.to_string(),
            Self::Lowercase => value.to_lowercase(),
            Self::DigitsOnly => {
                let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
                // A value with no digits at all still needs a distinct key
                if digits.is_empty() {
                    value.to_string()
                } else {
                    digits
                }
            }
            Self::CollapseWhitespace => value.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// Formats the placeholder for a category ordinal: `[CATEGORY_ordinal]`.
pub fn placeholder(category: &str, ordinal: u32) -> String {
    format!("[{}_{}]", category.to_uppercase(), ordinal)
}

/// Masks a value's shape while keeping its length and punctuation.
pub fn normalize_shape(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                '0'
            } else if c.is_alphabetic() && c.is_uppercase() {
                'X'
            } else if c.is_alphabetic() {
                'x'
            } else {
                c
            }
        })
        .collect()
}

/// Byte ranges of every placeholder-shaped token in `text`.
pub fn placeholder_spans(text: &str) -> Vec<(usize, usize)> {
    PLACEHOLDER_RE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect()
}

/// Base placeholders in `text` as `(range, label, ordinal)` triples.
pub(crate) fn base_placeholders(text: &str) -> Vec<((usize, usize), &str, &str)> {
    BASE_PLACEHOLDER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?.as_str();
            let ordinal = caps.get(2)?.as_str();
            Some(((whole.start(), whole.end()), label, ordinal))
        })
        .collect()
}

pub(crate) fn placeholder_tokens(text: &str) -> impl Iterator<Item = regex::Match<'_>> {
    PLACEHOLDER_RE.find_iter(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_syntax() {
        assert_eq!(placeholder("email", 1), "[EMAIL_1]");
        assert_eq!(placeholder("credit_card", 12), "[CREDIT_CARD_12]");
    }

    #[test]
    fn test_normalize_shape_preserves_length_and_punctuation() {
        assert_eq!(normalize_shape("DE89-3704 0044ab"), "XX00-0000 0000xx");
        let original = "Zürich-42";
        assert_eq!(
            normalize_shape(original).chars().count(),
            original.chars().count()
        );
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(
            KeyNormalization::Lowercase.apply("Alice@Test.COM"),
            "alice@test.com"
        );
        assert_eq!(
            KeyNormalization::DigitsOnly.apply("+1 (555) 010-2000"),
            "15550102000"
        );
        assert_eq!(
            KeyNormalization::CollapseWhitespace.apply("John   Doe\n"),
            "John Doe"
        );
        assert_eq!(KeyNormalization::Exact.apply(" as-is "), " as-is ");
    }

    #[test]
    fn test_span_validation_rejects_bad_offsets() {
        let text = "café mail";
        assert!(Span::new("café", 0, 5).is_valid_for(text));
        // Splits the two-byte 'é'
        assert!(!Span::new("caf", 0, 4).is_valid_for(text));
        assert!(!Span::new("", 3, 3).is_valid_for(text));
        assert!(!Span::new("mail", 6, 99).is_valid_for(text));
        assert!(!Span::new("nope", 6, 10).is_valid_for(text));
    }

    #[test]
    fn test_candidate_zeroizes_value() {
        let mut candidate = Candidate::new("email", 110, Span::new("a@b.io", 0, 6));
        candidate.zeroize();
        assert!(candidate.value.is_empty());
    }

    #[test]
    fn test_placeholder_scanning() {
        let text = "[EMAIL_1] met [TÉLÉPHONE_2] and [CREDIT_CARD_3]";
        assert_eq!(placeholder_spans(text).len(), 3);

        let base = base_placeholders(text);
        assert_eq!(base.len(), 2);
        assert_eq!(base[0].1, "EMAIL");
        assert_eq!(base[1].1, "CREDIT_CARD");
        assert_eq!(base[1].2, "3");
    }
}
