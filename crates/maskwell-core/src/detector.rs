use crate::error::DetectorError;
use crate::types::{DetectorKind, Span};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;

/// Core detection trait – every rule holds one or more detectors
pub trait Detector: Send + Sync {
    /// Stable name used in logs
    fn name(&self) -> &str;

    fn kind(&self) -> DetectorKind;

    /// Detect candidate spans in `text`.
    ///
    /// Contract:
    /// - MUST NOT assume the text has been partially redacted
    /// - MUST return UTF-8 byte offsets into `text`
    /// - MAY return overlapping spans (resolved downstream)
    fn detect(&self, text: &str) -> Result<Vec<Span>, DetectorError>;
}

/// Regex-backed detector with optional post-match validation
pub struct PatternDetector {
    name: String,
    regex: Regex,
    min_digits: usize,
    validator: Option<fn(&str) -> bool>,
}

impl PatternDetector {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(pattern)?,
            min_digits: 0,
            validator: None,
        })
    }

    /// Reject matches carrying fewer than `count` ASCII digits
    pub fn with_min_digits(mut self, count: usize) -> Self {
        self.min_digits = count;
        self
    }

    /// Reject matches the validator returns `false` for (e.g. Luhn)
    pub fn with_validator(mut self, validator: fn(&str) -> bool) -> Self {
        self.validator = Some(validator);
        self
    }

    fn accepts(&self, candidate: &str) -> bool {
        if self.min_digits > 0
            && candidate.chars().filter(|c| c.is_ascii_digit()).count() < self.min_digits
        {
            return false;
        }
        self.validator.map_or(true, |validate| validate(candidate))
    }
}

impl Detector for PatternDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Pattern
    }

    fn detect(&self, text: &str) -> Result<Vec<Span>, DetectorError> {
        Ok(self
            .regex
            .find_iter(text)
            .filter(|m| self.accepts(m.as_str()))
            .map(|m| Span::new(m.as_str(), m.start(), m.end()))
            .collect())
    }
}

/// Entity span reported by a named-entity recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpan {
    /// Recognizer label, e.g. `PERSON`
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Named-entity recognition capability consumed by [`ModelDetector`]
pub trait EntityRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, DetectorError>;
}

/// Detector fed by an entity recognizer, filtered to a set of labels
pub struct ModelDetector {
    name: String,
    recognizer: Arc<dyn EntityRecognizer>,
    labels: Vec<String>,
}

impl ModelDetector {
    pub fn new(recognizer: Arc<dyn EntityRecognizer>, labels: &[&str]) -> Self {
        Self {
            name: format!("model:{}", recognizer.name()),
            recognizer,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn wants(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

impl Detector for ModelDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Model
    }

    fn detect(&self, text: &str) -> Result<Vec<Span>, DetectorError> {
        let entities = self.recognizer.recognize(text)?;
        Ok(entities
            .into_iter()
            .filter(|e| self.wants(&e.label))
            .filter_map(|e| trim_entity(text, e.start, e.end))
            .collect())
    }
}

/// Recognizers often swallow trailing punctuation ("Doe." / "Smith,").
fn trim_entity(text: &str, start: usize, end: usize) -> Option<Span> {
    let raw = text.get(start..end)?;
    let trimmed = raw.trim_end_matches(|c: char| c.is_whitespace() || ".,!?;:".contains(c));
    let leading = trimmed.len() - trimmed.trim_start().len();
    let value = trimmed.trim_start();
    if value.is_empty() {
        return None;
    }
    let start = start + leading;
    Some(Span::new(value, start, start + value.len()))
}

/// Runs the wrapped recognizer once per distinct text.
///
/// Several model-based rules can share one instance; the first caller runs
/// the model while the others wait on the lock and reuse its output.
pub struct MemoizedRecognizer<R> {
    inner: R,
    last: Mutex<Option<(String, Arc<Vec<EntitySpan>>)>>,
}

impl<R: EntityRecognizer> MemoizedRecognizer<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }
}

impl<R: EntityRecognizer> EntityRecognizer for MemoizedRecognizer<R> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, DetectorError> {
        let mut last = self.last.lock();
        if let Some((seen, entities)) = last.as_ref() {
            if seen == text {
                return Ok(entities.as_ref().clone());
            }
        }
        let entities = Arc::new(self.inner.recognize(text)?);
        *last = Some((text.to_string(), Arc::clone(&entities)));
        Ok(entities.as_ref().clone())
    }
}

static CAPITALIZED_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\p{Lu}\p{Ll}+(?:[ \t]+\p{Lu}\p{Ll}+)*\b").expect("capitalized run regex")
});

/// Capitalized words that open sentences or salutations, never names
const NAME_STOPWORDS: &[&str] = &[
    "A", "An", "The", "My", "Our", "Your", "Hello", "Hi", "Dear", "Contact", "Call", "Email",
    "Send", "Mr", "Mrs", "Ms", "Dr", "Please", "Thanks",
];

/// Capitalized mid-sentence without being names
const CALENDAR_WORDS: &[&str] = &[
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "January",
    "February", "March", "April", "May", "June", "July", "August", "September", "October",
    "November", "December",
];

/// Fallback recognizer for `PERSON` entities.
///
/// Runs of two or more capitalized words are names, as is a single
/// capitalized word inside a sentence. A lone word opening a sentence is
/// indistinguishable from ordinary capitalization and is skipped.
/// Heuristic only; plug a real NER model in through [`EntityRecognizer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicNameRecognizer;

fn opens_sentence(text: &str, start: usize) -> bool {
    match text[..start].trim_end().chars().next_back() {
        None => true,
        Some(c) => matches!(c, '.' | '!' | '?' | ':' | '"' | '\u{201C}'),
    }
}

impl EntityRecognizer for HeuristicNameRecognizer {
    fn name(&self) -> &str {
        "heuristic-names"
    }

    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, DetectorError> {
        let mut entities = Vec::new();
        for run in CAPITALIZED_RUN_RE.find_iter(text) {
            let mut start = run.start();
            let mut words: Vec<&str> = run.as_str().split_whitespace().collect();
            let accepted = if words.len() == 1 {
                let word = words[0];
                !opens_sentence(text, start)
                    && !NAME_STOPWORDS.contains(&word)
                    && !CALENDAR_WORDS.contains(&word)
            } else {
                while words.len() >= 2 && NAME_STOPWORDS.contains(&words[0]) {
                    let skipped = words.remove(0);
                    start += skipped.len();
                    let rest = &text[start..];
                    start += rest.len() - rest.trim_start().len();
                }
                words.len() >= 2
            };
            if !accepted {
                continue;
            }
            let end = run.end();
            entities.push(EntitySpan {
                label: "PERSON".to_string(),
                start,
                end,
                text: text[start..end].to_string(),
            });
        }
        Ok(entities)
    }
}
