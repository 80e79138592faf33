//! Match collection: run every detector of every selected rule over the
//! unmodified input and tag the results with category and priority.

use crate::detector::Detector;
use crate::error::DetectorError;
use crate::policy::Rule;
use crate::types::{placeholder_spans, Candidate, Span};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Collect candidates from all detectors of `rules`.
///
/// Detectors run concurrently. A detector that errors or panics
/// contributes nothing; the remaining detectors are unaffected.
pub fn collect(text: &str, rules: &[&Rule]) -> Vec<Candidate> {
    let jobs: Vec<(&Rule, &dyn Detector)> = rules
        .iter()
        .flat_map(|rule| rule.detectors().iter().map(move |d| (*rule, d.as_ref())))
        .collect();

    let batches: Vec<Vec<Candidate>> = jobs
        .par_iter()
        .map(|(rule, detector)| match run_detector(*detector, text) {
            Ok(spans) => stamp(text, rule, *detector, spans),
            Err(e) => {
                warn!(
                    category = rule.category(),
                    detector = detector.name(),
                    error = %e,
                    "detector failed, contributing no matches"
                );
                Vec::new()
            }
        })
        .collect();

    let candidates: Vec<Candidate> = batches.into_iter().flatten().collect();
    debug!(
        detectors = jobs.len(),
        candidates = candidates.len(),
        "collected candidate matches"
    );
    candidates
}

fn run_detector(detector: &dyn Detector, text: &str) -> Result<Vec<Span>, DetectorError> {
    match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(text))) {
        Ok(result) => result,
        Err(_) => Err(DetectorError::Panicked {
            detector: detector.name().to_string(),
        }),
    }
}

fn stamp(text: &str, rule: &Rule, detector: &dyn Detector, spans: Vec<Span>) -> Vec<Candidate> {
    spans
        .into_iter()
        .filter(|span| {
            let valid = span.is_valid_for(text);
            if !valid {
                warn!(
                    detector = detector.name(),
                    start = span.start,
                    end = span.end,
                    "dropping span with invalid offsets"
                );
            }
            valid
        })
        .map(|span| Candidate::new(rule.category(), rule.priority(), span))
        .collect()
}

/// Byte ranges of every occurrence of each allowlisted term
pub fn allowlist_spans(text: &str, terms: &[String]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for term in terms.iter().filter(|t| !t.is_empty()) {
        for (start, _) in text.match_indices(term.as_str()) {
            spans.push((start, start + term.len()));
        }
    }
    spans
}

/// Drop candidates touching placeholders already present in the text or
/// any of the `reserved` ranges.
pub fn exclude_reserved(
    text: &str,
    candidates: Vec<Candidate>,
    reserved: &[(usize, usize)],
) -> Vec<Candidate> {
    let mut blocked = placeholder_spans(text);
    blocked.extend_from_slice(reserved);
    if blocked.is_empty() {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|c| !blocked.iter().any(|&(start, end)| c.overlaps(start, end)))
        .collect()
}
