//! Overlap resolution.
//!
//! Candidates are ranked by priority (descending), then start (ascending),
//! then span length (descending); category name breaks any remaining tie so
//! the outcome never depends on registration order. A candidate is accepted
//! iff it shares no byte with an already accepted one.

use crate::types::Candidate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Non-overlapping intervals keyed by start
#[derive(Debug, Default)]
struct Occupied {
    intervals: BTreeMap<usize, usize>,
}

impl Occupied {
    /// Accepted intervals are disjoint, so only the last one starting
    /// before `end` can reach into `[start, end)`.
    fn intersects(&self, start: usize, end: usize) -> bool {
        self.intervals
            .range(..end)
            .next_back()
            .is_some_and(|(_, &occupied_end)| occupied_end > start)
    }

    fn insert(&mut self, start: usize, end: usize) {
        self.intervals.insert(start, end);
    }
}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| b.len().cmp(&a.len()))
        .then_with(|| a.category.cmp(&b.category))
}

/// Select a conflict-free subset of `candidates`.
///
/// The accepted matches come back sorted by start descending, ready for
/// right-to-left splicing.
pub fn resolve(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    if candidates.is_empty() {
        return candidates;
    }

    candidates.sort_by(rank);

    let mut occupied = Occupied::default();
    let mut accepted = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate.is_empty() || occupied.intersects(candidate.start, candidate.end) {
            continue;
        }
        occupied.insert(candidate.start, candidate.end);
        accepted.push(candidate);
    }

    accepted.sort_by(|a, b| b.start.cmp(&a.start));
    accepted
}
