//! Candidate ranking and run statistics.

use crate::models::Candidate;
use std::cmp::Ordering;

/// Indices of `candidates`, strongest anomaly first.
///
/// Sorted by deviation magnitude, descending; equal magnitudes are ordered
/// by tile id so the ranking does not depend on input order.
pub fn rank(candidates: &[Candidate]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| compare_strength(&candidates[a], &candidates[b]));
    order
}

/// Indices of the `n` strongest candidates, strongest first.
pub fn top_n(candidates: &[Candidate], n: usize) -> Vec<usize> {
    let mut order = rank(candidates);
    order.truncate(n);
    order
}

fn compare_strength(a: &Candidate, b: &Candidate) -> Ordering {
    b.strength()
        .total_cmp(&a.strength())
        .then_with(|| a.tile.id.cmp(&b.tile.id))
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub tiles_total: usize,
    pub tiles_fetched: usize,
    pub tiles_skipped: usize,
    pub candidates: usize,
    pub advised: usize,
    pub advisory_failed: usize,
}

impl RunStats {
    /// Share of tiles that returned usable data.
    pub fn coverage(&self) -> f64 {
        if self.tiles_total == 0 {
            0.0
        } else {
            self.tiles_fetched as f64 / self.tiles_total as f64
        }
    }

    /// Plain-text summary for the console.
    pub fn summary_text(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "Tiles: {} total, {} fetched, {} skipped ({:.1}% coverage)",
            self.tiles_total,
            self.tiles_fetched,
            self.tiles_skipped,
            self.coverage() * 100.0
        ));
        lines.push(format!("Candidates: {}", self.candidates));
        if self.advised > 0 || self.advisory_failed > 0 {
            lines.push(format!(
                "Advisories: {} received, {} failed",
                self.advised, self.advisory_failed
            ));
        }
        lines.join("\n")
    }
}
