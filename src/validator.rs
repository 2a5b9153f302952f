//! Bouncing-batch validation of a hypothetical superpermutation.
//!
//! The sequence is cut into grid cells, one per grid point. Every window start
//! belongs to exactly one cell and each cell reads up to `n` symbols past its
//! range, so windows that straddle a boundary are still seen. Cells report
//! independently and their reports fold with an associative, commutative merge.
//! Anti-prodigals are judged once over the whole sequence, so no part of the
//! report depends on the grid shape.

use std::collections::BTreeSet;

use log::debug;
use serde::Serialize;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::Result;
use crate::kmer_stats::{identify_anti_prodigals, KmerKey, WinnerLoserTable};
use crate::layout::LayoutMemory;
use crate::permutation::{
    factorial, is_permutation_bytes, rank_bytes, validate_sequence, PermutationId,
};

/// Contract of a validator: validity, length and the evidence gathered on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub length: usize,
    pub missing: usize,
    /// Signed k-mer deltas: +1 before perfect transitions, −1 before imperfect ones.
    pub delta: WinnerLoserTable,
    pub anti_prodigals: BTreeSet<String>,
    pub layout: LayoutMemory,
}

/// Compact summary of a report for logs and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub is_valid: bool,
    pub length: usize,
    pub missing: usize,
    pub delta_keys: usize,
    pub anti_prodigals: usize,
}

impl ValidationReport {
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            is_valid: self.is_valid,
            length: self.length,
            missing: self.missing,
            delta_keys: self.delta.len(),
            anti_prodigals: self.anti_prodigals.len(),
        }
    }
}

pub trait SequenceValidator {
    fn validate(&self, sequence: &str, n: usize, table: &WinnerLoserTable) -> Result<ValidationReport>;
}

/// Partial statistics of one cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellReport {
    pub covered: BTreeSet<PermutationId>,
    pub delta: WinnerLoserTable,
    pub layout: LayoutMemory,
}

impl CellReport {
    pub fn merge(mut self, other: CellReport) -> CellReport {
        self.covered.extend(other.covered);
        self.delta.update(&other.delta);
        self.layout.merge(&other.layout);
        self
    }
}

/// Reference validator running one cell per point of a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct BouncingBatch {
    pub grid_dimensions: Vec<usize>,
    pub overlap_threshold: f64,
    pub anti_threshold: f64,
}

impl BouncingBatch {
    pub fn new(grid_dimensions: Vec<usize>, overlap_threshold: f64, anti_threshold: f64) -> Self {
        Self {
            grid_dimensions,
            overlap_threshold,
            anti_threshold,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.grid_dimensions
            .iter()
            .map(|&d| d.max(1))
            .product::<usize>()
            .max(1)
    }

    /// Window-start ranges of each cell.
    pub fn cell_ranges(&self, length: usize, n: usize) -> Vec<(usize, usize)> {
        let starts = if length >= n { length - n + 1 } else { 0 };
        let cells = self.cell_count().min(starts.max(1));
        let width = starts.div_ceil(cells).max(1);
        (0..cells)
            .map(|c| (c * width, ((c + 1) * width).min(starts)))
            .filter(|(lo, hi)| lo < hi)
            .collect()
    }

    /// Statistics of the windows starting in `lo..hi`.
    ///
    /// `first` is the start of the first occurrence of the whole sequence; it
    /// has no predecessor and therefore no transition.
    pub fn cell_report(
        &self,
        sequence: &str,
        n: usize,
        (lo, hi): (usize, usize),
        first: Option<usize>,
    ) -> CellReport {
        let bytes = sequence.as_bytes();
        let k = n.saturating_sub(1);
        let mut report = CellReport::default();
        for q in lo..hi {
            let window = &bytes[q..q + n];
            if !is_permutation_bytes(window, n) {
                continue;
            }
            report.covered.insert(rank_bytes(window));
            if k >= 1 {
                report.layout.record(
                    KmerKey::new(n, &sequence[q..q + k]),
                    KmerKey::new(n, &sequence[q + 1..q + 1 + k]),
                    "bouncing_batch",
                );
            }
            if first.map_or(true, |f| q <= f) || k == 0 || q < k {
                continue;
            }
            let perfect = is_permutation_bytes(&bytes[q - 1..q - 1 + n], n);
            report
                .delta
                .add(KmerKey::new(n, &sequence[q - k..q]), if perfect { 1 } else { -1 });
        }
        report
    }
}

impl SequenceValidator for BouncingBatch {
    fn validate(&self, sequence: &str, n: usize, table: &WinnerLoserTable) -> Result<ValidationReport> {
        validate_sequence(sequence, n)?;
        let bytes = sequence.as_bytes();
        let first = if bytes.len() >= n {
            bytes.windows(n).position(|w| is_permutation_bytes(w, n))
        } else {
            None
        };
        let ranges = self.cell_ranges(sequence.len(), n);

        #[cfg(feature = "parallel")]
        let reports: Vec<CellReport> = ranges
            .par_iter()
            .map(|&range| self.cell_report(sequence, n, range, first))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let reports: Vec<CellReport> = ranges
            .iter()
            .map(|&range| self.cell_report(sequence, n, range, first))
            .collect();

        let merged = reports
            .into_iter()
            .fold(CellReport::default(), CellReport::merge);
        let anti_prodigals = if n >= 2 {
            identify_anti_prodigals(
                &[sequence],
                n,
                n - 1,
                self.overlap_threshold,
                table,
                self.anti_threshold,
            )?
        } else {
            BTreeSet::new()
        };
        let missing = factorial(n) - merged.covered.len();
        debug!(
            "bouncing batch n={} over {} cells: length {}, {} missing, {} anti-prodigals",
            n,
            ranges.len(),
            sequence.len(),
            missing,
            anti_prodigals.len()
        );
        Ok(ValidationReport {
            is_valid: missing == 0,
            length: sequence.len(),
            missing,
            delta: merged.delta,
            anti_prodigals,
            layout: merged.layout,
        })
    }
}
