//! Length predictions and other pluggable numeric formulas.

use crate::kmer_stats::WinnerLoserTable;
use crate::permutation::{factorial, kmers, occurrence_overlaps, permutation_occurrences};

pub const PHI: f64 = 1.618_033_988_749_895;

/// Shortest known superpermutation lengths.
pub fn known_length(n: usize) -> Option<usize> {
    match n {
        1 => Some(1),
        2 => Some(3),
        3 => Some(9),
        4 => Some(33),
        5 => Some(153),
        6 => Some(872),
        7 => Some(5906),
        _ => None,
    }
}

/// `Σ_{i=1..n} i!`.
pub fn sp_lower_bound(n: usize) -> usize {
    (1..=n).map(factorial).sum()
}

pub fn sp_additive(n: usize, previous: f64) -> f64 {
    factorial(n) as f64 + previous
}

/// `L(n−1)·n/φ`.
pub fn sp_v14(n: usize, previous: f64) -> f64 {
    previous * n as f64 / PHI
}

/// `(n/φ)(1 + 0.1·i)` for an estimate `i` of the imperfect transitions.
pub fn segment_length_best(n: usize, imperfect: f64) -> f64 {
    (n as f64 / PHI) * (1.0 + 0.1 * imperfect)
}

/// Imperfect transitions of the recursive construction, `(n−2)! − 1`.
pub fn imperfect_estimate(n: usize) -> f64 {
    if n < 2 {
        0.0
    } else {
        factorial(n - 2) as f64 - 1.0
    }
}

/// Total overlap deficit `Σ (n−1 − overlap)` over consecutive occurrences.
pub fn action_a1(sequence: &str, n: usize) -> f64 {
    let positions = permutation_occurrences(sequence, n);
    occurrence_overlaps(&positions, n)
        .into_iter()
        .map(|o| n.saturating_sub(1).saturating_sub(o) as f64)
        .sum()
}

/// [`action_a1`] plus the net loser weight of every occurrence's (n−1)- and (n−2)-mers.
pub fn action_a2(sequence: &str, n: usize, table: &WinnerLoserTable) -> f64 {
    let mut action = action_a1(sequence, n);
    for start in permutation_occurrences(sequence, n) {
        let window = &sequence[start..start + n];
        for k in [n.saturating_sub(1), n.saturating_sub(2)] {
            if k == 0 {
                continue;
            }
            for kmer in kmers(window, k) {
                action -= table.weight(n, kmer) as f64;
            }
        }
    }
    action
}

/// Numeric functions the scorer and strategies consult by contract only.
pub trait FormulaLibrary: Send + Sync {
    fn predicted_length(&self, n: usize) -> f64;

    /// Predicted minus actual; negative when `length` overshoots the prediction.
    fn discrepancy(&self, n: usize, length: usize) -> f64 {
        self.predicted_length(n) - length as f64
    }

    fn segment_length(&self, n: usize, imperfect_estimate: f64) -> f64;

    fn lookahead(&self, n: usize, projected_overlap: usize) -> f64;

    /// Named action functions; unknown names contribute nothing.
    fn action(&self, _name: &str, _sequence: &str, _n: usize, _table: &WinnerLoserTable) -> f64 {
        0.0
    }
}

/// Which recurrence predicts lengths beyond the known values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthFormula {
    /// `L(n−1) + n!`.
    #[default]
    Additive,
    /// `L(n−1)·n/φ`.
    GoldenRatio,
    LowerBound,
}

#[derive(Debug, Clone, Default)]
pub struct StandardFormulas {
    pub length: LengthFormula,
}

impl StandardFormulas {
    pub fn new(length: LengthFormula) -> Self {
        Self { length }
    }
}

impl FormulaLibrary for StandardFormulas {
    fn predicted_length(&self, n: usize) -> f64 {
        if let Some(known) = known_length(n) {
            return known as f64;
        }
        if n == 0 {
            return 0.0;
        }
        match self.length {
            LengthFormula::LowerBound => sp_lower_bound(n) as f64,
            LengthFormula::Additive => sp_additive(n, self.predicted_length(n - 1)),
            LengthFormula::GoldenRatio => sp_v14(n, self.predicted_length(n - 1)),
        }
    }

    fn segment_length(&self, n: usize, imperfect_estimate: f64) -> f64 {
        segment_length_best(n, imperfect_estimate)
    }

    fn lookahead(&self, _n: usize, projected_overlap: usize) -> f64 {
        projected_overlap as f64
    }

    fn action(&self, name: &str, sequence: &str, n: usize, table: &WinnerLoserTable) -> f64 {
        match name {
            "a1" | "action_a1" => action_a1(sequence, n),
            "a2" | "action_a2" => action_a2(sequence, n, table),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer_stats::KmerKey;

    #[test]
    fn bounds_and_predictions() {
        assert_eq!(sp_lower_bound(4), 33);
        assert_eq!(sp_lower_bound(5), 153);
        let formulas = StandardFormulas::default();
        assert_eq!(formulas.predicted_length(6), 872.0);
        assert_eq!(formulas.predicted_length(8), 5906.0 + 40320.0);
        assert_eq!(formulas.discrepancy(3, 10), -1.0);

        let golden = StandardFormulas::new(LengthFormula::GoldenRatio);
        assert!((golden.predicted_length(8) - 5906.0 * 8.0 / PHI).abs() < 1e-9);
    }

    #[test]
    fn actions_measure_overlap_deficit() {
        let formulas = StandardFormulas::default();
        let table = WinnerLoserTable::new();
        assert_eq!(formulas.action("a1", "123121321", 3, &table), 1.0);
        assert_eq!(formulas.action("a5", "123121321", 3, &table), 0.0);

        let mut losers = WinnerLoserTable::new();
        losers.add(KmerKey::new(3, "12"), -2);
        // "12" occurs in 123 and 312.
        assert_eq!(action_a2("123121321", 3, &losers), 1.0 + 4.0);
    }

    #[test]
    fn segment_lengths_grow_with_imperfections() {
        assert!(segment_length_best(6, 10.0) > segment_length_best(6, 0.0));
        assert_eq!(imperfect_estimate(6), 23.0);
    }
}
