//! Whole-sequence measurements: transitions, coverage, segments and scores.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use strsim::normalized_damerau_levenshtein;

use crate::candidate::Evidence;
use crate::config::ScoringWeights;
use crate::debruijn::{self, DeBruijnAnalysis};
use crate::error::Result;
use crate::formulas::FormulaLibrary;
use crate::layout::LayoutMemory;
use crate::permutation::{
    covered_permutations, factorial, kmers, occurrence_overlaps, permutation_occurrences,
    validate_sequence,
};
use crate::prodigal::ProdigalStore;

/// Consecutive occurrences whose positional overlap is below `n−1`.
pub fn count_imperfect_transitions(sequence: &str, n: usize) -> usize {
    let positions = permutation_occurrences(sequence, n);
    occurrence_overlaps(&positions, n)
        .into_iter()
        .filter(|&o| o + 1 < n)
        .count()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionDistribution {
    /// Overlap value → number of transitions with that overlap.
    pub histogram: BTreeMap<usize, usize>,
    pub mean: f64,
    pub variance: f64,
    /// Start of the first occurrence of every imperfect pair.
    pub imperfect_positions: Vec<usize>,
}

pub fn transition_distribution(sequence: &str, n: usize) -> TransitionDistribution {
    let positions = permutation_occurrences(sequence, n);
    let overlaps = occurrence_overlaps(&positions, n);
    let mut histogram = BTreeMap::new();
    for &o in &overlaps {
        *histogram.entry(o).or_insert(0) += 1;
    }
    let (mean, variance) = if overlaps.is_empty() {
        (0.0, 0.0)
    } else {
        let count = overlaps.len() as f64;
        let mean = overlaps.iter().sum::<usize>() as f64 / count;
        let variance = overlaps
            .iter()
            .map(|&o| (o as f64 - mean).powi(2))
            .sum::<f64>()
            / count;
        (mean, variance)
    };
    let imperfect_positions = positions
        .windows(2)
        .zip(&overlaps)
        .filter(|&(_, &o)| o + 1 < n)
        .map(|(pair, _)| pair[0])
        .collect();
    TransitionDistribution {
        histogram,
        mean,
        variance,
        imperfect_positions,
    }
}

/// Fraction of the `n!` permutations present in `sequence`.
pub fn permutation_coverage(sequence: &str, n: usize) -> Result<f64> {
    let covered = covered_permutations(sequence, n)?;
    Ok(covered.len() as f64 / factorial(n) as f64)
}

/// Maximal runs of occurrences joined by perfect `n−1` overlaps.
pub fn extract_segments(sequence: &str, n: usize) -> Vec<String> {
    let positions = permutation_occurrences(sequence, n);
    let mut segments = Vec::new();
    let Some(&first) = positions.first() else {
        return segments;
    };
    let (mut start, mut end) = (first, first);
    for &p in &positions[1..] {
        if p != end + 1 {
            segments.push(sequence[start..end + n].to_string());
            start = p;
        }
        end = p;
    }
    segments.push(sequence[start..end + n].to_string());
    segments
}

/// Normalised Damerau-Levenshtein similarity in `[0, 1]`.
pub fn segment_similarity(a: &str, b: &str) -> f64 {
    normalized_damerau_levenshtein(a, b)
}

/// Keep segments in order, dropping any at least `threshold` similar to one already kept.
pub fn select_diverse(segments: Vec<String>, threshold: f64) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    for segment in segments {
        if kept
            .iter()
            .all(|other| segment_similarity(other, &segment) < threshold)
        {
            kept.push(segment);
        }
    }
    kept
}

/// Weighted quality of a whole sequence: overlap, net weights, layout
/// transitions and contained prodigals, minus imperfect transitions.
pub fn sequence_score(
    sequence: &str,
    n: usize,
    evidence: &Evidence<'_>,
    prodigals: &ProdigalStore,
    weights: &ScoringWeights,
) -> f64 {
    let positions = permutation_occurrences(sequence, n);
    let overlaps = occurrence_overlaps(&positions, n);
    let overlap: usize = overlaps.iter().sum();
    let imperfect = overlaps.iter().filter(|&&o| o + 1 < n).count();
    let (winners, losers) = evidence.weight_totals(sequence);
    let layout: u64 = if n >= 2 {
        positions
            .iter()
            .map(|&p| {
                evidence
                    .layout
                    .get_layout_score(n, &sequence[p..p + n - 1], &sequence[p + 1..p + n])
            })
            .sum()
    } else {
        0
    };
    let contained = prodigals
        .get_best(n)
        .into_iter()
        .filter(|p| sequence.contains(p.sequence.as_str()))
        .count();

    weights.overlap * overlap as f64 + weights.winner * winners as f64
        - weights.loser * losers as f64
        + weights.layout * layout as f64
        + weights.prodigal * contained as f64
        - weights.imperfect_transition * imperfect as f64
}

/// Mean number of distinct layout successors over the sequence's (n−1)-mers.
pub fn connectivity_score(sequence: &str, n: usize, layout: &LayoutMemory) -> f64 {
    let k = n.saturating_sub(1);
    let windows: Vec<&str> = kmers(sequence, k).collect();
    if windows.is_empty() {
        return 0.0;
    }
    let total: usize = windows
        .iter()
        .map(|kmer| layout.successor_count(n, kmer))
        .sum();
    total as f64 / windows.len() as f64
}

/// Summary printed by the profiling binary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceProfile {
    pub order: usize,
    pub length: usize,
    pub occurrences: usize,
    pub coverage: f64,
    pub missing: usize,
    pub imperfect_transitions: usize,
    pub transitions: TransitionDistribution,
    pub segments: usize,
    pub longest_segment: usize,
    pub predicted_length: f64,
    pub discrepancy: f64,
    /// Graph of the distinct (n−1)-mers; absent below order 3.
    pub de_bruijn: Option<DeBruijnAnalysis>,
}

pub fn profile(sequence: &str, n: usize, formulas: &dyn FormulaLibrary) -> Result<SequenceProfile> {
    validate_sequence(sequence, n)?;
    let covered = covered_permutations(sequence, n)?.len();
    let segments = extract_segments(sequence, n);
    let de_bruijn = if n >= 3 {
        let distinct: BTreeSet<&str> = kmers(sequence, n - 1).collect();
        let distinct: Vec<&str> = distinct.into_iter().collect();
        Some(debruijn::analyze(&debruijn::build(&distinct, n - 1)?))
    } else {
        None
    };
    Ok(SequenceProfile {
        order: n,
        length: sequence.len(),
        occurrences: permutation_occurrences(sequence, n).len(),
        coverage: covered as f64 / factorial(n) as f64,
        missing: factorial(n) - covered,
        imperfect_transitions: count_imperfect_transitions(sequence, n),
        transitions: transition_distribution(sequence, n),
        segments: segments.len(),
        longest_segment: segments.iter().map(String::len).max().unwrap_or(0),
        predicted_length: formulas.predicted_length(n),
        discrepancy: formulas.discrepancy(n, sequence.len()),
        de_bruijn,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulas::StandardFormulas;
    use crate::kmer_stats::WinnerLoserTable;
    use std::collections::HashSet;

    const MINIMAL_3: &str = "123121321";

    #[test]
    fn transitions_of_the_minimal_sequence() {
        assert_eq!(count_imperfect_transitions(MINIMAL_3, 3), 1);
        let dist = transition_distribution(MINIMAL_3, 3);
        assert_eq!(dist.histogram.get(&2), Some(&4));
        assert_eq!(dist.histogram.get(&1), Some(&1));
        assert!((dist.mean - 1.8).abs() < 1e-12);
        assert!((dist.variance - 0.16).abs() < 1e-12);
        assert_eq!(dist.imperfect_positions, vec![2]);
    }

    #[test]
    fn coverage_and_segments() {
        assert_eq!(permutation_coverage(MINIMAL_3, 3).expect("order 3"), 1.0);
        assert_eq!(permutation_coverage("123", 3).expect("order 3"), 1.0 / 6.0);
        assert_eq!(extract_segments(MINIMAL_3, 3), vec!["12312", "21321"]);
        assert!(extract_segments("111", 3).is_empty());
    }

    #[test]
    fn diverse_selection_drops_near_duplicates() {
        let segments = vec!["12312".to_string(), "12312".to_string(), "21321".to_string()];
        assert_eq!(select_diverse(segments, 0.9), vec!["12312", "21321"]);
        assert_eq!(segment_similarity("123", "123"), 1.0);
    }

    #[test]
    fn imperfect_transitions_lower_the_score() {
        let table = WinnerLoserTable::new();
        let layout = LayoutMemory::new();
        let limbo = HashSet::new();
        let evidence = Evidence {
            order: 3,
            table: &table,
            layout: &layout,
            constraint_laminates: &[],
            anti_laminates: &[],
            limbo: &limbo,
            loser_threshold: 20,
        };
        let store = ProdigalStore::new();
        let weights = ScoringWeights::default();
        let perfect = sequence_score("12312", 3, &evidence, &store, &weights);
        let broken = sequence_score("1231321", 3, &evidence, &store, &weights);
        assert_eq!(perfect, 20.0);
        assert_eq!(broken, 25.0 - 100.0);
    }

    #[test]
    fn connectivity_reads_layout_successors() {
        let mut layout = LayoutMemory::new();
        layout.add_sequence(MINIMAL_3, 3, 2, "test");
        assert_eq!(connectivity_score("123", 3, &layout), 1.0);
        assert_eq!(connectivity_score("", 3, &layout), 0.0);
    }

    #[test]
    fn profile_reports_discrepancy_and_graph() {
        let profile = profile(MINIMAL_3, 3, &StandardFormulas::default()).expect("valid sequence");
        assert_eq!(profile.length, 9);
        assert_eq!(profile.missing, 0);
        assert_eq!(profile.discrepancy, 0.0);
        assert_eq!(profile.segments, 2);
        let graph = profile.de_bruijn.expect("order 3 has a graph");
        assert_eq!(graph.num_edges, 6);
    }
}
