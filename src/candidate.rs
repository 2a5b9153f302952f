//! Candidate permutations for extending a partial sequence, and their scores.
//!
//! Candidates are gathered in tiers of decreasing overlap with the end being
//! extended. Every candidate must pass the hard filters held in [`Evidence`]:
//! constraint laminates, anti-laminates and the loser threshold. Candidates that
//! touch a limbo (n−1)-mer are used only when nothing else is left.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::config::ScoringWeights;
use crate::error::{ConstructError, Result};
use crate::formulas::FormulaLibrary;
use crate::kmer_stats::WinnerLoserTable;
use crate::laminate::{is_compatible, is_forbidden, Laminate};
use crate::layout::LayoutMemory;
use crate::permutation::{
    append_with_overlap, calculate_overlap, decode, is_permutation, kmers, permutation_occurrences,
    permutations_with_prefix, permutations_with_suffix, rank_bytes, validate_sequence,
    PermutationId,
};
use crate::prodigal::ProdigalStore;

/// Read-only evidence consulted while choosing and filtering candidates.
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    pub order: usize,
    pub table: &'a WinnerLoserTable,
    pub layout: &'a LayoutMemory,
    pub constraint_laminates: &'a [Laminate],
    pub anti_laminates: &'a [Laminate],
    pub limbo: &'a HashSet<String>,
    /// A permutation containing a k-mer with a loser weight above this is rejected.
    pub loser_threshold: i64,
}

impl<'a> Evidence<'a> {
    /// Window lengths `n−1` and `n−2` (when at least 1) used by the weight filters.
    pub fn filter_windows(&self) -> impl Iterator<Item = usize> {
        let n = self.order;
        [n.checked_sub(1), n.checked_sub(2)]
            .into_iter()
            .flatten()
            .filter(|&k| k >= 1)
    }

    /// Hard filters: every constraint laminate of this order accepts `perm`, no
    /// anti-laminate forbids it and none of its k-mers is too strong a loser.
    pub fn admits(&self, perm: &str) -> bool {
        let n = self.order;
        if self
            .constraint_laminates
            .iter()
            .filter(|l| l.order() == n)
            .any(|l| !is_compatible(perm, l))
        {
            return false;
        }
        if self
            .anti_laminates
            .iter()
            .filter(|l| l.order() == n)
            .any(|l| is_forbidden(perm, l))
        {
            return false;
        }
        !self.filter_windows().any(|k| {
            kmers(perm, k).any(|kmer| self.table.loser(n, kmer) > self.loser_threshold)
        })
    }

    /// Whether any (n−1)-mer of `perm` is held in limbo.
    pub fn touches_limbo(&self, perm: &str) -> bool {
        let k = self.order.saturating_sub(1);
        !self.limbo.is_empty() && kmers(perm, k).any(|kmer| self.limbo.contains(kmer))
    }

    /// Net winner-minus-loser weight of every filter window of `sequence`.
    pub fn net_weight(&self, sequence: &str) -> i64 {
        self.filter_windows()
            .map(|k| self.table.net_score(self.order, sequence, k))
            .sum()
    }

    /// Total winner and loser weight of every filter window of `sequence`.
    pub fn weight_totals(&self, sequence: &str) -> (i64, i64) {
        let n = self.order;
        let mut winner = 0;
        let mut loser = 0;
        for k in self.filter_windows() {
            for kmer in kmers(sequence, k) {
                winner += self.table.winner(n, kmer);
                loser += self.table.loser(n, kmer);
            }
        }
        (winner, loser)
    }
}

/// Which end of a partial sequence a candidate attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionEnd {
    Prefix,
    Suffix,
    /// Appended to the suffix while heading for a segment that starts with `next_prefix`.
    Bridge { next_prefix: String },
}

/// Every weighted term of a candidate score; `total` is their sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub overlap: f64,
    pub missing: f64,
    pub layout: f64,
    pub prodigal: f64,
    pub winner: f64,
    pub loser: f64,
    pub anti_laminate: f64,
    pub lookahead: f64,
    pub discrepancy: f64,
    pub symmetry: f64,
    pub connectivity: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.overlap
            + self.missing
            + self.layout
            + self.prodigal
            + self.winner
            + self.loser
            + self.anti_laminate
            + self.lookahead
            + self.discrepancy
            + self.symmetry
            + self.connectivity
    }
}

/// Produces and scores the permutations that may extend a partial sequence.
pub trait CandidateGenerator {
    fn order(&self) -> usize;

    /// Admissible candidate ids in ascending order.
    fn generate(
        &self,
        partial: &str,
        missing: &HashSet<PermutationId>,
        end: &ExtensionEnd,
    ) -> Vec<PermutationId>;

    fn score(
        &self,
        partial: &str,
        candidate: PermutationId,
        missing: &HashSet<PermutationId>,
        end: &ExtensionEnd,
    ) -> Result<f64>;
}

/// Tiered candidate search.
///
/// Overlaps run from `min(n−1, |partial|)` down to 0. Extending an end stops
/// after the first tier that holds a still-missing permutation; once nothing is
/// missing the first non-empty tier wins. Bridges gather every tier with a
/// positive overlap. Limbo candidates are returned only if no other survives.
pub fn generate_candidates(
    partial: &str,
    missing: &HashSet<PermutationId>,
    evidence: &Evidence<'_>,
    end: &ExtensionEnd,
) -> Vec<PermutationId> {
    let n = evidence.order;
    let max_overlap = n.saturating_sub(1).min(partial.len());
    let lowest = match end {
        ExtensionEnd::Bridge { .. } if !partial.is_empty() => 1,
        _ => 0,
    };
    let mut clean = BTreeSet::new();
    let mut limbo = BTreeSet::new();
    for overlap in (lowest..=max_overlap).rev() {
        let tier = match end {
            ExtensionEnd::Prefix => permutations_with_suffix(&partial[..overlap], n),
            _ => permutations_with_prefix(&partial[partial.len() - overlap..], n),
        };
        let mut tier_has_missing = false;
        for perm in tier {
            if !evidence.admits(&perm) {
                continue;
            }
            let id = rank_bytes(perm.as_bytes());
            tier_has_missing |= missing.contains(&id);
            if evidence.touches_limbo(&perm) {
                limbo.insert(id);
            } else {
                clean.insert(id);
            }
        }
        let stop = match end {
            ExtensionEnd::Bridge { .. } => false,
            _ if missing.is_empty() => !clean.is_empty() || !limbo.is_empty(),
            _ => tier_has_missing,
        };
        if stop {
            break;
        }
    }
    let chosen = if clean.is_empty() { limbo } else { clean };
    chosen.into_iter().collect()
}

/// Scores candidates against the evidence, the stored prodigals and a formula library.
pub struct EvidenceGuidedGenerator<'a> {
    evidence: Evidence<'a>,
    prodigal_perms: HashSet<PermutationId>,
    weights: &'a ScoringWeights,
    formulas: &'a dyn FormulaLibrary,
}

impl<'a> EvidenceGuidedGenerator<'a> {
    /// `prodigal_limit` bounds how many of the best stored prodigals lend their
    /// permutations the prodigal bonus.
    pub fn new(
        evidence: Evidence<'a>,
        prodigals: &ProdigalStore,
        prodigal_limit: usize,
        weights: &'a ScoringWeights,
        formulas: &'a dyn FormulaLibrary,
    ) -> Self {
        let n = evidence.order;
        let mut prodigal_perms = HashSet::new();
        for prodigal in prodigals.top(n, prodigal_limit) {
            let bytes = prodigal.sequence.as_bytes();
            for start in permutation_occurrences(&prodigal.sequence, n) {
                prodigal_perms.insert(rank_bytes(&bytes[start..start + n]));
            }
        }
        Self {
            evidence,
            prodigal_perms,
            weights,
            formulas,
        }
    }

    pub fn evidence(&self) -> &Evidence<'a> {
        &self.evidence
    }

    pub fn formulas(&self) -> &'a dyn FormulaLibrary {
        self.formulas
    }

    /// Every term of the score of attaching `candidate` to `partial`.
    pub fn breakdown(
        &self,
        partial: &str,
        candidate: &str,
        missing: &HashSet<PermutationId>,
        end: &ExtensionEnd,
    ) -> ScoreBreakdown {
        let n = self.evidence.order;
        let w = self.weights;
        let id = rank_bytes(candidate.as_bytes());

        // Only the edge of the extended sequence near the candidate matters.
        let (overlap, edge, extended_len) = match end {
            ExtensionEnd::Prefix => {
                let o = calculate_overlap(candidate, partial);
                let head = &partial[..partial.len().min(n)];
                (o, format!("{}{}", &candidate[..n - o], head), partial.len() + n - o)
            }
            ExtensionEnd::Suffix | ExtensionEnd::Bridge { .. } => {
                let o = calculate_overlap(partial, candidate);
                let tail = &partial[partial.len().saturating_sub(n)..];
                (o, format!("{}{}", tail, &candidate[o..]), partial.len() + n - o)
            }
        };
        let bridge_overlap = match end {
            ExtensionEnd::Bridge { next_prefix } => calculate_overlap(candidate, next_prefix),
            _ => 0,
        };

        let newly_covered = missing.contains(&id);
        let remaining = missing.len() - usize::from(newly_covered);
        let projected = self.projected_overlap(&edge, id, missing, end);
        let (winners, losers) = self.evidence.weight_totals(candidate);
        let forbidden = self
            .evidence
            .anti_laminates
            .iter()
            .any(|anti| anti.order() == n && is_forbidden(candidate, anti));
        let reversed: Vec<u8> = candidate.bytes().rev().collect();
        let (layout, connectivity) = if n >= 2 {
            (
                self.evidence
                    .layout
                    .get_layout_score(n, &candidate[..n - 1], &candidate[1..]) as f64,
                self.evidence.layout.successor_count(n, &candidate[1..]) as f64 / n as f64,
            )
        } else {
            (0.0, 0.0)
        };
        let discrepancy = self.formulas.discrepancy(n, extended_len + remaining);

        ScoreBreakdown {
            overlap: w.overlap * (overlap + bridge_overlap) as f64,
            missing: if newly_covered { w.missing } else { 0.0 },
            layout: w.layout * layout,
            prodigal: if self.prodigal_perms.contains(&id) { w.prodigal } else { 0.0 },
            winner: w.winner * winners as f64,
            loser: -w.loser * losers as f64,
            anti_laminate: if forbidden { -w.anti_laminate } else { 0.0 },
            lookahead: w.lookahead * self.formulas.lookahead(n, projected),
            discrepancy: -w.discrepancy * (-discrepancy).max(0.0),
            symmetry: if missing.contains(&rank_bytes(&reversed)) { 0.0 } else { w.symmetry },
            connectivity: w.connectivity * connectivity,
        }
    }

    /// Longest `j < n` such that the `j` symbols at the open end of `edge` start
    /// (or, for prefixes, finish) some other still-missing permutation.
    fn projected_overlap(
        &self,
        edge: &str,
        candidate: PermutationId,
        missing: &HashSet<PermutationId>,
        end: &ExtensionEnd,
    ) -> usize {
        let n = self.evidence.order;
        for j in (1..n).rev() {
            if edge.len() < j {
                continue;
            }
            let followers = match end {
                ExtensionEnd::Prefix => permutations_with_suffix(&edge[..j], n),
                _ => permutations_with_prefix(&edge[edge.len() - j..], n),
            };
            let reachable = followers.iter().any(|perm| {
                let id = rank_bytes(perm.as_bytes());
                id != candidate && missing.contains(&id)
            });
            if reachable {
                return j;
            }
        }
        0
    }
}

impl CandidateGenerator for EvidenceGuidedGenerator<'_> {
    fn order(&self) -> usize {
        self.evidence.order
    }

    fn generate(
        &self,
        partial: &str,
        missing: &HashSet<PermutationId>,
        end: &ExtensionEnd,
    ) -> Vec<PermutationId> {
        generate_candidates(partial, missing, &self.evidence, end)
    }

    fn score(
        &self,
        partial: &str,
        candidate: PermutationId,
        missing: &HashSet<PermutationId>,
        end: &ExtensionEnd,
    ) -> Result<f64> {
        let perm = decode(candidate, self.evidence.order)?;
        Ok(self.breakdown(partial, &perm, missing, end).total())
    }
}

/// Permutations of order `n` obtained by inserting the symbol `n` into a
/// permutation of order `n−1`, restricted to those the evidence admits.
pub fn insert_symbol_candidates(
    window: &str,
    n: usize,
    evidence: &Evidence<'_>,
) -> Result<Vec<PermutationId>> {
    if n < 2 || !is_permutation(window, n - 1) {
        return Err(ConstructError::InvalidInput(format!(
            "'{}' is not a permutation of order {}",
            window,
            n.saturating_sub(1)
        )));
    }
    let symbol = (b'0' + n as u8) as char;
    let mut ids: Vec<PermutationId> = (0..n)
        .map(|at| {
            let mut perm = String::with_capacity(n);
            perm.push_str(&window[..at]);
            perm.push(symbol);
            perm.push_str(&window[at..]);
            perm
        })
        .filter(|perm| evidence.admits(perm))
        .map(|perm| rank_bytes(perm.as_bytes()))
        .collect();
    ids.sort_unstable();
    Ok(ids)
}

/// Lift a segment of order `n−1` to order `n`.
///
/// Each occurrence `p` of the segment becomes the block `p·n·p`, whose `n`
/// windows of length `n` are the rotations that put `n` after a prefix of `p`.
/// Blocks with a window the evidence rejects are skipped, and the kept blocks
/// are merged at their maximal overlap.
pub fn extend_segment(segment: &str, n: usize, evidence: &Evidence<'_>) -> Result<String> {
    if n < 2 {
        return Err(ConstructError::InvalidInput(format!(
            "cannot lift a segment to order {}",
            n
        )));
    }
    validate_sequence(segment, n - 1)?;
    let symbol = (b'0' + n as u8) as char;
    let mut lifted = String::new();
    for start in permutation_occurrences(segment, n - 1) {
        let perm = &segment[start..start + n - 1];
        let mut block = String::with_capacity(2 * n - 1);
        block.push_str(perm);
        block.push(symbol);
        block.push_str(perm);
        let admitted = (0..n).all(|i| evidence.admits(&block[i..i + n]));
        if admitted {
            append_with_overlap(&mut lifted, &block);
        }
    }
    Ok(lifted)
}
