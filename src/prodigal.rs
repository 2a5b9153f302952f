//! Prodigals: vetted high-overlap subsequences kept for reuse.
//!
//! A proposed sequence is extended, analysed, and accepted only if it is still a
//! prodigal afterwards and no stored prodigal of the same order has the same
//! sequence. Accepted entries are never deleted; ranking alone decides which
//! ones are used.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::candidate::Evidence;
use crate::error::{ConstructError, Result};
use crate::permutation::{
    calculate_overlap, is_permutation, occurrence_overlaps, permutation_occurrences,
    validate_sequence,
};

/// Thresholds a sequence must meet to count as a prodigal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProdigalCriteria {
    /// Minimum number of permutation occurrences; the sequence must also be at
    /// least `min_length·(n−1)` symbols long.
    pub min_length: usize,
    /// Required fraction of the maximal overlap `n−1` between occurrences.
    pub overlap_threshold: f64,
}

impl Default for ProdigalCriteria {
    fn default() -> Self {
        Self {
            min_length: 10,
            overlap_threshold: 0.98,
        }
    }
}

/// A transition between consecutive occurrences with less than maximal overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Start of the first occurrence of the pair.
    pub position: usize,
    pub overlap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prodigal {
    pub id: u64,
    pub sequence: String,
    pub length: usize,
    pub overlap_rate: f64,
    pub n_value: usize,
    pub source: String,
    pub breakpoints: Vec<Breakpoint>,
    pub winner_score: f64,
    pub loser_score: f64,
    pub extensibility_score: f64,
    pub parent_prodigals: Vec<u64>,
    pub child_prodigals: Vec<u64>,
    pub used_count: u64,
}

/// Mean positional overlap between consecutive occurrences as a fraction of
/// `n−1`; 0 with fewer than two occurrences.
pub fn overlap_rate(sequence: &str, n: usize) -> f64 {
    let positions = permutation_occurrences(sequence, n);
    if positions.len() < 2 || n < 2 {
        return 0.0;
    }
    let total: usize = occurrence_overlaps(&positions, n).iter().sum();
    total as f64 / ((positions.len() - 1) * (n - 1)) as f64
}

/// Length is measured in permutation occurrences: at least `min_length` of them,
/// overlapping on average by at least `overlap_threshold`.
pub fn is_prodigal(sequence: &str, n: usize, criteria: &ProdigalCriteria) -> bool {
    let count = permutation_occurrences(sequence, n).len();
    if count == 0 || count < criteria.min_length {
        return false;
    }
    overlap_rate(sequence, n) >= criteria.overlap_threshold
}

pub fn breakpoints(sequence: &str, n: usize) -> Vec<Breakpoint> {
    let positions = permutation_occurrences(sequence, n);
    positions
        .windows(2)
        .zip(occurrence_overlaps(&positions, n))
        .filter(|&(_, overlap)| overlap + 1 < n)
        .map(|(pair, overlap)| Breakpoint {
            position: pair[0],
            overlap,
        })
        .collect()
}

/// Prodigal runs of `sequence`: occurrences are split wherever the overlap drops
/// below `(n−1)·overlap_threshold`. The whole sequence is listed first when it is
/// itself a prodigal.
pub fn find_prodigal_results(sequence: &str, n: usize, criteria: &ProdigalCriteria) -> Vec<String> {
    let positions = permutation_occurrences(sequence, n);
    let mut found = Vec::new();
    if positions.is_empty() {
        return found;
    }
    if is_prodigal(sequence, n, criteria) {
        found.push(sequence.to_string());
    }

    let cut = n.saturating_sub(1) as f64 * criteria.overlap_threshold;
    let mut run_start = positions[0];
    let mut run_end = positions[0];
    let flush = |start: usize, end: usize, found: &mut Vec<String>| {
        let run = &sequence[start..end + n];
        if run.len() < sequence.len()
            && is_prodigal(run, n, criteria)
            && !found.iter().any(|f| f == run)
        {
            found.push(run.to_string());
        }
    };
    for (pair, overlap) in positions.windows(2).zip(occurrence_overlaps(&positions, n)) {
        if (overlap as f64) < cut {
            flush(run_start, run_end, &mut found);
            run_start = pair[1];
        }
        run_end = pair[1];
    }
    flush(run_start, run_end, &mut found);
    found
}

fn windows_present(sequence: &str, n: usize) -> HashSet<&str> {
    permutation_occurrences(sequence, n)
        .into_iter()
        .map(|i| &sequence[i..i + n])
        .collect()
}

/// Greedily grow `sequence` one symbol at a time at either end.
///
/// A step is taken only if the new end window is a permutation not already in
/// the sequence and the evidence admits it; among admissible steps the one with
/// the highest net weight plus layout count wins, appends before prepends,
/// then lower symbols.
pub fn extend_prodigal(sequence: &str, n: usize, evidence: &Evidence<'_>, max_steps: usize) -> String {
    let mut current = sequence.to_string();
    if n < 2 || current.len() + 1 < n {
        return current;
    }
    for _ in 0..max_steps {
        let present = windows_present(&current, n);
        let mut best: Option<(f64, String)> = None;
        for symbol in (1..=n).map(|d| (b'0' + d as u8) as char) {
            let appended = format!("{}{}", current, symbol);
            let prepended = format!("{}{}", symbol, current);
            for (candidate, window) in [
                (&appended, &appended[appended.len() - n..]),
                (&prepended, &prepended[..n]),
            ] {
                if !is_permutation(window, n) || present.contains(window) || !evidence.admits(window) {
                    continue;
                }
                let value = evidence.net_weight(window) as f64
                    + evidence
                        .layout
                        .get_layout_score(n, &window[..n - 1], &window[1..])
                        as f64;
                if best.as_ref().map_or(true, |(score, _)| value > *score) {
                    best = Some((value, candidate.clone()));
                }
            }
        }
        match best {
            Some((_, extended)) => current = extended,
            None => break,
        }
    }
    current
}

/// Measurements stored with a prodigal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProdigalAnalysis {
    pub is_prodigal: bool,
    pub overlap_rate: f64,
    pub breakpoints: Vec<Breakpoint>,
    pub winner_score: f64,
    pub loser_score: f64,
    pub extensibility_score: f64,
}

pub fn analyze_prodigal(
    sequence: &str,
    n: usize,
    evidence: &Evidence<'_>,
    criteria: &ProdigalCriteria,
) -> ProdigalAnalysis {
    let positions = permutation_occurrences(sequence, n);
    let perfect = occurrence_overlaps(&positions, n)
        .into_iter()
        .filter(|&o| o + 1 == n)
        .count();
    let (winner, loser) = evidence.weight_totals(sequence);
    ProdigalAnalysis {
        is_prodigal: is_prodigal(sequence, n, criteria),
        overlap_rate: overlap_rate(sequence, n),
        breakpoints: breakpoints(sequence, n),
        winner_score: winner as f64,
        loser_score: loser as f64,
        extensibility_score: if n == 0 { 0.0 } else { perfect as f64 / n as f64 },
    }
}

/// Ranking score; a pure function of the stored fields.
pub fn rank_score(prodigal: &Prodigal) -> f64 {
    prodigal.length as f64 + 100.0 * prodigal.overlap_rate + prodigal.winner_score
        - prodigal.loser_score
        - 10.0 * prodigal.breakpoints.len() as f64
        + 5.0 * prodigal.extensibility_score
}

/// Repository of accepted prodigals, owned by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProdigalStore {
    prodigals: BTreeMap<u64, Prodigal>,
    next_id: u64,
}

impl ProdigalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.prodigals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prodigals.is_empty()
    }

    /// Extend, analyse and, if still a prodigal and new, store `sequence`.
    ///
    /// Returns the id of the accepted entry, or `None` when it was discarded.
    pub fn add(
        &mut self,
        sequence: &str,
        n: usize,
        source: &str,
        evidence: &Evidence<'_>,
        criteria: &ProdigalCriteria,
    ) -> Result<Option<u64>> {
        validate_sequence(sequence, n)?;
        let extended = extend_prodigal(sequence, n, evidence, n);
        let analysis = analyze_prodigal(&extended, n, evidence, criteria);
        if !analysis.is_prodigal {
            debug!("sequence of length {} is not a prodigal after extension", extended.len());
            return Ok(None);
        }
        if self
            .prodigals
            .values()
            .any(|p| p.n_value == n && p.sequence == extended)
        {
            debug!("skipped duplicate prodigal of length {}", extended.len());
            return Ok(None);
        }

        let id = self.next_id;
        self.next_id += 1;
        info!(
            "added prodigal {} (n={}, length {}, source {})",
            id,
            n,
            extended.len(),
            source
        );
        self.prodigals.insert(
            id,
            Prodigal {
                id,
                length: extended.len(),
                sequence: extended,
                overlap_rate: analysis.overlap_rate,
                n_value: n,
                source: source.to_string(),
                breakpoints: analysis.breakpoints,
                winner_score: analysis.winner_score,
                loser_score: analysis.loser_score,
                extensibility_score: analysis.extensibility_score,
                parent_prodigals: Vec::new(),
                child_prodigals: Vec::new(),
                used_count: 0,
            },
        );
        Ok(Some(id))
    }

    /// Prodigals of order `n`, best first; equal scores keep the lower id first.
    pub fn get_best(&self, n: usize) -> Vec<&Prodigal> {
        let mut ranked: Vec<&Prodigal> = self.prodigals.values().filter(|p| p.n_value == n).collect();
        ranked.sort_by(|a, b| rank_score(b).total_cmp(&rank_score(a)).then(a.id.cmp(&b.id)));
        ranked
    }

    pub fn top(&self, n: usize, count: usize) -> Vec<&Prodigal> {
        let mut best = self.get_best(n);
        best.truncate(count);
        best
    }

    pub fn get(&self, id: u64) -> Option<&Prodigal> {
        self.prodigals.get(&id)
    }

    /// Replace the stored data for `id`; the id itself cannot change.
    pub fn update_prodigal(&mut self, id: u64, mut data: Prodigal) -> bool {
        match self.prodigals.get_mut(&id) {
            Some(slot) => {
                data.id = id;
                *slot = data;
                true
            }
            None => false,
        }
    }

    pub fn record_usage(&mut self, id: u64) {
        if let Some(prodigal) = self.prodigals.get_mut(&id) {
            prodigal.used_count += 1;
        }
    }

    /// Record that `child` was built from `parent`.
    pub fn link(&mut self, parent: u64, child: u64) -> Result<()> {
        if parent == child || !self.prodigals.contains_key(&parent) || !self.prodigals.contains_key(&child) {
            return Err(ConstructError::InvalidInput(format!(
                "cannot link prodigal {} to {}",
                parent, child
            )));
        }
        if let Some(p) = self.prodigals.get_mut(&parent) {
            if !p.child_prodigals.contains(&child) {
                p.child_prodigals.push(child);
            }
        }
        if let Some(c) = self.prodigals.get_mut(&child) {
            if !c.parent_prodigals.contains(&parent) {
                c.parent_prodigals.push(parent);
            }
        }
        Ok(())
    }

    /// Largest overlap between the end of `sequence` and the start of a stored prodigal.
    pub fn best_continuation(&self, sequence: &str, n: usize) -> Option<(&Prodigal, usize)> {
        self.get_best(n)
            .into_iter()
            .map(|p| (p, calculate_overlap(sequence, &p.sequence)))
            .filter(|&(_, overlap)| overlap > 0)
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.id.cmp(&a.0.id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prodigal> {
        self.prodigals.values()
    }

    pub fn snapshot(&self) -> Vec<Prodigal> {
        self.prodigals.values().cloned().collect()
    }

    pub fn restore(prodigals: impl IntoIterator<Item = Prodigal>) -> Self {
        let prodigals: BTreeMap<u64, Prodigal> = prodigals.into_iter().map(|p| (p.id, p)).collect();
        let next_id = prodigals.keys().next_back().map_or(0, |id| id + 1);
        Self { prodigals, next_id }
    }
}
