//! Winner/loser k-mer statistics and anti-prodigal detection.
//!
//! Weights are signed net counts per `(order, kmer)` key. Positive values mark
//! winners (over-represented in shorter sequences), negative values mark losers.
//! Consumers read the two sides through [`WinnerLoserTable::winner`] and
//! [`WinnerLoserTable::loser`], both non-negative magnitudes.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{ConstructError, Result};
use crate::permutation::{
    kmers, occurrence_overlaps, permutation_occurrences, validate_order, validate_sequence,
};

/// Composite statistics key: permutation order plus the k-mer string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KmerKey {
    pub order: usize,
    pub kmer: String,
}

impl KmerKey {
    pub fn new(order: usize, kmer: impl Into<String>) -> Self {
        Self {
            order,
            kmer: kmer.into(),
        }
    }
}

/// Flat, serialisable form of one table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub order: usize,
    pub kmer: String,
    pub weight: i64,
}

/// Additive table of signed k-mer weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WinnerLoserTable {
    weights: HashMap<KmerKey, i64>,
}

impl WinnerLoserTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Net weight of a k-mer, 0 when absent.
    pub fn weight(&self, order: usize, kmer: &str) -> i64 {
        self.weights
            .get(&KmerKey::new(order, kmer))
            .copied()
            .unwrap_or(0)
    }

    pub fn contains(&self, order: usize, kmer: &str) -> bool {
        self.weights.contains_key(&KmerKey::new(order, kmer))
    }

    pub fn winner(&self, order: usize, kmer: &str) -> i64 {
        self.weight(order, kmer).max(0)
    }

    pub fn loser(&self, order: usize, kmer: &str) -> i64 {
        (-self.weight(order, kmer)).max(0)
    }

    /// Accumulate `delta` into one key.
    pub fn add(&mut self, key: KmerKey, delta: i64) {
        *self.weights.entry(key).or_insert(0) += delta;
    }

    /// Pointwise addition of another table.
    pub fn update(&mut self, delta: &WinnerLoserTable) {
        for (key, &weight) in &delta.weights {
            self.add(key.clone(), weight);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KmerKey, i64)> {
        self.weights.iter().map(|(key, &weight)| (key, weight))
    }

    /// Sum of net weights over every length-`k` window of `sequence`.
    pub fn net_score(&self, order: usize, sequence: &str, k: usize) -> i64 {
        kmers(sequence, k).map(|kmer| self.weight(order, kmer)).sum()
    }

    /// Entries sorted by key, for snapshots.
    pub fn entries(&self) -> Vec<WeightEntry> {
        let mut entries: Vec<WeightEntry> = self
            .weights
            .iter()
            .map(|(key, &weight)| WeightEntry {
                order: key.order,
                kmer: key.kmer.clone(),
                weight,
            })
            .collect();
        entries.sort_by(|a, b| (a.order, &a.kmer).cmp(&(b.order, &b.kmer)));
        entries
    }

    pub fn from_entries(entries: impl IntoIterator<Item = WeightEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.add(KmerKey::new(entry.order, entry.kmer), entry.weight);
        }
        table
    }
}

/// Count the k-mers that end immediately before each permutation occurrence.
pub fn preceding_kmer_counts(sequence: &str, n: usize, k: usize) -> HashMap<String, i64> {
    let mut counts = HashMap::new();
    for start in permutation_occurrences(sequence, n) {
        if start == 0 || start < k {
            continue;
        }
        *counts
            .entry(sequence[start - k..start].to_string())
            .or_insert(0) += 1;
    }
    counts
}

fn check_kmer_length(n: usize, k: usize) -> Result<()> {
    validate_order(n)?;
    if k == 0 || k >= n {
        return Err(ConstructError::InvalidInput(format!(
            "k-mer length {} must lie in 1..{} for order {}",
            k, n, n
        )));
    }
    Ok(())
}

fn merge_counts(mut acc: HashMap<String, i64>, other: HashMap<String, i64>) -> HashMap<String, i64> {
    for (kmer, count) in other {
        *acc.entry(kmer).or_insert(0) += count;
    }
    acc
}

fn group_counts<S: AsRef<str> + Sync>(group: &[&S], n: usize, k: usize) -> HashMap<String, i64> {
    #[cfg(feature = "parallel")]
    {
        group
            .par_iter()
            .map(|seq| preceding_kmer_counts(seq.as_ref(), n, k))
            .reduce(HashMap::new, merge_counts)
    }
    #[cfg(not(feature = "parallel"))]
    {
        group
            .iter()
            .map(|seq| preceding_kmer_counts(seq.as_ref(), n, k))
            .fold(HashMap::new(), merge_counts)
    }
}

/// Weight k-mers by how much more often they precede permutations in the shorter
/// half of the corpus than in the longer half.
pub fn compute_winners_losers<S: AsRef<str> + Sync>(
    corpus: &[S],
    n: usize,
    k: usize,
) -> Result<WinnerLoserTable> {
    check_kmer_length(n, k)?;
    for seq in corpus {
        validate_sequence(seq.as_ref(), n)?;
    }
    let mut table = WinnerLoserTable::new();
    if corpus.is_empty() {
        return Ok(table);
    }

    let mut lengths: Vec<usize> = corpus.iter().map(|s| s.as_ref().len()).collect();
    lengths.sort_unstable();
    let median = lengths[lengths.len() / 2];
    let single_length = lengths.first() == lengths.last();

    let (shorter, longer): (Vec<&S>, Vec<&S>) = if single_length {
        // Identical partitions: every count cancels.
        (corpus.iter().collect(), corpus.iter().collect())
    } else if lengths.iter().any(|&len| len > median) {
        corpus.iter().partition(|s| s.as_ref().len() <= median)
    } else {
        corpus.iter().partition(|s| s.as_ref().len() < median)
    };

    let shorter_counts = group_counts(&shorter, n, k);
    let longer_counts = group_counts(&longer, n, k);

    for (kmer, count) in &shorter_counts {
        table.add(KmerKey::new(n, kmer.clone()), *count);
    }
    for (kmer, count) in &longer_counts {
        table.add(KmerKey::new(n, kmer.clone()), -*count);
    }
    log::debug!(
        "winners/losers for n={} k={}: {} shorter, {} longer, {} keys",
        n,
        k,
        shorter.len(),
        longer.len(),
        table.len()
    );
    Ok(table)
}

/// Average positional overlap between consecutive permutation occurrences, if defined.
pub fn average_occurrence_overlap(sequence: &str, n: usize) -> Option<f64> {
    let positions = permutation_occurrences(sequence, n);
    if positions.len() < 2 {
        return None;
    }
    let overlaps = occurrence_overlaps(&positions, n);
    Some(overlaps.iter().sum::<usize>() as f64 / overlaps.len() as f64)
}

/// Collect the k-mers of sequences whose overlap deficit plus net loser weight
/// exceeds `anti_threshold`.
pub fn identify_anti_prodigals<S: AsRef<str>>(
    sequences: &[S],
    n: usize,
    k: usize,
    overlap_threshold: f64,
    table: &WinnerLoserTable,
    anti_threshold: f64,
) -> Result<BTreeSet<String>> {
    check_kmer_length(n, k)?;
    let mut anti = BTreeSet::new();
    let target_overlap = (n - 1) as f64 * overlap_threshold;

    for seq in sequences {
        let seq = seq.as_ref();
        validate_sequence(seq, n)?;
        if permutation_occurrences(seq, n).is_empty() {
            continue;
        }

        let mut score = 0.0;
        if let Some(average) = average_occurrence_overlap(seq, n) {
            if average < target_overlap {
                score += target_overlap - average;
            }
        }
        score += kmers(seq, k)
            .map(|kmer| (table.loser(n, kmer) - table.winner(n, kmer)) as f64)
            .sum::<f64>();

        if score > anti_threshold {
            anti.extend(kmers(seq, k).map(str::to_string));
        }
    }
    Ok(anti)
}
