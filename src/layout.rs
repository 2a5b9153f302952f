//! Layout memory: observed k-mer to k-mer transitions in validated sequences.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::kmer_stats::KmerKey;
use crate::permutation::permutation_occurrences;

/// Observation count and provenance for one transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    pub count: u64,
    pub sources: BTreeSet<String>,
}

/// Serialisable form of one transition record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutRecord {
    pub from: KmerKey,
    pub to: KmerKey,
    pub entry: LayoutEntry,
}

/// Monotonically growing transition counts keyed by ordered pairs of k-mer keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutMemory {
    transitions: HashMap<(KmerKey, KmerKey), LayoutEntry>,
    successors: HashMap<KmerKey, BTreeSet<String>>,
}

impl LayoutMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Record one observation of `from` followed by `to`.
    pub fn record(&mut self, from: KmerKey, to: KmerKey, source: &str) {
        self.successors
            .entry(from.clone())
            .or_default()
            .insert(to.kmer.clone());
        let entry = self.transitions.entry((from, to)).or_default();
        entry.count += 1;
        entry.sources.insert(source.to_string());
    }

    /// Record the transitions of `sequence`: at every permutation occurrence the
    /// k-mer starting there is followed by the k-mer one symbol later.
    pub fn add_sequence(&mut self, sequence: &str, n: usize, k: usize, source: &str) -> usize {
        if k == 0 {
            return 0;
        }
        let mut recorded = 0;
        for start in permutation_occurrences(sequence, n) {
            if start + 1 + k > sequence.len() {
                continue;
            }
            self.record(
                KmerKey::new(n, &sequence[start..start + k]),
                KmerKey::new(n, &sequence[start + 1..start + 1 + k]),
                source,
            );
            recorded += 1;
        }
        recorded
    }

    /// Observation count of a transition, 0 when never seen.
    pub fn get_layout_score(&self, order: usize, from: &str, to: &str) -> u64 {
        self.transitions
            .get(&(KmerKey::new(order, from), KmerKey::new(order, to)))
            .map(|entry| entry.count)
            .unwrap_or(0)
    }

    pub fn entry(&self, from: &KmerKey, to: &KmerKey) -> Option<&LayoutEntry> {
        self.transitions.get(&(from.clone(), to.clone()))
    }

    /// Number of distinct k-mers observed after `kmer`.
    pub fn successor_count(&self, order: usize, kmer: &str) -> usize {
        self.successors
            .get(&KmerKey::new(order, kmer))
            .map(BTreeSet::len)
            .unwrap_or(0)
    }

    /// Fold another memory into this one; counts add and provenance unions.
    pub fn merge(&mut self, other: &LayoutMemory) {
        for ((from, to), entry) in &other.transitions {
            self.successors
                .entry(from.clone())
                .or_default()
                .insert(to.kmer.clone());
            let target = self
                .transitions
                .entry((from.clone(), to.clone()))
                .or_default();
            target.count += entry.count;
            target.sources.extend(entry.sources.iter().cloned());
        }
    }

    /// Forget everything; only used between independent runs of the same order.
    pub fn reset(&mut self) {
        self.transitions.clear();
        self.successors.clear();
    }

    pub fn records(&self) -> Vec<LayoutRecord> {
        let mut records: Vec<LayoutRecord> = self
            .transitions
            .iter()
            .map(|((from, to), entry)| LayoutRecord {
                from: from.clone(),
                to: to.clone(),
                entry: entry.clone(),
            })
            .collect();
        records.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        records
    }

    pub fn from_records(records: impl IntoIterator<Item = LayoutRecord>) -> Self {
        let mut memory = Self::new();
        for record in records {
            memory
                .successors
                .entry(record.from.clone())
                .or_default()
                .insert(record.to.kmer.clone());
            memory
                .transitions
                .insert((record.from, record.to), record.entry);
        }
        memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_transitions_at_each_occurrence() {
        let mut memory = LayoutMemory::new();
        let recorded = memory.add_sequence("123121321", 3, 2, "base");
        assert_eq!(recorded, 6);
        assert_eq!(memory.get_layout_score(3, "12", "23"), 1);
        assert_eq!(memory.get_layout_score(3, "21", "13"), 1);
        assert_eq!(memory.get_layout_score(3, "23", "12"), 0);

        memory.add_sequence("123121321", 3, 2, "repeat");
        assert_eq!(memory.get_layout_score(3, "12", "23"), 2);
        let entry = memory
            .entry(&KmerKey::new(3, "12"), &KmerKey::new(3, "23"))
            .expect("transition recorded");
        assert_eq!(entry.sources.len(), 2);
    }

    #[test]
    fn successor_counts_track_distinct_followers() {
        let mut memory = LayoutMemory::new();
        memory.record(KmerKey::new(4, "123"), KmerKey::new(4, "234"), "a");
        memory.record(KmerKey::new(4, "123"), KmerKey::new(4, "231"), "a");
        memory.record(KmerKey::new(4, "123"), KmerKey::new(4, "231"), "b");
        assert_eq!(memory.successor_count(4, "123"), 2);
        assert_eq!(memory.successor_count(4, "321"), 0);
    }

    #[test]
    fn merge_adds_counts_and_reset_clears() {
        let mut left = LayoutMemory::new();
        left.add_sequence("1231", 3, 2, "left");
        let mut right = LayoutMemory::new();
        right.add_sequence("1231", 3, 2, "right");
        left.merge(&right);
        assert_eq!(left.get_layout_score(3, "12", "23"), 2);

        let restored = LayoutMemory::from_records(left.records());
        assert_eq!(restored, left);

        left.reset();
        assert!(left.is_empty());
        assert_eq!(left.successor_count(3, "12"), 0);
    }
}
