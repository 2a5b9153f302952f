//! Laminates: constraint graphs over (k−1)-symbol windows.
//!
//! Every edge is a k-mer running from its (k−1)-prefix to its (k−1)-suffix.
//! A positive laminate records transitions that were observed in good sequences.
//! An anti-laminate records the transitions removed from the complete De Bruijn
//! graph of order n; it is kept acyclic, so an anti-k-mer whose edge would close a
//! cycle is not recorded.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ConstructError, Result};
use crate::graph::{self, KmerGraph};
use crate::kmer_stats::WinnerLoserTable;
use crate::layout::LayoutMemory;
use crate::permutation::{
    is_partial_permutation, kmers, partial_permutations, permutation_occurrences, validate_order,
    validate_sequence,
};

/// Penalty applied per anti-prodigal edge found in a positive laminate.
pub const ANTI_PRODIGAL_EDGE_PENALTY: f64 = 100.0;
/// Numerator of the rarity penalty `RARITY_PENALTY / (layout_count + 1)`.
pub const RARITY_PENALTY: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaminateKind {
    Positive,
    Negative,
}

/// How several laminates of the same key combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    #[default]
    Intersection,
    Union,
    WeightedAverage,
}

impl FromStr for MergeMethod {
    type Err = ConstructError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "intersection" => Ok(MergeMethod::Intersection),
            "union" => Ok(MergeMethod::Union),
            "weighted_average" => Ok(MergeMethod::WeightedAverage),
            other => Err(ConstructError::InvalidInput(format!(
                "unknown merge method '{}'",
                other
            ))),
        }
    }
}

/// A constraint graph tagged with its order, window length and polarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Laminate {
    order: usize,
    k: usize,
    kind: LaminateKind,
    graph: KmerGraph,
}

impl Laminate {
    pub fn new(order: usize, k: usize, kind: LaminateKind) -> Self {
        Self {
            order,
            k,
            kind,
            graph: KmerGraph::new(),
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn kind(&self) -> LaminateKind {
        self.kind
    }

    pub fn graph(&self) -> &KmerGraph {
        &self.graph
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }

    fn split(kmer: &str) -> (&str, &str) {
        (&kmer[..kmer.len() - 1], &kmer[1..])
    }

    /// Whether the transition spelled by `kmer` is an edge.
    pub fn has_transition(&self, kmer: &str) -> bool {
        if kmer.len() != self.k || self.k < 2 {
            return false;
        }
        let (prefix, suffix) = Self::split(kmer);
        self.graph.has_edge(prefix, suffix)
    }

    /// Add the edge for `kmer`; anti-laminates refuse edges that would close a cycle.
    pub fn add_transition(&mut self, kmer: &str) -> bool {
        if kmer.len() != self.k || self.k < 2 {
            return false;
        }
        let (prefix, suffix) = Self::split(kmer);
        if self.graph.has_edge(prefix, suffix) {
            return false;
        }
        if self.kind == LaminateKind::Negative && graph::would_close_cycle(&self.graph, prefix, suffix)
        {
            debug!("anti-laminate n={} k={} skips cyclic edge {}", self.order, self.k, kmer);
            return false;
        }
        self.graph.add_edge(prefix, suffix, ());
        true
    }

    /// Reconstructed k-mer of every edge.
    pub fn transitions(&self) -> Vec<String> {
        self.graph
            .edges()
            .map(|(from, to, _)| edge_kmer(from, to))
            .collect()
    }

    pub fn to_record(&self, id: u64, source: &str, score: f64) -> LaminateRecord {
        LaminateRecord {
            id,
            order: self.order,
            k: self.k,
            kind: self.kind,
            source: source.to_string(),
            score,
            edges: self.graph.edge_set().into_iter().collect(),
        }
    }

    pub fn from_record(record: &LaminateRecord) -> Result<Self> {
        check_window(record.order, record.k)?;
        let edges: BTreeSet<(String, String)> = record.edges.iter().cloned().collect();
        Ok(Self::from_edges(record.order, record.k, record.kind, &edges))
    }

    fn from_edges(order: usize, k: usize, kind: LaminateKind, edges: &BTreeSet<(String, String)>) -> Self {
        let mut laminate = Self::new(order, k, kind);
        for (from, to) in edges {
            laminate.graph.add_edge(from, to, ());
        }
        laminate
    }
}

/// Full k-mer spelled by an edge between two overlapping windows.
pub fn edge_kmer(from: &str, to: &str) -> String {
    let mut kmer = String::with_capacity(from.len() + 1);
    kmer.push_str(from);
    kmer.push_str(&to[to.len().saturating_sub(1)..]);
    kmer
}

fn check_window(n: usize, k: usize) -> Result<()> {
    validate_order(n)?;
    if k < 2 || k > n {
        return Err(ConstructError::InvalidInput(format!(
            "laminate window {} must lie in 2..={} for order {}",
            k, n, n
        )));
    }
    Ok(())
}

/// Positive laminate of every transition inside, and entering, each permutation
/// occurrence of `sequence`.
pub fn create_laminate(sequence: &str, n: usize, k: usize) -> Result<Laminate> {
    check_window(n, k)?;
    validate_sequence(sequence, n)?;
    let mut laminate = Laminate::new(n, k, LaminateKind::Positive);
    extend_from_sequence(&mut laminate, sequence);
    Ok(laminate)
}

fn extend_from_sequence(laminate: &mut Laminate, sequence: &str) -> usize {
    let (n, k) = (laminate.order, laminate.k);
    let mut added = 0;
    for start in permutation_occurrences(sequence, n) {
        for kmer in kmers(&sequence[start..start + n], k) {
            added += usize::from(laminate.add_transition(kmer));
        }
        if start >= k {
            added += usize::from(laminate.add_transition(&sequence[start + 1 - k..start + 1]));
        }
    }
    added
}

/// Every k-mer of `perm` is an edge of `laminate`. Windows shorter than 2 impose nothing.
pub fn is_compatible(perm: &str, laminate: &Laminate) -> bool {
    if laminate.k < 2 {
        return true;
    }
    kmers(perm, laminate.k).all(|kmer| laminate.has_transition(kmer))
}

/// Some k-mer of `perm` is a forbidden transition of `anti`.
pub fn is_forbidden(perm: &str, anti: &Laminate) -> bool {
    anti.k >= 2 && kmers(perm, anti.k).any(|kmer| anti.has_transition(kmer))
}

/// De Bruijn graph over the k-windows of every permutation of order `n`.
pub fn complete_transition_graph(n: usize, k: usize) -> Result<KmerGraph> {
    check_window(n, k)?;
    let mut graph = KmerGraph::new();
    for kmer in partial_permutations(n, k) {
        graph.add_edge(&kmer[..k - 1], &kmer[1..], ());
    }
    Ok(graph)
}

/// Anti-laminate holding the transitions removed from the complete graph.
pub fn create_anti_laminate<S: AsRef<str>>(anti_kmers: &[S], n: usize, k: usize) -> Result<Laminate> {
    check_window(n, k)?;
    let mut anti = Laminate::new(n, k, LaminateKind::Negative);
    forbid_kmers(&mut anti, anti_kmers);
    Ok(anti)
}

fn forbid_kmers<S: AsRef<str>>(anti: &mut Laminate, anti_kmers: &[S]) -> usize {
    let sorted: BTreeSet<&str> = anti_kmers.iter().map(|s| s.as_ref()).collect();
    let mut added = 0;
    for kmer in sorted {
        // Only edges of the complete graph can be removed from it.
        if kmer.len() != anti.k || !is_partial_permutation(kmer, anti.order) {
            continue;
        }
        added += usize::from(anti.add_transition(kmer));
    }
    added
}

/// Transitions still allowed by an anti-laminate: the complete graph minus its edges.
pub fn permitted_graph(anti: &Laminate) -> Result<KmerGraph> {
    let mut complete = complete_transition_graph(anti.order, anti.k)?;
    for (from, to, _) in anti.graph.edges() {
        complete.remove_edge(from, to);
    }
    Ok(complete)
}

/// Grow a laminate: positive laminates take `items` as sequences, anti-laminates as
/// anti-prodigal k-mers. Returns the number of new edges.
pub fn update_laminate<S: AsRef<str>>(laminate: &mut Laminate, items: &[S]) -> Result<usize> {
    match laminate.kind {
        LaminateKind::Positive => {
            let mut added = 0;
            for item in items {
                validate_sequence(item.as_ref(), laminate.order)?;
                added += extend_from_sequence(laminate, item.as_ref());
            }
            Ok(added)
        }
        LaminateKind::Negative => Ok(forbid_kmers(laminate, items)),
    }
}

/// Evidence a laminate is scored against.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub table: &'a WinnerLoserTable,
    pub layout: &'a LayoutMemory,
    pub anti_prodigals: &'a BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaminateValidation {
    pub ok: bool,
    pub reason: Option<String>,
    pub score: f64,
}

impl LaminateValidation {
    fn rejected(reason: String) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            score: 0.0,
        }
    }
}

/// Structural checks followed by a contextual score.
pub fn validate(laminate: &Laminate, context: &ValidationContext<'_>) -> LaminateValidation {
    let (n, k) = (laminate.order, laminate.k);
    if k < 2 {
        return LaminateValidation::rejected(format!("window length {} is below 2", k));
    }
    let upper = b'0' + n.min(9) as u8;
    for node in laminate.graph.nodes() {
        if node.len() + 1 != k {
            return LaminateValidation::rejected(format!(
                "invalid node length: {} (should be {})",
                node,
                k.saturating_sub(1)
            ));
        }
        if node.bytes().any(|b| !(b'1'..=upper).contains(&b)) {
            return LaminateValidation::rejected(format!("invalid digit in node: {}", node));
        }
    }
    for (from, to, _) in laminate.graph.edges() {
        if from[1..] != to[..to.len() - 1] {
            return LaminateValidation::rejected(format!(
                "invalid edge: ({}, {}) breaks De Bruijn adjacency",
                from, to
            ));
        }
    }
    if laminate.kind == LaminateKind::Negative {
        if graph::is_strongly_connected(&laminate.graph) {
            return LaminateValidation::rejected("anti-laminate is strongly connected".into());
        }
        if graph::has_cycle(&laminate.graph) {
            return LaminateValidation::rejected("anti-laminate contains a cycle".into());
        }
    }

    let edges = laminate.graph.edge_count();
    let mut score = 0.0;
    if edges > 0 {
        for (from, to, _) in laminate.graph.edges() {
            let kmer = edge_kmer(from, to);
            let winner = context.table.winner(n, &kmer) as f64;
            let loser = context.table.loser(n, &kmer) as f64;
            match laminate.kind {
                LaminateKind::Positive => {
                    let seen = context.layout.get_layout_score(n, from, to) as f64;
                    score += winner - loser - RARITY_PENALTY / (seen + 1.0);
                }
                LaminateKind::Negative => score -= winner + loser,
            }
        }
        score /= edges as f64;
    }
    if laminate.kind == LaminateKind::Positive {
        let present = context
            .anti_prodigals
            .iter()
            .filter(|kmer| laminate.has_transition(kmer))
            .count();
        score -= ANTI_PRODIGAL_EDGE_PENALTY * present as f64;
    }

    LaminateValidation {
        ok: true,
        reason: None,
        score,
    }
}

/// Combine laminates sharing one `(order, k)` key.
pub fn merge(laminates: &[&Laminate], method: MergeMethod) -> Result<Laminate> {
    let Some(first) = laminates.first() else {
        return Err(ConstructError::InvalidInput("no laminates to merge".into()));
    };
    if laminates
        .iter()
        .any(|l| l.order != first.order || l.k != first.k)
    {
        return Err(ConstructError::InvalidInput(
            "merged laminates must share order and window length".into(),
        ));
    }
    let edges = match method {
        MergeMethod::Intersection => {
            let mut edges = first.graph.edge_set();
            for other in &laminates[1..] {
                edges.retain(|(from, to)| other.graph.has_edge(from, to));
            }
            edges
        }
        MergeMethod::Union => laminates
            .iter()
            .flat_map(|l| l.graph.edge_set())
            .collect(),
        MergeMethod::WeightedAverage => {
            return Err(ConstructError::Unsupported(
                "weighted_average laminate merge".into(),
            ))
        }
    };
    Ok(Laminate::from_edges(first.order, first.k, first.kind, &edges))
}

pub fn density(laminate: &Laminate) -> f64 {
    graph::density(&laminate.graph)
}

pub fn connectivity(laminate: &Laminate) -> f64 {
    graph::average_node_connectivity(&laminate.graph)
}

/// One stored laminate with its provenance and last score.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumEntry {
    pub id: u64,
    pub laminate: Laminate,
    pub source: String,
    pub score: f64,
}

/// Serialisable form of an album entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaminateRecord {
    pub id: u64,
    pub order: usize,
    pub k: usize,
    pub kind: LaminateKind,
    pub source: String,
    pub score: f64,
    pub edges: Vec<(String, String)>,
}

/// Repository of validated laminates keyed by `(order, k)`.
#[derive(Debug, Clone, Default)]
pub struct LaminateAlbum {
    entries: BTreeMap<u64, AlbumEntry>,
    next_id: u64,
}

impl LaminateAlbum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate and store; rejected laminates report the structural reason.
    pub fn add(
        &mut self,
        laminate: Laminate,
        source: &str,
        context: &ValidationContext<'_>,
    ) -> Result<u64> {
        let validation = validate(&laminate, context);
        if !validation.ok {
            return Err(ConstructError::InvalidInput(
                validation.reason.unwrap_or_else(|| "invalid laminate".into()),
            ));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            AlbumEntry {
                id,
                laminate,
                source: source.to_string(),
                score: validation.score,
            },
        );
        Ok(id)
    }

    /// Top `count` laminates for a key, by score then lower id.
    pub fn select(&self, order: usize, k: usize, count: usize) -> Vec<&Laminate> {
        let mut matching: Vec<&AlbumEntry> = self
            .entries
            .values()
            .filter(|e| e.laminate.order == order && e.laminate.k == k)
            .collect();
        matching.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        matching
            .into_iter()
            .take(count)
            .map(|e| &e.laminate)
            .collect()
    }

    /// Merge of the selected laminates, `None` when the key has no entries.
    pub fn merged(
        &self,
        order: usize,
        k: usize,
        count: usize,
        method: MergeMethod,
    ) -> Result<Option<Laminate>> {
        let selected = self.select(order, k, count);
        if selected.is_empty() {
            return Ok(None);
        }
        merge(&selected, method).map(Some)
    }

    pub fn get(&self, id: u64) -> Option<&AlbumEntry> {
        self.entries.get(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<AlbumEntry> {
        self.entries.remove(&id)
    }

    pub fn list(&self) -> impl Iterator<Item = &AlbumEntry> {
        self.entries.values()
    }

    /// Recompute the scores of one order's laminates against fresh evidence.
    pub fn rescore(&mut self, order: usize, context: &ValidationContext<'_>) {
        for entry in self.entries.values_mut().filter(|e| e.laminate.order == order) {
            entry.score = validate(&entry.laminate, context).score;
        }
    }

    pub fn records(&self) -> Vec<LaminateRecord> {
        self.entries
            .values()
            .map(|e| e.laminate.to_record(e.id, &e.source, e.score))
            .collect()
    }

    pub fn from_records(records: impl IntoIterator<Item = LaminateRecord>) -> Result<Self> {
        let mut album = Self::new();
        for record in records {
            let laminate = Laminate::from_record(&record)?;
            album.next_id = album.next_id.max(record.id + 1);
            album.entries.insert(
                record.id,
                AlbumEntry {
                    id: record.id,
                    laminate,
                    source: record.source,
                    score: record.score,
                },
            );
        }
        Ok(album)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_context<'a>(
        table: &'a WinnerLoserTable,
        layout: &'a LayoutMemory,
        anti: &'a BTreeSet<String>,
    ) -> ValidationContext<'a> {
        ValidationContext {
            table,
            layout,
            anti_prodigals: anti,
        }
    }

    #[test]
    fn laminate_accepts_every_window_of_its_source() {
        let sp = "123121321";
        for k in 2..=3 {
            let laminate = create_laminate(sp, 3, k).expect("valid laminate");
            for start in permutation_occurrences(sp, 3) {
                assert!(is_compatible(&sp[start..start + 3], &laminate));
            }
        }
        let laminate = create_laminate("1231", 3, 2).expect("valid laminate");
        assert!(!is_compatible("321", &laminate));
    }

    #[test]
    fn anti_laminate_stays_acyclic() {
        let anti = create_anti_laminate(&["12", "21", "23", "31"], 3, 2).expect("valid");
        // 1->2 and 2->3 are kept, 3->1 would close the cycle and 2->1 a 2-cycle.
        assert!(anti.has_transition("12"));
        assert!(anti.has_transition("23"));
        assert!(!anti.has_transition("31"));
        assert!(!anti.has_transition("21"));
        assert!(!graph::has_cycle(anti.graph()));
        assert!(!graph::is_strongly_connected(anti.graph()));
        assert!(is_forbidden("123", &anti));
        assert!(!is_forbidden("132", &anti));
    }

    #[test]
    fn anti_laminate_ignores_kmers_outside_the_complete_graph() {
        let anti = create_anti_laminate(&["11", "123", "45"], 3, 2).expect("valid");
        assert!(anti.is_empty());
        let permitted = permitted_graph(&anti).expect("valid");
        assert_eq!(permitted.edge_count(), 6);
    }

    #[test]
    fn permitted_graph_removes_forbidden_edges() {
        let anti = create_anti_laminate(&["123"], 4, 3).expect("valid");
        let permitted = permitted_graph(&anti).expect("valid");
        let complete = complete_transition_graph(4, 3).expect("valid");
        assert_eq!(permitted.edge_count() + 1, complete.edge_count());
        assert!(!permitted.has_edge("12", "23"));
    }

    #[test]
    fn merge_identities() {
        let laminate = create_laminate("123121321", 3, 2).expect("valid");
        let same = merge(&[&laminate, &laminate], MergeMethod::Intersection).expect("merge");
        assert_eq!(same.graph().edge_set(), laminate.graph().edge_set());

        let empty = Laminate::new(3, 2, LaminateKind::Positive);
        let union = merge(&[&laminate, &empty], MergeMethod::Union).expect("merge");
        assert_eq!(union, laminate);

        let partial = create_laminate("1231", 3, 2).expect("valid");
        let both = merge(&[&laminate, &partial], MergeMethod::Intersection).expect("merge");
        assert_eq!(both.graph().edge_set(), partial.graph().edge_set());
    }

    #[test]
    fn weighted_average_merge_is_reported_unsupported() {
        let laminate = create_laminate("1231", 3, 2).expect("valid");
        assert!(matches!(
            merge(&[&laminate], MergeMethod::WeightedAverage),
            Err(ConstructError::Unsupported(_))
        ));
        assert!(matches!(
            "weighted_average".parse::<MergeMethod>(),
            Ok(MergeMethod::WeightedAverage)
        ));
        assert!("average".parse::<MergeMethod>().is_err());
    }

    #[test]
    fn validation_scores_positive_laminates() {
        let laminate = create_laminate("1231", 3, 2).expect("valid");
        let mut table = WinnerLoserTable::new();
        table.add(crate::kmer_stats::KmerKey::new(3, "12"), 4);
        let layout = LayoutMemory::new();
        let anti = BTreeSet::new();
        let result = validate(&laminate, &empty_context(&table, &layout, &anti));
        assert!(result.ok);
        // Edges 12, 23, 31: (4 - 10 - 10 - 10) / 3.
        assert!((result.score - (-26.0 / 3.0)).abs() < 1e-9);

        let anti: BTreeSet<String> = ["23".to_string()].into_iter().collect();
        let penalised = validate(&laminate, &empty_context(&table, &layout, &anti));
        assert!((penalised.score - (-26.0 / 3.0 - ANTI_PRODIGAL_EDGE_PENALTY)).abs() < 1e-9);
    }

    #[test]
    fn validation_rejects_cyclic_anti_laminates() {
        let mut cyclic = Laminate::new(3, 2, LaminateKind::Negative);
        cyclic.graph.add_edge("1", "2", ());
        cyclic.graph.add_edge("2", "1", ());
        let table = WinnerLoserTable::new();
        let layout = LayoutMemory::new();
        let anti = BTreeSet::new();
        let result = validate(&cyclic, &empty_context(&table, &layout, &anti));
        assert!(!result.ok);
        assert!(result.reason.is_some());

        let mut bad_node = Laminate::new(3, 3, LaminateKind::Positive);
        bad_node.graph.add_edge("1", "2", ());
        assert!(!validate(&bad_node, &empty_context(&table, &layout, &anti)).ok);
    }

    #[test]
    fn update_grows_positive_and_negative_laminates() {
        let mut laminate = create_laminate("1231", 3, 2).expect("valid");
        let added = update_laminate(&mut laminate, &["3213"]).expect("valid");
        assert!(added > 0);
        assert!(is_compatible("321", &laminate));

        let mut anti = create_anti_laminate(&["12"], 3, 2).expect("valid");
        assert_eq!(update_laminate(&mut anti, &["21", "13"]).expect("valid"), 1);
        assert!(anti.has_transition("13"));
    }

    #[test]
    fn album_selects_by_score_and_round_trips() {
        let table = WinnerLoserTable::new();
        let mut layout = LayoutMemory::new();
        layout.add_sequence("123121321", 3, 1, "seed");
        let anti = BTreeSet::new();
        let context = empty_context(&table, &layout, &anti);

        let mut album = LaminateAlbum::new();
        let first = album
            .add(create_laminate("1231", 3, 2).expect("valid"), "a", &context)
            .expect("accepted");
        let second = album
            .add(create_laminate("123121321", 3, 2).expect("valid"), "b", &context)
            .expect("accepted");
        assert_ne!(first, second);
        assert_eq!(album.select(3, 2, 5).len(), 2);
        assert_eq!(album.select(3, 3, 5).len(), 0);
        assert!(album
            .merged(3, 2, 2, MergeMethod::Intersection)
            .expect("merge")
            .is_some());

        let restored = LaminateAlbum::from_records(album.records()).expect("valid records");
        assert_eq!(restored.len(), 2);
        assert!(album.remove(first).is_some());
        assert_eq!(album.list().count(), 1);
    }

    #[test]
    fn rescore_tracks_new_weights_for_one_order() {
        let mut table = WinnerLoserTable::new();
        let layout = LayoutMemory::new();
        let anti = BTreeSet::new();

        let mut album = LaminateAlbum::new();
        let (three, four) = {
            let context = empty_context(&table, &layout, &anti);
            let three = album
                .add(create_laminate("1231", 3, 2).expect("valid"), "a", &context)
                .expect("accepted");
            let four = album
                .add(create_laminate("1234", 4, 3).expect("valid"), "b", &context)
                .expect("accepted");
            (three, four)
        };
        let before_three = album.get(three).expect("stored").score;
        let before_four = album.get(four).expect("stored").score;

        table.add(crate::kmer_stats::KmerKey::new(3, "12"), 9);
        table.add(crate::kmer_stats::KmerKey::new(4, "123"), 9);
        album.rescore(3, &empty_context(&table, &layout, &anti));

        assert!(album.get(three).expect("stored").score > before_three);
        assert_eq!(album.get(four).expect("stored").score, before_four);
    }

    #[test]
    fn records_with_short_windows_are_rejected() {
        let record = LaminateRecord {
            id: 0,
            order: 3,
            k: 1,
            kind: LaminateKind::Positive,
            source: "saved".into(),
            score: 0.0,
            edges: vec![(String::new(), String::new())],
        };
        assert!(matches!(
            Laminate::from_record(&record),
            Err(ConstructError::InvalidInput(_))
        ));
        assert!(LaminateAlbum::from_records(vec![record]).is_err());

        let short = Laminate::new(3, 1, LaminateKind::Positive);
        let table = WinnerLoserTable::new();
        let layout = LayoutMemory::new();
        let anti = BTreeSet::new();
        assert!(!validate(&short, &empty_context(&table, &layout, &anti)).ok);
    }
}
