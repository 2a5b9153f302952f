//! Weighted De Bruijn graph over k-mers and bounded best-path search.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::Serialize;
use sprs::TriMat;

use crate::error::{ConstructError, Result};
use crate::graph::{self, KmerGraph};
use crate::kmer_stats::WinnerLoserTable;
use crate::laminate::edge_kmer;
use crate::permutation::{partial_permutations, validate_order};

/// Node visits allowed per path search unless a caller sets its own budget.
pub const DEFAULT_EXPANSION_BUDGET: usize = 200_000;
/// Largest graph for which pairwise node connectivity is computed.
pub const CONNECTIVITY_NODE_LIMIT: usize = 48;
/// Largest graph for which the Laplacian spectrum is computed.
pub const SPECTRAL_NODE_LIMIT: usize = 200;

/// Winner and loser magnitudes of the k-mer an edge spells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EdgeWeights {
    pub winner_weight: f64,
    pub loser_weight: f64,
}

impl EdgeWeights {
    pub fn net(&self) -> f64 {
        self.winner_weight - self.loser_weight
    }
}

pub type DeBruijnGraph = KmerGraph<EdgeWeights>;

/// One edge per k-mer, from its (k−1)-prefix to its (k−1)-suffix.
pub fn build<S: AsRef<str>>(kmers: &[S], k: usize) -> Result<DeBruijnGraph> {
    if k < 2 {
        return Err(ConstructError::InvalidInput(format!(
            "De Bruijn k-mers need k >= 2, got {}",
            k
        )));
    }
    let mut graph = DeBruijnGraph::new();
    for kmer in kmers {
        let kmer = kmer.as_ref();
        if kmer.len() != k {
            return Err(ConstructError::InvalidInput(format!(
                "k-mer '{}' does not have length {}",
                kmer, k
            )));
        }
        let (prefix, suffix) = (&kmer[..k - 1], &kmer[1..]);
        if !graph.has_edge(prefix, suffix) {
            graph.add_edge(prefix, suffix, EdgeWeights::default());
        }
    }
    Ok(graph)
}

/// Graph over the k-windows of every permutation of order `n`.
pub fn complete_de_bruijn(n: usize, k: usize) -> Result<DeBruijnGraph> {
    validate_order(n)?;
    if k > n {
        return Err(ConstructError::InvalidInput(format!(
            "k={} exceeds order {}",
            k, n
        )));
    }
    build(&partial_permutations(n, k), k)
}

/// Overwrite every edge's weights from the table; repeated calls are idempotent.
pub fn attach_weights(graph: &mut DeBruijnGraph, table: &WinnerLoserTable, order: usize) {
    for (from, to, weights) in graph.edges_mut() {
        let kmer = edge_kmer(from, to);
        weights.winner_weight = table.winner(order, &kmer) as f64;
        weights.loser_weight = table.loser(order, &kmer) as f64;
    }
}

/// A walk through the graph with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPath {
    pub nodes: Vec<String>,
    pub score: f64,
}

impl ScoredPath {
    /// The sequence the walk spells: first node, then the last symbol of each later node.
    pub fn spell(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if i == 0 {
                out.push_str(node);
            } else if let Some(last) = node.chars().last() {
                out.push(last);
            }
        }
        out
    }
}

struct Ranked {
    score: f64,
    discovered: usize,
    nodes: Vec<String>,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    // Greater means better: higher score, then earlier discovery.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.discovered.cmp(&self.discovered))
    }
}

struct PathSearch<'g> {
    graph: &'g DeBruijnGraph,
    length_limit: usize,
    num_paths: usize,
    budget: usize,
    expansions: usize,
    discovered: usize,
    best: BinaryHeap<Reverse<Ranked>>,
}

impl<'g> PathSearch<'g> {
    fn offer(&mut self, path: &[&'g str], weight: f64) {
        self.discovered += 1;
        let score = path.len() as f64 + weight;
        let candidate = Ranked {
            score,
            discovered: self.discovered,
            nodes: Vec::new(),
        };
        if self.best.len() >= self.num_paths {
            match self.best.peek() {
                Some(Reverse(worst)) if candidate > *worst => {
                    self.best.pop();
                }
                _ => return,
            }
        }
        self.best.push(Reverse(Ranked {
            nodes: path.iter().map(|s| s.to_string()).collect(),
            ..candidate
        }));
    }

    fn visit(&mut self, path: &mut Vec<&'g str>, weight: f64) {
        if path.len() > self.length_limit || self.expansions >= self.budget {
            return;
        }
        self.expansions += 1;
        self.offer(path, weight);

        let Some(&last) = path.last() else {
            return;
        };
        let graph = self.graph;
        for next in graph.successors(last) {
            let step = graph.edge(last, next).map(EdgeWeights::net).unwrap_or(0.0);
            path.push(next);
            self.visit(path, weight + step);
            path.pop();
        }
    }
}

/// Top `num_paths` walks from `start` of at most `length_limit` nodes.
///
/// Score is the node count plus the net (winner − loser) weight of the edges
/// walked. Successors are explored in lexicographic order and equal scores keep
/// the walk discovered first, so results are deterministic.
pub fn find_high_weight_paths(
    graph: &DeBruijnGraph,
    start: &str,
    length_limit: usize,
    num_paths: usize,
) -> Vec<ScoredPath> {
    find_high_weight_paths_with_budget(graph, start, length_limit, num_paths, DEFAULT_EXPANSION_BUDGET)
}

/// As [`find_high_weight_paths`], stopping after `budget` node visits.
pub fn find_high_weight_paths_with_budget(
    graph: &DeBruijnGraph,
    start: &str,
    length_limit: usize,
    num_paths: usize,
    budget: usize,
) -> Vec<ScoredPath> {
    let Some(start) = graph.nodes().find(|&node| node == start) else {
        return Vec::new();
    };
    if num_paths == 0 || length_limit == 0 {
        return Vec::new();
    }
    let mut search = PathSearch {
        graph,
        length_limit,
        num_paths,
        budget,
        expansions: 0,
        discovered: 0,
        best: BinaryHeap::with_capacity(num_paths + 1),
    };
    let mut path = vec![start];
    search.visit(&mut path, 0.0);
    log::trace!(
        "path search from {} visited {} nodes, kept {}",
        start,
        search.expansions,
        search.best.len()
    );

    let mut ranked: Vec<Ranked> = search.best.into_iter().map(|Reverse(r)| r).collect();
    ranked.sort_by(|a, b| b.cmp(a));
    ranked
        .into_iter()
        .map(|r| ScoredPath {
            nodes: r.nodes,
            score: r.score,
        })
        .collect()
}

/// Structural summary of a k-mer graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeBruijnAnalysis {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub density: f64,
    pub avg_in_degree: f64,
    pub avg_out_degree: f64,
    pub min_in_degree: usize,
    pub max_in_degree: usize,
    pub min_out_degree: usize,
    pub max_out_degree: usize,
    pub imbalance: f64,
    pub is_strongly_connected: bool,
    pub strongly_connected_components: usize,
    pub has_cycles: bool,
    /// `None` when the graph is too large for pairwise flows.
    pub average_node_connectivity: Option<f64>,
    /// `None` for degenerate or disconnected graphs.
    pub algebraic_connectivity: Option<f64>,
}

pub fn analyze<E>(graph: &KmerGraph<E>) -> DeBruijnAnalysis {
    analyze_with_limits(graph, CONNECTIVITY_NODE_LIMIT, SPECTRAL_NODE_LIMIT)
}

pub fn analyze_with_limits<E>(
    graph: &KmerGraph<E>,
    connectivity_limit: usize,
    spectral_limit: usize,
) -> DeBruijnAnalysis {
    let indexed = graph.indexed();
    let nodes = indexed.names.len();
    let edges = graph.edge_count();

    let mut in_degree = vec![0usize; nodes];
    let mut out_degree = vec![0usize; nodes];
    if nodes > 0 {
        let mut adjacency = TriMat::new((nodes, nodes));
        for (u, targets) in indexed.adjacency.iter().enumerate() {
            for &v in targets {
                adjacency.add_triplet(u, v, 1usize);
            }
        }
        let csr = adjacency.to_csr::<usize>();
        let csc = adjacency.to_csc::<usize>();
        for (row_idx, row_vec) in csr.outer_iterator().enumerate() {
            out_degree[row_idx] = row_vec.data().iter().copied().sum();
        }
        for (col_idx, col_vec) in csc.outer_iterator().enumerate() {
            in_degree[col_idx] = col_vec.data().iter().copied().sum();
        }
    }

    let mean = |values: &[usize]| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<usize>() as f64 / values.len() as f64
        }
    };
    let imbalance = if edges == 0 {
        0.0
    } else {
        in_degree
            .iter()
            .zip(&out_degree)
            .map(|(&i, &o)| i.abs_diff(o))
            .sum::<usize>() as f64
            / (2 * edges) as f64
    };
    let components = graph::strongly_connected_components(graph).len();

    DeBruijnAnalysis {
        num_nodes: nodes,
        num_edges: edges,
        density: graph::density(graph),
        avg_in_degree: mean(&in_degree),
        avg_out_degree: mean(&out_degree),
        min_in_degree: in_degree.iter().copied().min().unwrap_or(0),
        max_in_degree: in_degree.iter().copied().max().unwrap_or(0),
        min_out_degree: out_degree.iter().copied().min().unwrap_or(0),
        max_out_degree: out_degree.iter().copied().max().unwrap_or(0),
        imbalance,
        is_strongly_connected: nodes > 0 && components == 1,
        strongly_connected_components: components,
        has_cycles: graph::has_cycle(graph),
        average_node_connectivity: (nodes <= connectivity_limit)
            .then(|| graph::average_node_connectivity(graph)),
        algebraic_connectivity: graph::algebraic_connectivity(graph, spectral_limit),
    }
}
