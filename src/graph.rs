//! Adjacency-map digraph over k-mer strings and the graph algorithms run on it.
//!
//! Laminates and De Bruijn graphs both sit on [`KmerGraph`]; they differ only in
//! the edge payload. Node and edge iteration is ordered, so every algorithm here
//! is deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use ndarray::Array2;

/// Directed graph keyed by node label with per-edge payload `E`.
#[derive(Debug, Clone, PartialEq)]
pub struct KmerGraph<E = ()> {
    successors: BTreeMap<String, BTreeMap<String, E>>,
}

impl<E> Default for KmerGraph<E> {
    fn default() -> Self {
        Self {
            successors: BTreeMap::new(),
        }
    }
}

/// Index-based view used by the algorithms.
pub(crate) struct IndexedGraph<'a> {
    pub names: Vec<&'a str>,
    pub adjacency: Vec<Vec<usize>>,
}

impl<E> KmerGraph<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: &str) {
        if !self.successors.contains_key(node) {
            self.successors.insert(node.to_string(), BTreeMap::new());
        }
    }

    /// Insert or overwrite the edge `from -> to`, creating both nodes.
    pub fn add_edge(&mut self, from: &str, to: &str, data: E) {
        self.add_node(to);
        self.add_node(from);
        if let Some(targets) = self.successors.get_mut(from) {
            targets.insert(to.to_string(), data);
        }
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) -> Option<E> {
        self.successors.get_mut(from)?.remove(to)
    }

    pub fn has_node(&self, node: &str) -> bool {
        self.successors.contains_key(node)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.successors
            .get(from)
            .map(|targets| targets.contains_key(to))
            .unwrap_or(false)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&E> {
        self.successors.get(from)?.get(to)
    }

    pub fn edge_mut(&mut self, from: &str, to: &str) -> Option<&mut E> {
        self.successors.get_mut(from)?.get_mut(to)
    }

    pub fn node_count(&self) -> usize {
        self.successors.len()
    }

    pub fn edge_count(&self) -> usize {
        self.successors.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.successors.keys().map(String::as_str)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &E)> {
        self.successors.iter().flat_map(|(from, targets)| {
            targets
                .iter()
                .map(move |(to, data)| (from.as_str(), to.as_str(), data))
        })
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = (&str, &str, &mut E)> {
        self.successors.iter_mut().flat_map(|(from, targets)| {
            targets
                .iter_mut()
                .map(move |(to, data)| (from.as_str(), to.as_str(), data))
        })
    }

    pub fn successors(&self, node: &str) -> impl Iterator<Item = &str> {
        self.successors
            .get(node)
            .into_iter()
            .flat_map(|targets| targets.keys().map(String::as_str))
    }

    pub fn out_degree(&self, node: &str) -> usize {
        self.successors.get(node).map(BTreeMap::len).unwrap_or(0)
    }

    /// In-degree of every node (zero entries included).
    pub fn in_degrees(&self) -> BTreeMap<&str, usize> {
        let mut degrees: BTreeMap<&str, usize> = self.nodes().map(|node| (node, 0)).collect();
        for (_, to, _) in self.edges() {
            *degrees.entry(to).or_insert(0) += 1;
        }
        degrees
    }

    pub fn edge_set(&self) -> BTreeSet<(String, String)> {
        self.edges()
            .map(|(from, to, _)| (from.to_string(), to.to_string()))
            .collect()
    }

    pub(crate) fn indexed(&self) -> IndexedGraph<'_> {
        let names: Vec<&str> = self.nodes().collect();
        let lookup: HashMap<&str, usize> = names.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let adjacency = names
            .iter()
            .map(|&node| {
                self.successors(node)
                    .filter_map(|to| lookup.get(to).copied())
                    .collect()
            })
            .collect();
        IndexedGraph { names, adjacency }
    }
}

/// Edges over ordered node pairs: `E / (V·(V−1))`, 0 for fewer than two nodes.
pub fn density<E>(graph: &KmerGraph<E>) -> f64 {
    let nodes = graph.node_count();
    if nodes < 2 {
        return 0.0;
    }
    graph.edge_count() as f64 / (nodes * (nodes - 1)) as f64
}

/// Tarjan's algorithm with an explicit call stack.
pub fn strongly_connected_components<E>(graph: &KmerGraph<E>) -> Vec<Vec<String>> {
    let IndexedGraph { names, adjacency } = graph.indexed();
    let n = adjacency.len();

    let mut index = 0usize;
    let mut indices: Vec<Option<usize>> = vec![None; n];
    let mut lowlink = vec![0usize; n];
    let mut onstack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut sccs: Vec<Vec<String>> = Vec::new();

    for root in 0..n {
        if indices[root].is_some() {
            continue;
        }
        indices[root] = Some(index);
        lowlink[root] = index;
        index += 1;
        stack.push(root);
        onstack[root] = true;
        let mut calls: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = calls.last_mut() {
            let v = frame.0;
            if frame.1 < adjacency[v].len() {
                let w = adjacency[v][frame.1];
                frame.1 += 1;
                match indices[w] {
                    None => {
                        indices[w] = Some(index);
                        lowlink[w] = index;
                        index += 1;
                        stack.push(w);
                        onstack[w] = true;
                        calls.push((w, 0));
                    }
                    Some(iw) if onstack[w] => lowlink[v] = lowlink[v].min(iw),
                    Some(_) => {}
                }
                continue;
            }

            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if indices[v] == Some(lowlink[v]) {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    onstack[w] = false;
                    component.push(names[w].to_string());
                    if w == v {
                        break;
                    }
                }
                sccs.push(component);
            }
        }
    }
    sccs
}

/// Components that contain a cycle: size above one, or a single node with a self-loop.
pub fn detect_cycles<E>(graph: &KmerGraph<E>) -> Vec<Vec<String>> {
    strongly_connected_components(graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.has_edge(&component[0], &component[0])
        })
        .collect()
}

pub fn has_cycle<E>(graph: &KmerGraph<E>) -> bool {
    !detect_cycles(graph).is_empty()
}

/// A non-empty graph whose nodes all share one component. The empty graph is not.
pub fn is_strongly_connected<E>(graph: &KmerGraph<E>) -> bool {
    if graph.is_empty() {
        return false;
    }
    strongly_connected_components(graph).len() == 1
}

/// Breadth-first reachability.
pub fn reaches<E>(graph: &KmerGraph<E>, from: &str, to: &str) -> bool {
    if from == to {
        return graph.has_node(from);
    }
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(from);
    seen.insert(from);
    while let Some(node) = queue.pop_front() {
        for next in graph.successors(node) {
            if next == to {
                return true;
            }
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

/// Whether inserting `from -> to` would create a cycle.
pub fn would_close_cycle<E>(graph: &KmerGraph<E>, from: &str, to: &str) -> bool {
    from == to || reaches(graph, to, from)
}

#[derive(Clone)]
struct FlowEdge {
    to: usize,
    rev: usize,
    cap: i32,
}

/// Unit-capacity network with every node split into an in/out pair.
#[derive(Clone)]
struct SplitNetwork {
    graph: Vec<Vec<FlowEdge>>,
}

impl SplitNetwork {
    fn from_indexed(indexed: &IndexedGraph<'_>) -> Self {
        let n = indexed.adjacency.len();
        let mut network = SplitNetwork {
            graph: vec![Vec::new(); 2 * n],
        };
        for v in 0..n {
            network.add_edge(2 * v, 2 * v + 1, 1);
        }
        for (u, targets) in indexed.adjacency.iter().enumerate() {
            for &v in targets {
                if u != v {
                    network.add_edge(2 * u + 1, 2 * v, 1);
                }
            }
        }
        network
    }

    fn add_edge(&mut self, u: usize, v: usize, cap: i32) {
        let rev_u = self.graph[v].len();
        let rev_v = self.graph[u].len();
        self.graph[u].push(FlowEdge { to: v, rev: rev_u, cap });
        self.graph[v].push(FlowEdge {
            to: u,
            rev: rev_v,
            cap: 0,
        });
    }

    /// Edmonds-Karp; every augmenting path carries one unit.
    fn max_flow(&mut self, source: usize, sink: usize) -> usize {
        let mut flow = 0;
        loop {
            let mut parent: Vec<Option<(usize, usize)>> = vec![None; self.graph.len()];
            let mut queue = VecDeque::new();
            queue.push_back(source);
            let mut found = false;
            while let Some(u) = queue.pop_front() {
                for (idx, edge) in self.graph[u].iter().enumerate() {
                    if edge.cap > 0 && edge.to != source && parent[edge.to].is_none() {
                        parent[edge.to] = Some((u, idx));
                        if edge.to == sink {
                            found = true;
                            break;
                        }
                        queue.push_back(edge.to);
                    }
                }
                if found {
                    break;
                }
            }
            if !found {
                return flow;
            }
            let mut v = sink;
            while let Some((u, idx)) = parent[v] {
                let rev = self.graph[u][idx].rev;
                self.graph[u][idx].cap -= 1;
                self.graph[v][rev].cap += 1;
                v = u;
            }
            flow += 1;
        }
    }
}

/// Number of internally vertex-disjoint paths from `source` to `target`.
pub fn local_node_connectivity<E>(graph: &KmerGraph<E>, source: &str, target: &str) -> usize {
    let indexed = graph.indexed();
    let position = |name: &str| indexed.names.iter().position(|&n| n == name);
    match (position(source), position(target)) {
        (Some(s), Some(t)) if s != t => {
            SplitNetwork::from_indexed(&indexed).max_flow(2 * s + 1, 2 * t)
        }
        _ => 0,
    }
}

/// Mean node connectivity over all ordered pairs of distinct nodes; 0 when empty.
pub fn average_node_connectivity<E>(graph: &KmerGraph<E>) -> f64 {
    let indexed = graph.indexed();
    let n = indexed.adjacency.len();
    if n < 2 {
        return 0.0;
    }
    let base = SplitNetwork::from_indexed(&indexed);
    let mut total = 0usize;
    for s in 0..n {
        for t in 0..n {
            if s != t {
                total += base.clone().max_flow(2 * s + 1, 2 * t);
            }
        }
    }
    total as f64 / (n * (n - 1)) as f64
}

/// Second-smallest Laplacian eigenvalue of the undirected projection.
///
/// `None` for graphs with fewer than two nodes, more than `max_nodes` nodes, or
/// more than one connected component.
pub fn algebraic_connectivity<E>(graph: &KmerGraph<E>, max_nodes: usize) -> Option<f64> {
    let indexed = graph.indexed();
    let n = indexed.adjacency.len();
    if n < 2 || n > max_nodes {
        return None;
    }
    let mut neighbours: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for (u, targets) in indexed.adjacency.iter().enumerate() {
        for &v in targets {
            if u != v {
                neighbours[u].insert(v);
                neighbours[v].insert(u);
            }
        }
    }

    let mut seen = vec![false; n];
    let mut queue = VecDeque::from([0usize]);
    seen[0] = true;
    while let Some(u) = queue.pop_front() {
        for &v in &neighbours[u] {
            if !seen[v] {
                seen[v] = true;
                queue.push_back(v);
            }
        }
    }
    if seen.iter().any(|&s| !s) {
        return None;
    }

    let mut laplacian = Array2::<f64>::zeros((n, n));
    for (u, adjacent) in neighbours.iter().enumerate() {
        laplacian[[u, u]] = adjacent.len() as f64;
        for &v in adjacent {
            laplacian[[u, v]] = -1.0;
        }
    }
    let eigenvalues = symmetric_eigenvalues(laplacian);
    eigenvalues.get(1).copied()
}

/// Cyclic Jacobi rotations; returns eigenvalues in ascending order.
fn symmetric_eigenvalues(mut a: Array2<f64>) -> Vec<f64> {
    let n = a.nrows();
    for _sweep in 0..100 {
        let mut off_diagonal = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diagonal += a[[p, q]] * a[[p, q]];
            }
        }
        if off_diagonal < 1e-20 {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < 1e-15 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
            }
        }
    }
    let mut eigenvalues: Vec<f64> = (0..n).map(|i| a[[i, i]]).collect();
    eigenvalues.sort_by(|x, y| x.total_cmp(y));
    eigenvalues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_from(edges: &[(&str, &str)]) -> KmerGraph {
        let mut graph = KmerGraph::new();
        for &(from, to) in edges {
            graph.add_edge(from, to, ());
        }
        graph
    }

    #[test]
    fn adds_and_removes_edges() {
        let mut graph = graph_from(&[("12", "23"), ("23", "31")]);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.has_edge("12", "23"));
        assert!(graph.remove_edge("12", "23").is_some());
        assert!(!graph.has_edge("12", "23"));
        assert!(graph.has_node("12"));
        assert_eq!(graph.in_degrees()["31"], 1);
    }

    #[test]
    fn detect_simple_cycle() {
        let graph = graph_from(&[("a", "b"), ("b", "c"), ("c", "a"), ("c", "d")]);
        let cycles = detect_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 3);
        assert!(has_cycle(&graph));
        assert!(!is_strongly_connected(&graph));
    }

    #[test]
    fn self_loop_counts_as_cycle() {
        let graph = graph_from(&[("a", "a")]);
        assert!(has_cycle(&graph));
        assert!(is_strongly_connected(&graph));
    }

    #[test]
    fn acyclic_and_empty_graphs() {
        let chain = graph_from(&[("a", "b"), ("b", "c")]);
        assert!(!has_cycle(&chain));
        assert!(!is_strongly_connected(&chain));
        assert!(would_close_cycle(&chain, "c", "a"));
        assert!(!would_close_cycle(&chain, "a", "c"));
        let empty: KmerGraph = KmerGraph::new();
        assert!(!is_strongly_connected(&empty));
        assert!(!has_cycle(&empty));
        assert_eq!(density(&empty), 0.0);
    }

    #[test]
    fn density_counts_ordered_pairs() {
        let graph = graph_from(&[("a", "b"), ("b", "a"), ("b", "c")]);
        assert!((density(&graph) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn node_connectivity_counts_disjoint_paths() {
        // Two internally disjoint routes from s to t.
        let graph = graph_from(&[("s", "a"), ("a", "t"), ("s", "b"), ("b", "t")]);
        assert_eq!(local_node_connectivity(&graph, "s", "t"), 2);
        assert_eq!(local_node_connectivity(&graph, "t", "s"), 0);

        let cycle = graph_from(&[("a", "b"), ("b", "c"), ("c", "a")]);
        assert!((average_node_connectivity(&cycle) - 1.0).abs() < 1e-12);
        let empty: KmerGraph = KmerGraph::new();
        assert_eq!(average_node_connectivity(&empty), 0.0);
    }

    #[test]
    fn algebraic_connectivity_of_path_and_triangle() {
        let path = graph_from(&[("a", "b"), ("b", "c")]);
        let lambda = algebraic_connectivity(&path, 64).expect("connected");
        assert!((lambda - 1.0).abs() < 1e-9);

        let triangle = graph_from(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let lambda = algebraic_connectivity(&triangle, 64).expect("connected");
        assert!((lambda - 3.0).abs() < 1e-9);

        let split = graph_from(&[("a", "b"), ("c", "d")]);
        assert!(algebraic_connectivity(&split, 64).is_none());
        assert!(algebraic_connectivity(&triangle, 2).is_none());
    }
}
