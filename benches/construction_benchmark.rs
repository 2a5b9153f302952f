//! Benchmarks for candidate generation, greedy completion and weighted path search.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashSet;
use std::time::Duration;

use superperm_rs::assembler::complete_from_partial;
use superperm_rs::candidate::{generate_candidates, Evidence, EvidenceGuidedGenerator, ExtensionEnd};
use superperm_rs::config::ScoringWeights;
use superperm_rs::debruijn::{attach_weights, complete_de_bruijn, find_high_weight_paths_with_budget};
use superperm_rs::formulas::StandardFormulas;
use superperm_rs::kmer_stats::{KmerKey, WinnerLoserTable};
use superperm_rs::layout::LayoutMemory;
use superperm_rs::permutation::{missing_permutations, partial_permutations};
use superperm_rs::prodigal::ProdigalStore;

fn random_table(n: usize, k: usize) -> WinnerLoserTable {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(42);
    let mut table = WinnerLoserTable::new();
    for kmer in partial_permutations(n, k) {
        table.add(KmerKey::new(n, kmer), rng.gen_range(-5..=5));
    }
    table
}

fn bench_candidate_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("candidate_generation");
    let layout = LayoutMemory::new();
    let limbo = HashSet::new();

    for n in [4usize, 5, 6] {
        let table = random_table(n, n - 1);
        let evidence = Evidence {
            order: n,
            table: &table,
            layout: &layout,
            constraint_laminates: &[],
            anti_laminates: &[],
            limbo: &limbo,
            loser_threshold: 20,
        };
        let partial: String = (1..=n).map(|d| char::from(b'0' + d as u8)).collect();
        let missing = missing_permutations(&partial, n).expect("valid order");

        group.bench_with_input(BenchmarkId::new("suffix", n), &partial, |b, partial| {
            b.iter(|| {
                generate_candidates(black_box(partial), &missing, &evidence, &ExtensionEnd::Suffix)
            });
        });
    }

    group.finish();
}

fn bench_greedy_completion(c: &mut Criterion) {
    let mut group = c.benchmark_group("greedy_completion");
    group.measurement_time(Duration::from_secs(10));
    let layout = LayoutMemory::new();
    let limbo = HashSet::new();
    let store = ProdigalStore::new();
    let weights = ScoringWeights::default();
    let formulas = StandardFormulas::default();

    for (n, bound) in [(4usize, 33usize), (5, 153)] {
        let table = WinnerLoserTable::new();
        let evidence = Evidence {
            order: n,
            table: &table,
            layout: &layout,
            constraint_laminates: &[],
            anti_laminates: &[],
            limbo: &limbo,
            loser_threshold: 20,
        };
        let generator = EvidenceGuidedGenerator::new(evidence, &store, 10, &weights, &formulas);
        group.bench_with_input(BenchmarkId::new("from_empty", n), &bound, |b, &bound| {
            b.iter(|| {
                let mut missing = missing_permutations("", n).expect("valid order");
                complete_from_partial("", &mut missing, &generator, bound, 4 * bound)
                    .expect("greedy completion reaches the bound")
            });
        });
    }

    group.finish();
}

fn bench_path_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("de_bruijn_paths");

    for (n, k) in [(4usize, 3usize), (5, 4), (6, 5)] {
        let table = random_table(n, k);
        let mut graph = complete_de_bruijn(n, k).expect("valid window");
        attach_weights(&mut graph, &table, n);
        let start: String = (1..k).map(|d| char::from(b'0' + d as u8)).collect();

        group.bench_with_input(BenchmarkId::new("top_10", n), &start, |b, start| {
            b.iter(|| find_high_weight_paths_with_budget(&graph, black_box(start), 12, 10, 50_000));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_candidate_generation,
    bench_greedy_completion,
    bench_path_search
);
criterion_main!(benches);
