//! The five ways of producing a hypothetical superpermutation for orders above
//! the base case, and the weighted choice between them.

use std::collections::HashSet;
use std::fmt;

use log::{debug, trace};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::analysis::{extract_segments, segment_similarity, select_diverse};
use crate::assembler::{complete_from_partial, connect_segments};
use crate::candidate::{extend_segment, CandidateGenerator, Evidence};
use crate::config::{ConstructConfig, MutationConfig, StrategyWeights};
use crate::debruijn::{attach_weights, complete_de_bruijn, find_high_weight_paths_with_budget};
use crate::error::{ConstructError, Result};
use crate::formulas::{imperfect_estimate, FormulaLibrary};
use crate::kmer_stats::WinnerLoserTable;
use crate::permutation::{
    append_with_overlap, covered_permutations, enumerate, missing_permutations,
    permutation_occurrences, PermutationId,
};
use crate::prodigal::ProdigalStore;

/// Laminate density below which exploratory strategies are favoured.
pub const SPARSE_DENSITY: f64 = 0.1;
/// Laminate connectivity above which structure-exploiting strategies are favoured.
pub const DENSE_CONNECTIVITY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NMinus1Shell,
    ProdigalCombination,
    DeBruijn,
    Mutation,
    RandomConstrained,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::NMinus1Shell,
        Strategy::ProdigalCombination,
        Strategy::DeBruijn,
        Strategy::Mutation,
        Strategy::RandomConstrained,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::NMinus1Shell => "n_minus_1_shell",
            Strategy::ProdigalCombination => "prodigal_combination",
            Strategy::DeBruijn => "de_bruijn",
            Strategy::Mutation => "mutation",
            Strategy::RandomConstrained => "random_constrained",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy weights in [`Strategy::ALL`] order after the laminate adjustment.
///
/// Sparse laminates double `random_constrained` and raise `de_bruijn` by half;
/// otherwise well-connected laminates double `prodigal_combination` and raise
/// `n_minus_1_shell` by half.
pub fn adjusted_weights(weights: &StrategyWeights, density: f64, connectivity: f64) -> [f64; 5] {
    let mut adjusted = [
        weights.n_minus_1_shell,
        weights.prodigal_combination,
        weights.de_bruijn,
        weights.mutation,
        weights.random_constrained,
    ];
    if density < SPARSE_DENSITY {
        adjusted[4] *= 2.0;
        adjusted[2] *= 1.5;
    } else if connectivity > DENSE_CONNECTIVITY {
        adjusted[1] *= 2.0;
        adjusted[0] *= 1.5;
    }
    adjusted
}

/// Weighted random choice; falls back to the shell when no weight is positive.
pub fn select_strategy<R: Rng + ?Sized>(
    weights: &StrategyWeights,
    density: f64,
    connectivity: f64,
    rng: &mut R,
) -> Strategy {
    let adjusted = adjusted_weights(weights, density, connectivity).map(|w| w.max(0.0));
    match WeightedIndex::new(adjusted) {
        Ok(dist) => Strategy::ALL[dist.sample(rng)],
        Err(_) => Strategy::NMinus1Shell,
    }
}

/// Everything a strategy reads while building one hypothesis.
pub struct StrategyContext<'a> {
    pub order: usize,
    pub config: &'a ConstructConfig,
    pub evidence: Evidence<'a>,
    pub generator: &'a dyn CandidateGenerator,
    pub prodigals: &'a ProdigalStore,
    pub formulas: &'a dyn FormulaLibrary,
    pub table: &'a WinnerLoserTable,
    /// Best sequence of order n−1.
    pub previous_best: Option<&'a str>,
    /// Best sequence of this order so far.
    pub best: Option<&'a str>,
    /// Length a hypothesis must not exceed.
    pub bound: usize,
}

impl StrategyContext<'_> {
    fn attempt_limit(&self) -> usize {
        self.config.attempt_limit_for(self.order)
    }

    /// Complete `partial` at its suffix.
    fn finish(&self, partial: &str) -> Result<String> {
        let mut missing = missing_permutations(partial, self.order)?;
        complete_from_partial(partial, &mut missing, self.generator, self.bound, self.attempt_limit())
    }

    /// Connect `segments`, then complete.
    fn splice(&self, segments: &[String]) -> Result<String> {
        let mut missing: HashSet<PermutationId> = missing_permutations("", self.order)?;
        let combined = connect_segments(
            segments,
            &mut missing,
            self.generator,
            self.config.max_bridge_length,
        )?;
        complete_from_partial(&combined, &mut missing, self.generator, self.bound, self.attempt_limit())
    }
}

/// A complete candidate sequence and the prodigals it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub strategy: Strategy,
    pub sequence: String,
    pub used_prodigals: Vec<u64>,
}

pub fn generate_hypothesis<R: Rng + ?Sized>(
    strategy: Strategy,
    ctx: &StrategyContext<'_>,
    rng: &mut R,
) -> Result<Hypothesis> {
    let mut used_prodigals = Vec::new();
    let sequence = match strategy {
        Strategy::NMinus1Shell => n_minus_1_shell(ctx)?,
        Strategy::ProdigalCombination => prodigal_combination(ctx, rng, &mut used_prodigals)?,
        Strategy::DeBruijn => de_bruijn(ctx, rng)?,
        Strategy::Mutation => mutation(ctx, rng)?,
        Strategy::RandomConstrained => random_constrained(ctx, rng)?,
    };
    debug!(
        "{} produced a hypothesis of length {} for n={}",
        strategy,
        sequence.len(),
        ctx.order
    );
    Ok(Hypothesis {
        strategy,
        sequence,
        used_prodigals,
    })
}

/// Lift the perfect runs of the order n−1 best to order n and stitch them.
///
/// Runs of stored n−1 prodigals join the pool only when they are diverse and
/// bring an n−1 permutation the best sequence's runs do not already hold.
pub fn n_minus_1_shell(ctx: &StrategyContext<'_>) -> Result<String> {
    let n = ctx.order;
    if n < 2 {
        return Err(ConstructError::Unsupported(format!("no shell below order 2 (n={})", n)));
    }
    let previous = ctx.previous_best.ok_or_else(|| {
        ConstructError::DeadEnd(format!("no sequence of order {} to lift", n - 1))
    })?;
    let mut segments = extract_segments(previous, n - 1);
    let mut covered = covered_permutations(previous, n - 1)?;

    let extras: Vec<String> = ctx
        .prodigals
        .top(n - 1, ctx.config.shell_prodigals)
        .into_iter()
        .flat_map(|p| extract_segments(&p.sequence, n - 1))
        .collect();
    for extra in select_diverse(extras, ctx.config.segment_similarity) {
        let ids = covered_permutations(&extra, n - 1)?;
        let similar = segments
            .iter()
            .any(|s| segment_similarity(s, &extra) >= ctx.config.segment_similarity);
        if !similar && !ids.is_subset(&covered) {
            covered.extend(ids);
            segments.push(extra);
        }
    }

    let mut lifted = Vec::with_capacity(segments.len());
    for segment in &segments {
        let block = extend_segment(segment, n, &ctx.evidence)?;
        if !block.is_empty() {
            lifted.push(block);
        }
    }
    if lifted.is_empty() {
        return Err(ConstructError::DeadEnd(format!(
            "every lifted block for n={} was filtered out",
            n
        )));
    }
    trace!("shell for n={} uses {} segments", n, lifted.len());
    ctx.splice(&lifted)
}

/// Stitch rotated slices of two to four randomly chosen prodigals of this order.
/// A stored prodigal overlapping the last slice by at least `n−1` symbols is
/// appended whole.
pub fn prodigal_combination<R: Rng + ?Sized>(
    ctx: &StrategyContext<'_>,
    rng: &mut R,
    used: &mut Vec<u64>,
) -> Result<String> {
    let n = ctx.order;
    let pool = ctx.prodigals.get_best(n);
    if pool.is_empty() {
        return Err(ConstructError::DeadEnd(format!("no prodigals of order {}", n)));
    }
    let count = if pool.len() >= 2 {
        rng.gen_range(2..=pool.len().min(4))
    } else {
        1
    };
    let mut chosen: Vec<_> = pool.choose_multiple(rng, count).copied().collect();
    chosen.sort_by(|a, b| b.length.cmp(&a.length).then(a.id.cmp(&b.id)));

    let slice_length = (ctx.formulas.segment_length(n, imperfect_estimate(n)) * count as f64)
        .ceil()
        .max(n as f64) as usize;
    let mut segments = Vec::with_capacity(chosen.len());
    for prodigal in chosen {
        let sequence = &prodigal.sequence;
        let start = rng.gen_range(0..sequence.len());
        let rotated = format!("{}{}", &sequence[start..], &sequence[..start]);
        segments.push(rotated[..slice_length.min(rotated.len())].to_string());
        used.push(prodigal.id);
    }
    if let Some(tail) = segments.last() {
        if let Some((next, overlap)) = ctx.prodigals.best_continuation(tail, n) {
            if overlap + 1 >= n && overlap < next.length && !used.contains(&next.id) {
                trace!("prodigal {} continues the chain with overlap {}", next.id, overlap);
                segments.push(next.sequence.clone());
                used.push(next.id);
            }
        }
    }
    ctx.splice(&segments)
}

/// Complete the best weighted walk from a random node of the complete graph.
pub fn de_bruijn<R: Rng + ?Sized>(ctx: &StrategyContext<'_>, rng: &mut R) -> Result<String> {
    let n = ctx.order;
    let k = ctx.config.de_bruijn_k_for(n);
    if k < 2 {
        return Err(ConstructError::Unsupported(format!(
            "De Bruijn strategy needs k >= 2 (n={})",
            n
        )));
    }
    let mut graph = complete_de_bruijn(n, k)?;
    attach_weights(&mut graph, ctx.table, n);
    let nodes: Vec<&str> = graph.nodes().collect();
    let start = nodes
        .choose(rng)
        .map(|node| node.to_string())
        .ok_or_else(|| ConstructError::DeadEnd("empty De Bruijn graph".into()))?;
    let paths = find_high_weight_paths_with_budget(
        &graph,
        &start,
        ctx.config.max_bridge_length.max(1),
        ctx.config.path_count,
        ctx.config.path_expansion_budget,
    );
    let best = paths
        .first()
        .ok_or_else(|| ConstructError::DeadEnd(format!("no walk from {}", start)))?;
    ctx.finish(&best.spell())
}

/// Randomly edit the best sequence of this order, then repair it by completion.
pub fn mutation<R: Rng + ?Sized>(ctx: &StrategyContext<'_>, rng: &mut R) -> Result<String> {
    let best = ctx
        .best
        .ok_or_else(|| ConstructError::DeadEnd(format!("no sequence of order {} to mutate", ctx.order)))?;
    let mutated = mutate(best, ctx.order, &ctx.config.mutation, rng);
    ctx.finish(&mutated)
}

/// Apply `rate · occurrences` edits (at least one, at most `max_edits`).
pub fn mutate<R: Rng + ?Sized>(
    sequence: &str,
    n: usize,
    config: &MutationConfig,
    rng: &mut R,
) -> String {
    let weights = [
        config.swap,
        config.insert,
        config.delete,
        config.reverse,
        config.kmer_swap,
    ]
    .map(|w| w.max(0.0));
    let Ok(kinds) = WeightedIndex::new(weights) else {
        return sequence.to_string();
    };
    let occurrences = permutation_occurrences(sequence, n).len();
    let edits = ((occurrences as f64 * config.rate).ceil() as usize).clamp(1, config.max_edits.max(1));

    let mut symbols: Vec<u8> = sequence.bytes().collect();
    for _ in 0..edits {
        let len = symbols.len();
        if len == 0 {
            break;
        }
        match kinds.sample(rng) {
            0 => {
                let (i, j) = (rng.gen_range(0..len), rng.gen_range(0..len));
                symbols.swap(i, j);
            }
            1 => {
                let at = rng.gen_range(0..=len);
                symbols.insert(at, b'0' + rng.gen_range(1..=n as u8));
            }
            2 => {
                if len > 1 {
                    symbols.remove(rng.gen_range(0..len));
                }
            }
            3 => {
                let width = n.min(len);
                let start = rng.gen_range(0..=len - width);
                symbols[start..start + width].reverse();
            }
            // kmer_swap
            _ => {}
        }
    }
    symbols.into_iter().map(char::from).collect()
}

/// Merge the admitted permutations in random order, rejecting results over the bound.
pub fn random_constrained<R: Rng + ?Sized>(ctx: &StrategyContext<'_>, rng: &mut R) -> Result<String> {
    let mut perms: Vec<String> = enumerate(ctx.order)?
        .filter(|perm| ctx.evidence.admits(perm))
        .collect();
    perms.shuffle(rng);
    let mut merged = String::new();
    for perm in &perms {
        append_with_overlap(&mut merged, perm);
        if merged.len() > ctx.bound {
            return Err(ConstructError::BudgetExhausted(format!(
                "random order passed the bound {} after {} symbols",
                ctx.bound,
                merged.len()
            )));
        }
    }
    ctx.finish(&merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::EvidenceGuidedGenerator;
    use crate::formulas::StandardFormulas;
    use crate::layout::LayoutMemory;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sparse_laminates_favour_exploration() {
        let weights = StrategyWeights {
            n_minus_1_shell: 1.0,
            prodigal_combination: 1.0,
            de_bruijn: 1.0,
            mutation: 1.0,
            random_constrained: 1.0,
        };
        assert_eq!(adjusted_weights(&weights, 0.0, 0.0), [1.0, 1.0, 1.5, 1.0, 2.0]);
        assert_eq!(adjusted_weights(&weights, 0.5, 0.9), [1.5, 2.0, 1.0, 1.0, 1.0]);
        assert_eq!(adjusted_weights(&weights, 0.5, 0.5), [1.0; 5]);
    }

    #[test]
    fn selection_respects_zero_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let only_mutation = StrategyWeights {
            n_minus_1_shell: 0.0,
            prodigal_combination: 0.0,
            de_bruijn: 0.0,
            mutation: 1.0,
            random_constrained: 0.0,
        };
        for _ in 0..20 {
            assert_eq!(select_strategy(&only_mutation, 0.0, 0.0, &mut rng), Strategy::Mutation);
        }
        let nothing = StrategyWeights {
            mutation: 0.0,
            ..only_mutation
        };
        assert_eq!(select_strategy(&nothing, 0.0, 0.0, &mut rng), Strategy::NMinus1Shell);
    }

    #[test]
    fn mutation_edits_stay_in_the_alphabet() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = MutationConfig {
            rate: 1.0,
            max_edits: 5,
            ..MutationConfig::default()
        };
        let mutated = mutate("123121321", 3, &config, &mut rng);
        assert!(mutated.bytes().all(|b| (b'1'..=b'3').contains(&b)));
        assert!(mutated.len().abs_diff(9) <= 5);

        let idle = MutationConfig {
            swap: 0.0,
            insert: 0.0,
            delete: 0.0,
            reverse: 0.0,
            kmer_swap: 1.0,
            ..MutationConfig::default()
        };
        assert_eq!(mutate("123121321", 3, &idle, &mut rng), "123121321");
    }

    #[test]
    fn shell_lifts_the_previous_order() {
        let table = WinnerLoserTable::new();
        let layout = LayoutMemory::new();
        let limbo = HashSet::new();
        let evidence = Evidence {
            order: 4,
            table: &table,
            layout: &layout,
            constraint_laminates: &[],
            anti_laminates: &[],
            limbo: &limbo,
            loser_threshold: 20,
        };
        let store = ProdigalStore::new();
        let config = ConstructConfig::for_order(4);
        let formulas = StandardFormulas::default();
        let generator =
            EvidenceGuidedGenerator::new(evidence, &store, 5, &config.scoring_weights, &formulas);
        let ctx = StrategyContext {
            order: 4,
            config: &config,
            evidence,
            generator: &generator,
            prodigals: &store,
            formulas: &formulas,
            table: &table,
            previous_best: Some("123121321"),
            best: None,
            bound: 33,
        };
        let shell = n_minus_1_shell(&ctx).expect("order 3 lifts to order 4");
        assert_eq!(shell.len(), 33);
        assert!(missing_permutations(&shell, 4).expect("order 4").is_empty());

        let mut rng = StdRng::seed_from_u64(42);
        let err = prodigal_combination(&ctx, &mut rng, &mut Vec::new()).expect_err("empty store");
        assert!(err.is_recoverable());
        let err = mutation(&ctx, &mut rng).expect_err("no best to mutate");
        assert!(err.is_recoverable());
    }
}
