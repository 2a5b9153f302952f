//! Order-by-order construction driver.
//!
//! Orders up to [`BASE_CASE_MAX`] are built directly by greedy completion from
//! an empty sequence. Larger orders run a state machine that selects a
//! strategy, generates a hypothesis, validates it and folds the validator's
//! evidence back into the shared tables, until a hypothesis is valid or the
//! iteration cap is reached.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::assembler::complete_from_partial;
use crate::candidate::{Evidence, EvidenceGuidedGenerator};
use crate::config::{ConfigSet, ConstructConfig};
use crate::debruijn::CONNECTIVITY_NODE_LIMIT;
use crate::error::{ConstructError, Result};
use crate::formulas::{FormulaLibrary, StandardFormulas};
use crate::kmer_stats::{compute_winners_losers, WinnerLoserTable};
use crate::laminate::{
    connectivity, create_anti_laminate, create_laminate, density, Laminate, LaminateAlbum,
    ValidationContext,
};
use crate::layout::LayoutMemory;
use crate::permutation::{factorial, missing_permutations, validate_order, validate_sequence};
use crate::persistence::{EvidenceSnapshot, InMemoryPersistence, Persistence};
use crate::prodigal::{find_prodigal_results, ProdigalStore};
use crate::strategy::{generate_hypothesis, select_strategy, Hypothesis, Strategy, StrategyContext};
use crate::validator::{BouncingBatch, SequenceValidator, ValidationReport};

/// Largest order built without strategy selection.
pub const BASE_CASE_MAX: usize = 5;
/// Stored prodigals whose permutations earn the candidate prodigal bonus.
pub const SCORING_PRODIGALS: usize = 10;

static NO_ANTI_PRODIGALS: BTreeSet<String> = BTreeSet::new();

/// Shared tables owned by the orchestrator for the whole run.
#[derive(Debug, Clone, Default)]
pub struct EvidenceStore {
    pub table: WinnerLoserTable,
    pub layout: LayoutMemory,
    constraint_laminates: BTreeMap<usize, Vec<Laminate>>,
    anti_laminates: BTreeMap<usize, Vec<Laminate>>,
    anti_prodigals: BTreeMap<usize, BTreeSet<String>>,
    limbo: HashSet<String>,
}

impl EvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the evidence for order `n`.
    pub fn evidence(&self, n: usize, loser_threshold: i64) -> Evidence<'_> {
        Evidence {
            order: n,
            table: &self.table,
            layout: &self.layout,
            constraint_laminates: self
                .constraint_laminates
                .get(&n)
                .map_or(&[][..], Vec::as_slice),
            anti_laminates: self.anti_laminates.get(&n).map_or(&[][..], Vec::as_slice),
            limbo: &self.limbo,
            loser_threshold,
        }
    }

    pub fn constraint_laminates(&self, n: usize) -> &[Laminate] {
        self.constraint_laminates.get(&n).map_or(&[][..], Vec::as_slice)
    }

    pub fn anti_laminates(&self, n: usize) -> &[Laminate] {
        self.anti_laminates.get(&n).map_or(&[][..], Vec::as_slice)
    }

    pub fn anti_prodigals(&self, n: usize) -> &BTreeSet<String> {
        self.anti_prodigals.get(&n).unwrap_or(&NO_ANTI_PRODIGALS)
    }

    pub fn limbo(&self) -> &HashSet<String> {
        &self.limbo
    }

    fn validation_context(&self, n: usize) -> ValidationContext<'_> {
        ValidationContext {
            table: &self.table,
            layout: &self.layout,
            anti_prodigals: self.anti_prodigals(n),
        }
    }

    /// Fold a validator report into the tables.
    ///
    /// Weight deltas always apply. Layout observations come only from valid
    /// sequences; anti-prodigals of invalid ones go to limbo and refresh the
    /// order's anti-laminate.
    pub fn absorb(&mut self, n: usize, report: &ValidationReport) -> Result<()> {
        self.table.update(&report.delta);
        if report.is_valid {
            self.layout.merge(&report.layout);
            return Ok(());
        }
        if report.anti_prodigals.is_empty() {
            return Ok(());
        }
        self.limbo.extend(report.anti_prodigals.iter().cloned());
        let known = self.anti_prodigals.entry(n).or_default();
        known.extend(report.anti_prodigals.iter().cloned());
        let k = n.saturating_sub(1);
        if k >= 2 {
            let kmers: Vec<&String> = known.iter().filter(|s| s.len() == k).collect();
            let anti = create_anti_laminate(&kmers, n, k)?;
            debug!(
                "anti-laminate for n={} now forbids {} transitions",
                n,
                anti.edge_count()
            );
            self.anti_laminates.insert(n, vec![anti]);
        }
        Ok(())
    }
}

/// Where the construction of one order stands.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstructionState {
    Selecting,
    Generating(Strategy),
    Validating(Hypothesis),
    Updating {
        hypothesis: Hypothesis,
        report: ValidationReport,
    },
    Completed(String),
    Failed(String),
}

impl ConstructionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConstructionState::Selecting => "selecting",
            ConstructionState::Generating(_) => "generating",
            ConstructionState::Validating(_) => "validating",
            ConstructionState::Updating { .. } => "updating",
            ConstructionState::Completed(_) => "completed",
            ConstructionState::Failed(_) => "failed",
        }
    }
}

/// What happened while building one order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderOutcome {
    pub order: usize,
    pub length: usize,
    pub bound: usize,
    pub iterations: usize,
    pub strategy: Option<Strategy>,
    pub resumed: bool,
    pub predicted_length: f64,
    pub discrepancy: f64,
}

pub struct Orchestrator {
    configs: ConfigSet,
    formulas: Box<dyn FormulaLibrary>,
    validator: Option<Box<dyn SequenceValidator>>,
    persistence: Box<dyn Persistence>,
    evidence: EvidenceStore,
    prodigals: ProdigalStore,
    album: LaminateAlbum,
    best: BTreeMap<usize, String>,
    outcomes: Vec<OrderOutcome>,
}

impl Orchestrator {
    pub fn new(configs: ConfigSet) -> Self {
        Self {
            configs,
            formulas: Box::new(StandardFormulas::default()),
            validator: None,
            persistence: Box::new(InMemoryPersistence::new()),
            evidence: EvidenceStore::new(),
            prodigals: ProdigalStore::new(),
            album: LaminateAlbum::new(),
            best: BTreeMap::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn with_persistence(mut self, persistence: Box<dyn Persistence>) -> Self {
        self.persistence = persistence;
        self
    }

    /// Replace the per-order [`BouncingBatch`] built from each order's config.
    pub fn with_validator(mut self, validator: Box<dyn SequenceValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_formulas(mut self, formulas: Box<dyn FormulaLibrary>) -> Self {
        self.formulas = formulas;
        self
    }

    pub fn best(&self, n: usize) -> Option<&str> {
        self.best.get(&n).map(String::as_str)
    }

    pub fn outcomes(&self) -> &[OrderOutcome] {
        &self.outcomes
    }

    pub fn evidence(&self) -> &EvidenceStore {
        &self.evidence
    }

    pub fn prodigals(&self) -> &ProdigalStore {
        &self.prodigals
    }

    pub fn album(&self) -> &LaminateAlbum {
        &self.album
    }

    /// Seed the tables from known sequences, grouped by the order their largest
    /// symbol implies.
    pub fn prime<S: AsRef<str>>(&mut self, corpus: &[S]) -> Result<()> {
        let mut by_order: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for sequence in corpus {
            let sequence = sequence.as_ref();
            let n = sequence
                .bytes()
                .max()
                .filter(u8::is_ascii_digit)
                .map(|b| usize::from(b - b'0'))
                .unwrap_or(0);
            validate_order(n)?;
            validate_sequence(sequence, n)?;
            by_order.entry(n).or_default().push(sequence);
        }

        for (n, sequences) in by_order {
            let config = self.configs.for_order(n)?;
            let windows: Vec<usize> = [n.checked_sub(1), n.checked_sub(2)]
                .into_iter()
                .flatten()
                .filter(|&k| k >= 1)
                .collect();
            for &k in &windows {
                self.evidence
                    .table
                    .update(&compute_winners_losers(&sequences, n, k)?);
            }
            for sequence in &sequences {
                self.evidence
                    .layout
                    .add_sequence(sequence, n, n.saturating_sub(1), "corpus");
            }
            let criteria = config.prodigal_criteria();
            for sequence in &sequences {
                for found in find_prodigal_results(sequence, n, &criteria) {
                    let evidence = self.evidence.evidence(n, config.loser_threshold);
                    self.prodigals.add(&found, n, "corpus", &evidence, &criteria)?;
                }
            }
            info!(
                "primed n={} from {} sequences ({} weighted k-mers, {} prodigals)",
                n,
                sequences.len(),
                self.evidence.table.len(),
                self.prodigals.len()
            );
        }
        Ok(())
    }

    /// Build every order from 1 to `target` and return the best of `target`.
    pub fn run(&mut self, target: usize) -> Result<String> {
        validate_order(target)?;
        for n in 1..=target {
            self.run_order(n)?;
        }
        self.best
            .get(&target)
            .cloned()
            .ok_or_else(|| ConstructError::DeadEnd(format!("no sequence recorded for n={}", target)))
    }

    /// Length a new sequence of order `n` must not exceed.
    pub fn bound(&self, n: usize) -> usize {
        let additive = n
            .checked_sub(1)
            .and_then(|prev| self.best.get(&prev))
            .map_or(0, String::len)
            + factorial(n);
        match self.best.get(&n) {
            Some(best) => best.len().min(additive),
            None => additive,
        }
    }

    pub fn run_order(&mut self, n: usize) -> Result<String> {
        validate_order(n)?;
        let config = self.configs.for_order(n)?;
        if let Some(sequence) = self.resume(n)? {
            self.push_outcome(n, &sequence, 0, None, true);
            return Ok(sequence);
        }

        let (sequence, iterations, strategy) = if n <= BASE_CASE_MAX {
            (self.base_case(n, &config)?, 1, None)
        } else {
            let (sequence, iterations, strategy) = self.construct(n, &config)?;
            (sequence, iterations, Some(strategy))
        };
        self.checkpoint(n)?;
        self.push_outcome(n, &sequence, iterations, strategy, false);
        Ok(sequence)
    }

    /// Reload a finished order from persistence, if one was saved and is complete.
    fn resume(&mut self, n: usize) -> Result<Option<String>> {
        let Some(sequence) = self.persistence.load_best(n)? else {
            return Ok(None);
        };
        validate_sequence(&sequence, n)?;
        if !missing_permutations(&sequence, n)?.is_empty() {
            warn!("ignoring incomplete saved sequence for n={}", n);
            return Ok(None);
        }
        if let Some(snapshot) = self.persistence.load_evidence(n)? {
            self.restore(n, snapshot)?;
        }
        info!("resumed n={} from a saved sequence of length {}", n, sequence.len());
        self.best.insert(n, sequence.clone());
        Ok(Some(sequence))
    }

    fn restore(&mut self, n: usize, snapshot: EvidenceSnapshot) -> Result<()> {
        self.evidence
            .table
            .update(&WinnerLoserTable::from_entries(snapshot.winners_losers));
        self.evidence
            .layout
            .merge(&LayoutMemory::from_records(snapshot.layout));

        let mut prodigals = self.prodigals.snapshot();
        for prodigal in snapshot.prodigals {
            if self.prodigals.get(prodigal.id).is_none() {
                prodigals.push(prodigal);
            }
        }
        self.prodigals = ProdigalStore::restore(prodigals);

        let mut records = self.album.records();
        for record in snapshot.laminates {
            if self.album.get(record.id).is_none() {
                records.push(record);
            }
        }
        self.album = LaminateAlbum::from_records(records)?;

        let anti: Vec<Laminate> = snapshot
            .anti_laminates
            .iter()
            .map(Laminate::from_record)
            .collect::<Result<_>>()?;
        if !anti.is_empty() {
            self.evidence.anti_laminates.insert(n, anti);
        }
        self.evidence.limbo.extend(snapshot.limbo);
        Ok(())
    }

    /// Validate with the supplied validator, or a [`BouncingBatch`] over the
    /// order's grid.
    fn validate(&self, sequence: &str, n: usize, config: &ConstructConfig) -> Result<ValidationReport> {
        let table = &self.evidence.table;
        match &self.validator {
            Some(validator) => validator.validate(sequence, n, table),
            None => BouncingBatch::new(
                config.grid_dimensions.clone(),
                config.anti_prodigal_overlap_threshold,
                config.anti_prodigal_threshold,
            )
            .validate(sequence, n, table),
        }
    }

    /// Greedy completion from an empty sequence.
    fn base_case(&mut self, n: usize, config: &ConstructConfig) -> Result<String> {
        let bound = self.bound(n);
        let sequence = {
            let evidence = self.evidence.evidence(n, config.loser_threshold);
            let generator = EvidenceGuidedGenerator::new(
                evidence,
                &self.prodigals,
                SCORING_PRODIGALS,
                &config.scoring_weights,
                self.formulas.as_ref(),
            );
            let mut missing = missing_permutations("", n)?;
            complete_from_partial("", &mut missing, &generator, bound, config.attempt_limit_for(n))?
        };
        let report = self.validate(&sequence, n, config)?;
        self.evidence.absorb(n, &report)?;
        if !report.is_valid {
            return Err(ConstructError::DeadEnd(format!(
                "completion for n={} left {} permutations missing",
                n, report.missing
            )));
        }
        self.record_best(n, &sequence, config, &[], "base_case")?;
        Ok(sequence)
    }

    /// Strategy loop for orders above the base case.
    fn construct(&mut self, n: usize, config: &ConstructConfig) -> Result<(String, usize, Strategy)> {
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(n as u64));
        let mut state = ConstructionState::Selecting;
        let mut iterations = 0;
        let mut last_strategy = Strategy::NMinus1Shell;
        loop {
            debug!("n={} iteration {}: {}", n, iterations, state.name());
            state = match state {
                ConstructionState::Selecting => {
                    if iterations >= config.max_iterations {
                        ConstructionState::Failed(format!(
                            "no valid sequence for n={} after {} iterations",
                            n, iterations
                        ))
                    } else {
                        iterations += 1;
                        let (density, connectivity) = self.laminate_shape(n);
                        ConstructionState::Generating(select_strategy(
                            &config.strategy_weights,
                            density,
                            connectivity,
                            &mut rng,
                        ))
                    }
                }
                ConstructionState::Generating(strategy) => {
                    last_strategy = strategy;
                    match self.hypothesize(strategy, n, config, &mut rng) {
                        Ok(hypothesis) => ConstructionState::Validating(hypothesis),
                        Err(err) if err.is_recoverable() => {
                            debug!("{} failed for n={}: {}", strategy, n, err);
                            ConstructionState::Selecting
                        }
                        Err(err) => return Err(err),
                    }
                }
                ConstructionState::Validating(hypothesis) => {
                    let report = self.validate(&hypothesis.sequence, n, config)?;
                    debug!("validation for n={}: {:?}", n, report.summary());
                    ConstructionState::Updating { hypothesis, report }
                }
                ConstructionState::Updating { hypothesis, report } => {
                    self.evidence.absorb(n, &report)?;
                    for &id in &hypothesis.used_prodigals {
                        self.prodigals.record_usage(id);
                    }
                    if report.is_valid {
                        let improves = self
                            .best
                            .get(&n)
                            .map_or(true, |best| hypothesis.sequence.len() < best.len());
                        if improves {
                            self.record_best(
                                n,
                                &hypothesis.sequence,
                                config,
                                &hypothesis.used_prodigals,
                                hypothesis.strategy.name(),
                            )?;
                        }
                        ConstructionState::Completed(hypothesis.sequence)
                    } else {
                        debug!(
                            "discarded {} hypothesis for n={} ({} missing)",
                            hypothesis.strategy, n, report.missing
                        );
                        ConstructionState::Selecting
                    }
                }
                ConstructionState::Completed(sequence) => {
                    return Ok((sequence, iterations, last_strategy));
                }
                ConstructionState::Failed(reason) => {
                    warn!("{}", reason);
                    return Err(ConstructError::BudgetExhausted(reason));
                }
            };
        }
    }

    fn hypothesize(
        &self,
        strategy: Strategy,
        n: usize,
        config: &ConstructConfig,
        rng: &mut StdRng,
    ) -> Result<Hypothesis> {
        let evidence = self.evidence.evidence(n, config.loser_threshold);
        let formulas: &dyn FormulaLibrary = self.formulas.as_ref();
        let generator = EvidenceGuidedGenerator::new(
            evidence,
            &self.prodigals,
            SCORING_PRODIGALS,
            &config.scoring_weights,
            formulas,
        );
        let ctx = StrategyContext {
            order: n,
            config,
            evidence,
            generator: &generator,
            prodigals: &self.prodigals,
            formulas,
            table: &self.evidence.table,
            previous_best: self.best(n - 1),
            best: self.best(n),
            bound: self.bound(n),
        };
        generate_hypothesis(strategy, &ctx, rng)
    }

    /// Mean density and connectivity of the order's constraint laminates.
    ///
    /// Connectivity is only measured on laminates small enough for the
    /// pairwise flow computation; larger ones count as 0.
    fn laminate_shape(&self, n: usize) -> (f64, f64) {
        let laminates = self.evidence.constraint_laminates(n);
        if laminates.is_empty() {
            return (0.0, 0.0);
        }
        let count = laminates.len() as f64;
        let mean_density = laminates.iter().map(density).sum::<f64>() / count;
        let mean_connectivity = laminates
            .iter()
            .map(|l| {
                if l.node_count() <= CONNECTIVITY_NODE_LIMIT {
                    connectivity(l)
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            / count;
        (mean_density, mean_connectivity)
    }

    /// Store a new best, harvest its prodigals and rebuild the order's
    /// constraint laminates from it.
    fn record_best(
        &mut self,
        n: usize,
        sequence: &str,
        config: &ConstructConfig,
        parents: &[u64],
        source: &str,
    ) -> Result<()> {
        info!("new best for n={}: length {} ({})", n, sequence.len(), source);
        self.best.insert(n, sequence.to_string());
        self.persistence.save_best(n, sequence)?;

        let criteria = config.prodigal_criteria();
        for found in find_prodigal_results(sequence, n, &criteria) {
            let evidence = self.evidence.evidence(n, config.loser_threshold);
            if let Some(id) = self.prodigals.add(&found, n, source, &evidence, &criteria)? {
                for &parent in parents {
                    if self.prodigals.get(parent).is_some() {
                        self.prodigals.link(parent, id)?;
                    }
                }
            }
        }

        self.album.rescore(n, &self.evidence.validation_context(n));
        let mut laminates = Vec::new();
        for k in [n.checked_sub(1), n.checked_sub(2)].into_iter().flatten() {
            if k < 2 {
                continue;
            }
            let laminate = create_laminate(sequence, n, k)?;
            let context = self.evidence.validation_context(n);
            match self.album.add(laminate, source, &context) {
                Ok(id) => debug!("album accepted laminate {} (n={}, k={})", id, n, k),
                Err(err) => debug!("album rejected laminate for n={} k={}: {}", n, k, err),
            }
            if let Some(merged) =
                self.album
                    .merged(n, k, config.laminates_to_select, config.laminate_merge_method)?
            {
                laminates.push(merged);
            }
        }
        self.evidence.constraint_laminates.insert(n, laminates);
        self.checkpoint(n)
    }

    fn snapshot(&self, n: usize) -> EvidenceSnapshot {
        let k = n.saturating_sub(1);
        let mut limbo: Vec<String> = self
            .evidence
            .limbo
            .iter()
            .filter(|kmer| kmer.len() == k)
            .cloned()
            .collect();
        limbo.sort();
        EvidenceSnapshot {
            order: n,
            best_length: self.best.get(&n).map(String::len),
            winners_losers: self
                .evidence
                .table
                .entries()
                .into_iter()
                .filter(|e| e.order == n)
                .collect(),
            layout: self
                .evidence
                .layout
                .records()
                .into_iter()
                .filter(|r| r.from.order == n)
                .collect(),
            prodigals: self.prodigals.iter().filter(|p| p.n_value == n).cloned().collect(),
            laminates: self
                .album
                .records()
                .into_iter()
                .filter(|r| r.order == n)
                .collect(),
            anti_laminates: self
                .evidence
                .anti_laminates(n)
                .iter()
                .enumerate()
                .map(|(i, l)| l.to_record(i as u64, "anti_prodigals", 0.0))
                .collect(),
            limbo,
        }
    }

    fn checkpoint(&mut self, n: usize) -> Result<()> {
        let snapshot = self.snapshot(n);
        self.persistence.save_evidence(n, &snapshot)
    }

    fn push_outcome(
        &mut self,
        n: usize,
        sequence: &str,
        iterations: usize,
        strategy: Option<Strategy>,
        resumed: bool,
    ) {
        let outcome = OrderOutcome {
            order: n,
            length: sequence.len(),
            bound: self.bound(n),
            iterations,
            strategy,
            resumed,
            predicted_length: self.formulas.predicted_length(n),
            discrepancy: self.formulas.discrepancy(n, sequence.len()),
        };
        info!(
            "n={} done: length {} (predicted {:.0}, {} iterations)",
            n, outcome.length, outcome.predicted_length, outcome.iterations
        );
        self.outcomes.push(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_orders_match_the_known_minimal_lengths() {
        let mut orchestrator = Orchestrator::new(ConfigSet::new());
        let best = orchestrator.run(4).expect("orders 1..=4 build");
        assert_eq!(best.len(), 33);
        assert_eq!(orchestrator.best(3), Some("123121321"));
        let lengths: Vec<usize> = orchestrator.outcomes().iter().map(|o| o.length).collect();
        assert_eq!(lengths, vec![1, 3, 9, 33]);
        assert!(orchestrator.outcomes().iter().all(|o| o.length <= o.bound));
    }

    #[test]
    fn new_bests_rebuild_constraint_laminates() {
        let mut orchestrator = Orchestrator::new(ConfigSet::new());
        orchestrator.run(3).expect("orders 1..=3 build");
        let laminates = orchestrator.evidence().constraint_laminates(3);
        assert_eq!(laminates.len(), 1);
        for window in ["123", "231", "312", "213", "132", "321"] {
            assert!(crate::laminate::is_compatible(window, &laminates[0]));
        }
    }

    #[test]
    fn album_scores_follow_the_current_evidence() {
        let mut orchestrator = Orchestrator::new(ConfigSet::new());
        orchestrator.run(4).expect("orders 1..=4 build");
        assert!(orchestrator.album().list().count() > 0);
        for entry in orchestrator.album().list() {
            let context = orchestrator.evidence().validation_context(entry.laminate.order());
            let fresh = crate::laminate::validate(&entry.laminate, &context).score;
            assert!((entry.score - fresh).abs() < 1e-9, "stale score for {}", entry.id);
        }
    }

    #[test]
    fn invalid_reports_feed_limbo_and_the_anti_laminate() {
        let mut store = EvidenceStore::new();
        let report = ValidationReport {
            is_valid: false,
            length: 12,
            missing: 3,
            delta: WinnerLoserTable::new(),
            anti_prodigals: ["1234".to_string()].into_iter().collect(),
            layout: LayoutMemory::new(),
        };
        store.absorb(5, &report).expect("anti-laminate builds");
        assert!(store.limbo().contains("1234"));
        assert_eq!(store.anti_laminates(5).len(), 1);
        let evidence = store.evidence(5, 20);
        assert!(!evidence.admits("12345"));
        assert!(evidence.admits("21345"));
    }

    #[test]
    fn iteration_cap_is_a_hard_failure() {
        let configs = ConfigSet::from_json_str(r#"{"6": {"max_iterations": 0}}"#).expect("valid overrides");
        let mut orchestrator = Orchestrator::new(configs);
        orchestrator.run(5).expect("base orders build");
        let err = orchestrator.run_order(6).expect_err("no iterations allowed");
        assert!(matches!(err, ConstructError::BudgetExhausted(_)));
    }
}
