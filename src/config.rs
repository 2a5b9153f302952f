//! Per-order construction parameters.
//!
//! [`ConstructConfig::for_order`] yields the preset for an order; a [`ConfigSet`]
//! loaded from JSON overrides individual fields of those presets per order.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConstructError, Result};
use crate::laminate::MergeMethod;
use crate::permutation::factorial;
use crate::prodigal::ProdigalCriteria;

/// Relative weights of the five generation strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyWeights {
    pub n_minus_1_shell: f64,
    pub prodigal_combination: f64,
    pub de_bruijn: f64,
    pub mutation: f64,
    pub random_constrained: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            n_minus_1_shell: 0.8,
            prodigal_combination: 0.1,
            de_bruijn: 0.05,
            mutation: 0.05,
            random_constrained: 0.0,
        }
    }
}

/// Weights of every term of the candidate and sequence scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Per symbol of overlap gained.
    pub overlap: f64,
    /// Flat bonus for covering a missing permutation.
    pub missing: f64,
    /// Per layout-memory observation of the candidate's transition.
    pub layout: f64,
    /// Flat bonus when the candidate occurs in a stored prodigal.
    pub prodigal: f64,
    pub winner: f64,
    pub loser: f64,
    pub lookahead: f64,
    /// Flat penalty when an anti-laminate forbids the candidate.
    pub anti_laminate: f64,
    pub discrepancy: f64,
    pub symmetry: f64,
    pub connectivity: f64,
    /// Per imperfect transition when scoring whole sequences.
    pub imperfect_transition: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            overlap: 5.0,
            missing: 1000.0,
            layout: 2.0,
            prodigal: 500.0,
            winner: 2.0,
            loser: 2.0,
            lookahead: 0.5,
            anti_laminate: 5000.0,
            discrepancy: 1.0,
            symmetry: 1.0,
            connectivity: 5.0,
            imperfect_transition: 100.0,
        }
    }
}

/// Mutation strategy settings; edit kinds are drawn by weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Fraction of the sequence's occurrences edited, at least one edit.
    pub rate: f64,
    pub max_edits: usize,
    pub swap: f64,
    pub insert: f64,
    pub delete: f64,
    pub reverse: f64,
    /// Accepted for compatibility; drawing it leaves the sequence unchanged.
    pub kmer_swap: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            rate: 0.1,
            max_edits: 10,
            swap: 0.4,
            insert: 0.2,
            delete: 0.2,
            reverse: 0.1,
            kmer_swap: 0.1,
        }
    }
}

/// Everything the orchestrator needs for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructConfig {
    pub seed: u64,
    /// Bouncing-batch grid; the validator runs one cell per grid point.
    pub grid_dimensions: Vec<usize>,
    pub strategy_weights: StrategyWeights,
    pub scoring_weights: ScoringWeights,
    pub mutation: MutationConfig,
    pub prodigal_min_length: usize,
    pub prodigal_overlap_threshold: f64,
    /// Fraction of n−1 below which a sequence's average overlap is penalised.
    pub anti_prodigal_overlap_threshold: f64,
    pub anti_prodigal_threshold: f64,
    pub max_bridge_length: usize,
    /// Window of the De Bruijn strategy; `None` means n−1.
    pub de_bruijn_k: Option<usize>,
    pub laminates_to_select: usize,
    pub laminate_merge_method: MergeMethod,
    /// Candidates containing a k-mer whose loser weight exceeds this are dropped.
    pub loser_threshold: i64,
    /// Completion attempts; `None` means 4·n!.
    pub attempt_limit: Option<usize>,
    pub max_iterations: usize,
    pub path_count: usize,
    pub path_expansion_budget: usize,
    /// Prodigals of order n−1 added to the shell's segment pool.
    pub shell_prodigals: usize,
    /// Normalised Damerau-Levenshtein similarity above which two segments count as duplicates.
    pub segment_similarity: f64,
}

impl Default for ConstructConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            grid_dimensions: vec![2; 6],
            strategy_weights: StrategyWeights::default(),
            scoring_weights: ScoringWeights::default(),
            mutation: MutationConfig::default(),
            prodigal_min_length: 10,
            prodigal_overlap_threshold: 0.98,
            anti_prodigal_overlap_threshold: 0.6,
            anti_prodigal_threshold: 2.0,
            max_bridge_length: 100,
            de_bruijn_k: None,
            laminates_to_select: 5,
            laminate_merge_method: MergeMethod::Intersection,
            loser_threshold: 20,
            attempt_limit: None,
            max_iterations: 50,
            path_count: 10,
            path_expansion_budget: 200_000,
            shell_prodigals: 5,
            segment_similarity: 0.9,
        }
    }
}

impl ConstructConfig {
    /// Preset for order `n`.
    pub fn for_order(n: usize) -> Self {
        let mut config = Self {
            grid_dimensions: vec![2; n.max(1)],
            ..Self::default()
        };
        match n {
            0..=5 => {
                config.prodigal_min_length = n.max(2);
            }
            6 => {
                config.de_bruijn_k = Some(5);
            }
            7 => {
                config.prodigal_min_length = 20;
                config.scoring_weights.layout = 3.0;
                config.scoring_weights.prodigal = 750.0;
                config.max_bridge_length = 150;
                config.de_bruijn_k = Some(6);
            }
            _ => {
                config.prodigal_min_length = 50;
                config.anti_prodigal_threshold = 1.5;
                config.scoring_weights.layout = 5.0;
                config.scoring_weights.lookahead = 2.0;
                config.mutation = MutationConfig {
                    rate: 0.2,
                    swap: 0.3,
                    insert: 0.2,
                    delete: 0.2,
                    reverse: 0.15,
                    kmer_swap: 0.15,
                    ..MutationConfig::default()
                };
                config.max_bridge_length = 250;
                config.de_bruijn_k = Some(7);
                config.laminates_to_select = 10;
            }
        }
        config
    }

    pub fn attempt_limit_for(&self, n: usize) -> usize {
        self.attempt_limit.unwrap_or_else(|| factorial(n).saturating_mul(4))
    }

    pub fn de_bruijn_k_for(&self, n: usize) -> usize {
        self.de_bruijn_k
            .unwrap_or(n.saturating_sub(1))
            .clamp(2.min(n), n)
    }

    pub fn prodigal_criteria(&self) -> ProdigalCriteria {
        ProdigalCriteria {
            min_length: self.prodigal_min_length,
            overlap_threshold: self.prodigal_overlap_threshold,
        }
    }

    pub fn grid_cells(&self) -> usize {
        self.grid_dimensions
            .iter()
            .copied()
            .map(|d| d.max(1))
            .product::<usize>()
            .max(1)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Per-order overrides layered over the presets.
///
/// The JSON form maps an order to a partial [`ConstructConfig`] object:
/// `{"6": {"seed": 7, "scoring_weights": {"layout": 4.0}}}`. A `"*"` entry
/// applies to every order before the order's own entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSet {
    overrides: BTreeMap<String, Value>,
}

impl ConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let overrides: BTreeMap<String, Value> = serde_json::from_str(text)?;
        for (key, value) in &overrides {
            if key != "*" && key.parse::<usize>().is_err() {
                return Err(ConstructError::InvalidInput(format!(
                    "config key '{}' is neither an order nor '*'",
                    key
                )));
            }
            if !value.is_object() {
                return Err(ConstructError::InvalidInput(format!(
                    "config entry '{}' must be an object",
                    key
                )));
            }
        }
        let set = Self { overrides };
        for key in set.overrides.keys() {
            if let Ok(order) = key.parse::<usize>() {
                set.for_order(order)?;
            }
        }
        Ok(set)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Set one override for every order.
    pub fn set_global(&mut self, field: &str, value: Value) {
        let entry = self
            .overrides
            .entry("*".to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = entry {
            map.insert(field.to_string(), value);
        }
    }

    /// Preset for `n` with the global then the per-order overrides applied.
    pub fn for_order(&self, n: usize) -> Result<ConstructConfig> {
        let mut value = serde_json::to_value(ConstructConfig::for_order(n))?;
        for key in ["*".to_string(), n.to_string()] {
            if let Some(patch) = self.overrides.get(&key) {
                merge_json(&mut value, patch);
            }
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_follow_order() {
        let six = ConstructConfig::for_order(6);
        assert_eq!(six.prodigal_min_length, 10);
        assert_eq!(six.grid_cells(), 64);
        assert_eq!(six.de_bruijn_k_for(6), 5);
        assert_eq!(six.loser_threshold, 20);
        assert_eq!(six.attempt_limit_for(6), 2880);

        let eight = ConstructConfig::for_order(8);
        assert_eq!(eight.prodigal_min_length, 50);
        assert_eq!(eight.anti_prodigal_threshold, 1.5);
        assert_eq!(eight.laminates_to_select, 10);

        let three = ConstructConfig::for_order(3);
        assert_eq!(three.de_bruijn_k_for(3), 2);
    }

    #[test]
    fn de_bruijn_window_is_clamped_to_the_order() {
        for (configured, expected) in [(0, 2), (1, 2), (4, 4), (9, 6)] {
            let config = ConstructConfig {
                de_bruijn_k: Some(configured),
                ..ConstructConfig::for_order(6)
            };
            assert_eq!(config.de_bruijn_k_for(6), expected, "configured {}", configured);
        }
    }

    #[test]
    fn overrides_layer_over_presets() {
        let set = ConfigSet::from_json_str(
            r#"{"*": {"seed": 7}, "7": {"scoring_weights": {"layout": 9.0}, "max_iterations": 3}}"#,
        )
        .expect("valid overrides");
        let seven = set.for_order(7).expect("config");
        assert_eq!(seven.seed, 7);
        assert_eq!(seven.scoring_weights.layout, 9.0);
        assert_eq!(seven.scoring_weights.prodigal, 750.0);
        assert_eq!(seven.max_iterations, 3);
        assert_eq!(seven.prodigal_min_length, 20);

        let six = set.for_order(6).expect("config");
        assert_eq!(six.seed, 7);
        assert_eq!(six.scoring_weights.layout, 2.0);
    }

    #[test]
    fn bad_overrides_are_rejected() {
        assert!(ConfigSet::from_json_str(r#"{"six": {}}"#).is_err());
        assert!(ConfigSet::from_json_str(r#"{"6": 3}"#).is_err());
        assert!(ConfigSet::from_json_str(r#"{"6": {"seed": "x"}}"#).is_err());
    }

    #[test]
    fn merge_method_round_trips_through_json() {
        let mut set = ConfigSet::new();
        set.set_global("laminate_merge_method", Value::String("union".into()));
        let config = set.for_order(6).expect("config");
        assert_eq!(config.laminate_merge_method, MergeMethod::Union);
    }
}
