//! End-to-end construction tests.
//!
//! These tests verify that:
//! 1. Orders 1..=5 reach the known minimal lengths by greedy completion
//! 2. Order 6 built from the lifted order-5 shell stays within the additive bound
//! 3. A run resumes from a state directory without rebuilding finished orders
//! 4. Malformed corpora and targets are rejected up front

#[cfg(test)]
mod tests {
    use serde_json::json;
    use superperm_rs::permutation::missing_permutations;
    use superperm_rs::persistence::JsonDirPersistence;
    use superperm_rs::{ConfigSet, ConstructError, Orchestrator, Strategy};

    #[test]
    fn test_base_orders_reach_known_lengths() {
        let mut orchestrator = Orchestrator::new(ConfigSet::new());
        let best = orchestrator.run(5).expect("orders 1..=5 build");
        assert_eq!(best.len(), 153);

        let lengths: Vec<usize> = orchestrator.outcomes().iter().map(|o| o.length).collect();
        assert_eq!(lengths, vec![1, 3, 9, 33, 153]);
        for n in 1..=5 {
            let sequence = orchestrator.best(n).expect("every order recorded");
            assert!(missing_permutations(sequence, n).expect("valid order").is_empty());
        }
        assert!(orchestrator.outcomes().iter().all(|o| o.discrepancy == 0.0));
    }

    #[test]
    fn test_order_six_shell_meets_additive_bound() {
        let mut configs = ConfigSet::new();
        configs.set_global(
            "strategy_weights",
            json!({
                "n_minus_1_shell": 1.0,
                "prodigal_combination": 0.0,
                "de_bruijn": 0.0,
                "mutation": 0.0,
                "random_constrained": 0.0
            }),
        );
        let mut orchestrator = Orchestrator::new(configs);
        let best = orchestrator.run(6).expect("order 6 builds");

        assert!(best.len() <= 153 + 720);
        assert!(missing_permutations(&best, 6).expect("valid order").is_empty());
        let outcome = orchestrator.outcomes().last().expect("order 6 outcome");
        assert_eq!(outcome.order, 6);
        assert_eq!(outcome.strategy, Some(Strategy::NMinus1Shell));
        assert!(outcome.iterations >= 1);
    }

    #[test]
    fn test_resume_from_state_directory() {
        let dir = tempfile::tempdir().expect("tmpdir");

        let first = JsonDirPersistence::new(dir.path()).expect("state dir");
        let mut orchestrator = Orchestrator::new(ConfigSet::new()).with_persistence(Box::new(first));
        let built = orchestrator.run(4).expect("orders 1..=4 build");
        assert!(orchestrator.outcomes().iter().all(|o| !o.resumed));
        assert!(dir.path().join("evidence_n4.json").exists());

        let second = JsonDirPersistence::new(dir.path()).expect("state dir");
        let mut resumed = Orchestrator::new(ConfigSet::new()).with_persistence(Box::new(second));
        let again = resumed.run(4).expect("orders resume");
        assert_eq!(again, built);
        assert!(resumed.outcomes().iter().all(|o| o.resumed));
        assert!(!resumed.evidence().layout.is_empty());
    }

    #[test]
    fn test_priming_rejects_malformed_sequences() {
        let mut orchestrator = Orchestrator::new(ConfigSet::new());
        let err = orchestrator.prime(&["12a3"]).expect_err("letters are not symbols");
        assert!(!err.is_recoverable());

        let err = orchestrator.run(10).expect_err("order out of range");
        assert!(matches!(err, ConstructError::OrderOutOfRange(10)));
    }

    #[test]
    fn test_priming_with_known_sequences() {
        let mut orchestrator = Orchestrator::new(ConfigSet::new());
        orchestrator
            .prime(&["123121321", "123412314231243121342132413214321"])
            .expect("valid corpus");
        assert!(!orchestrator.evidence().layout.is_empty());
        assert_eq!(orchestrator.evidence().table.weight(4, "123"), 0);
        let best = orchestrator.run(3).expect("orders 1..=3 build");
        assert_eq!(best, "123121321");
    }
}
