//! Bouncing-batch validation over seeded random sequences.
//!
//! These tests verify that:
//! 1. Coverage agrees with a direct scan for every grid shape
//! 2. Weight deltas, layout observations and anti-prodigals do not depend on the grid
//! 3. Reports of a known superpermutation are valid with no missing permutations

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use superperm_rs::permutation::{factorial, missing_permutations};
    use superperm_rs::validator::{BouncingBatch, SequenceValidator};
    use superperm_rs::WinnerLoserTable;

    #[test]
    fn test_grid_shape_does_not_change_the_report() {
        let mut rng = StdRng::seed_from_u64(42);
        let table = WinnerLoserTable::new();
        let single = BouncingBatch::new(vec![1], 0.6, 2.0);
        for _ in 0..60 {
            let n = rng.gen_range(2..=5);
            let len = rng.gen_range(n..=80);
            let sequence: String = (0..len)
                .map(|_| char::from(b'0' + rng.gen_range(1..=n as u8)))
                .collect();
            let dims: Vec<usize> = (0..rng.gen_range(1..=3))
                .map(|_| rng.gen_range(1..=4))
                .collect();
            let batch = BouncingBatch::new(dims, 0.6, 2.0);

            let reference = single.validate(&sequence, n, &table).expect("valid symbols");
            let report = batch.validate(&sequence, n, &table).expect("valid symbols");
            let missing = missing_permutations(&sequence, n).expect("valid order").len();

            assert_eq!(report.missing, missing);
            assert_eq!(report.is_valid, missing == 0);
            assert_eq!(report.delta, reference.delta);
            assert_eq!(report.layout, reference.layout);
            assert_eq!(report.anti_prodigals, reference.anti_prodigals);
        }
    }

    #[test]
    fn test_known_superpermutation_is_valid() {
        let table = WinnerLoserTable::new();
        let batch = BouncingBatch::new(vec![2, 2, 2], 0.6, 2.0);
        let sequence = "123412314231243121342132413214321";
        let report = batch.validate(sequence, 4, &table).expect("valid symbols");
        assert!(report.is_valid);
        assert_eq!(report.length, 33);
        assert_eq!(report.missing, 0);
        assert_eq!(report.summary().missing, 0);
        assert!(factorial(4) <= report.length);
    }
}
