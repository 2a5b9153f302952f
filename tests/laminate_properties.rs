//! Property tests for constraint graphs over seeded random inputs.
//!
//! These tests verify that:
//! 1. Anti-laminates stay acyclic and never strongly connected
//! 2. A laminate accepts every permutation window of its source sequence
//! 3. Intersection with itself and union with an empty laminate are identities

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use superperm_rs::graph::{has_cycle, is_strongly_connected};
    use superperm_rs::laminate::{
        create_anti_laminate, create_laminate, is_compatible, merge, Laminate, LaminateKind,
        MergeMethod,
    };
    use superperm_rs::permutation::{partial_permutations, permutation_occurrences};

    fn random_sequence(rng: &mut StdRng, n: usize, len: usize) -> String {
        (0..len)
            .map(|_| char::from(b'0' + rng.gen_range(1..=n as u8)))
            .collect()
    }

    #[test]
    fn test_anti_laminates_are_acyclic() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let n = rng.gen_range(3..=5);
            let k = rng.gen_range(2..=n);
            let pool = partial_permutations(n, k);
            let count = rng.gen_range(1..=pool.len());
            let chosen: Vec<&String> = pool.choose_multiple(&mut rng, count).collect();

            let anti = create_anti_laminate(&chosen, n, k).expect("valid window");
            assert!(!has_cycle(anti.graph()), "cycle for n={} k={}", n, k);
            assert!(!is_strongly_connected(anti.graph()));
        }
    }

    #[test]
    fn test_laminate_accepts_its_own_windows() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let n = rng.gen_range(3..=5);
            let k = rng.gen_range(2..=n);
            let sequence = random_sequence(&mut rng, n, 60);
            let laminate = create_laminate(&sequence, n, k).expect("valid sequence");
            for start in permutation_occurrences(&sequence, n) {
                let window = &sequence[start..start + n];
                assert!(is_compatible(window, &laminate), "{} rejected", window);
            }
        }
    }

    #[test]
    fn test_merge_identities() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let n = rng.gen_range(3..=5);
            let sequence = random_sequence(&mut rng, n, 40);
            let laminate = create_laminate(&sequence, n, n - 1).expect("valid sequence");

            let same = merge(&[&laminate, &laminate], MergeMethod::Intersection).expect("supported");
            assert_eq!(same.graph().edge_set(), laminate.graph().edge_set());

            let empty = Laminate::new(n, n - 1, LaminateKind::Positive);
            let union = merge(&[&laminate, &empty], MergeMethod::Union).expect("supported");
            assert_eq!(union.graph().edge_set(), laminate.graph().edge_set());

            assert!(merge(&[&laminate], MergeMethod::WeightedAverage).is_err());
        }
    }
}
