//! Permutation universe: enumeration, Lehmer-rank encoding and window helpers.
//!
//! Symbols are the ASCII digits `1..=n`, so every byte offset into a sequence is
//! also a valid `str` boundary.

use std::collections::HashSet;

use crate::error::{ConstructError, Result};

/// Largest order representable with single-digit symbols.
pub const MAX_ORDER: usize = 9;

/// Lexicographic rank of a permutation within `0..n!`.
pub type PermutationId = u32;

const FACTORIALS: [u64; MAX_ORDER + 1] = [1, 1, 2, 6, 24, 120, 720, 5040, 40320, 362880];

/// `n!` for the supported orders.
pub fn factorial(n: usize) -> usize {
    FACTORIALS.get(n).copied().unwrap_or_else(|| {
        (1..=n as u64).product::<u64>()
    }) as usize
}

/// Reject orders that cannot be expressed with the digit alphabet.
pub fn validate_order(n: usize) -> Result<()> {
    if n == 0 || n > MAX_ORDER {
        return Err(ConstructError::OrderOutOfRange(n));
    }
    Ok(())
}

/// Check that every symbol of `sequence` lies in `1..=n`.
pub fn validate_sequence(sequence: &str, n: usize) -> Result<()> {
    validate_order(n)?;
    let upper = b'0' + n as u8;
    if let Some(bad) = sequence.bytes().find(|&b| !(b'1'..=upper).contains(&b)) {
        return Err(ConstructError::InvalidInput(format!(
            "symbol '{}' outside 1..={} in sequence",
            bad as char, n
        )));
    }
    Ok(())
}

pub(crate) fn is_permutation_bytes(window: &[u8], n: usize) -> bool {
    if n == 0 || n > MAX_ORDER || window.len() != n {
        return false;
    }
    let upper = b'0' + n as u8;
    let mut seen = 0u16;
    for &b in window {
        if !(b'1'..=upper).contains(&b) {
            return false;
        }
        let bit = 1u16 << (b - b'1');
        if seen & bit != 0 {
            return false;
        }
        seen |= bit;
    }
    true
}

/// True iff `window` has length `n` and contains each of `1..=n` exactly once.
pub fn is_permutation(window: &str, n: usize) -> bool {
    is_permutation_bytes(window.as_bytes(), n)
}

/// Rank of a window already known to be a permutation.
pub(crate) fn rank_bytes(window: &[u8]) -> PermutationId {
    let n = window.len();
    let mut used = 0u16;
    let mut rank = 0u64;
    for (i, &b) in window.iter().enumerate() {
        let digit = (b - b'1') as u16;
        let smaller_unused = (!used & ((1u16 << digit) - 1)).count_ones() as u64;
        rank += smaller_unused * FACTORIALS[n - 1 - i];
        used |= 1 << digit;
    }
    rank as PermutationId
}

/// Encode a permutation as its lexicographic rank.
pub fn encode(perm: &str) -> Result<PermutationId> {
    let n = perm.len();
    if n == 0 || n > MAX_ORDER || !is_permutation(perm, n) {
        return Err(ConstructError::InvalidInput(format!(
            "'{}' is not a permutation of 1..={}",
            perm, n
        )));
    }
    Ok(rank_bytes(perm.as_bytes()))
}

/// Decode a lexicographic rank back into its permutation string.
pub fn decode(id: PermutationId, n: usize) -> Result<String> {
    validate_order(n)?;
    if u64::from(id) >= FACTORIALS[n] {
        return Err(ConstructError::InvalidId {
            id: u64::from(id),
            order: n,
        });
    }
    let mut remaining = u64::from(id);
    let mut available: Vec<u8> = (1..=n as u8).map(|d| b'0' + d).collect();
    let mut out = String::with_capacity(n);
    for i in 0..n {
        let place = FACTORIALS[n - 1 - i];
        let idx = (remaining / place) as usize;
        remaining %= place;
        out.push(available.remove(idx) as char);
    }
    Ok(out)
}

/// Lazy lexicographic iterator over all permutations of one order.
#[derive(Debug, Clone)]
pub struct Permutations {
    order: usize,
    next: u64,
    total: u64,
}

impl Iterator for Permutations {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next >= self.total {
            return None;
        }
        let perm = decode(self.next as PermutationId, self.order).ok()?;
        self.next += 1;
        Some(perm)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Permutations {}

/// All `n!` permutations in lexicographic order.
pub fn enumerate(n: usize) -> Result<Permutations> {
    validate_order(n)?;
    Ok(Permutations {
        order: n,
        next: 0,
        total: FACTORIALS[n],
    })
}

fn symbol_mask(part: &str, n: usize) -> Option<u16> {
    let upper = b'0' + n as u8;
    let mut mask = 0u16;
    for b in part.bytes() {
        if !(b'1'..=upper).contains(&b) {
            return None;
        }
        let bit = 1u16 << (b - b'1');
        if mask & bit != 0 {
            return None;
        }
        mask |= bit;
    }
    Some(mask)
}

fn arrange(n: usize, len: usize, used: u16, current: &mut String, out: &mut Vec<String>) {
    if current.len() == len {
        out.push(current.clone());
        return;
    }
    for d in 1..=n {
        let bit = 1u16 << (d - 1);
        if used & bit != 0 {
            continue;
        }
        current.push((b'0' + d as u8) as char);
        arrange(n, len, used | bit, current, out);
        current.pop();
    }
}

/// True iff `part` uses distinct symbols from `1..=n`.
pub fn is_partial_permutation(part: &str, n: usize) -> bool {
    n <= MAX_ORDER && part.len() <= n && symbol_mask(part, n).is_some()
}

/// Every string of `len` distinct symbols drawn from `1..=n`, in lexicographic order.
pub fn partial_permutations(n: usize, len: usize) -> Vec<String> {
    let mut out = Vec::new();
    if n > MAX_ORDER || len > n {
        return out;
    }
    arrange(n, len, 0, &mut String::with_capacity(len), &mut out);
    out
}

/// Permutations of order `n` that start with `prefix` (empty when `prefix` repeats a symbol).
pub fn permutations_with_prefix(prefix: &str, n: usize) -> Vec<String> {
    let Some(used) = symbol_mask(prefix, n) else {
        return Vec::new();
    };
    if prefix.len() > n {
        return Vec::new();
    }
    let mut tails = Vec::new();
    arrange(n, n - prefix.len(), used, &mut String::new(), &mut tails);
    tails.into_iter().map(|tail| format!("{}{}", prefix, tail)).collect()
}

/// Permutations of order `n` that end with `suffix`.
pub fn permutations_with_suffix(suffix: &str, n: usize) -> Vec<String> {
    let Some(used) = symbol_mask(suffix, n) else {
        return Vec::new();
    };
    if suffix.len() > n {
        return Vec::new();
    }
    let mut heads = Vec::new();
    arrange(n, n - suffix.len(), used, &mut String::new(), &mut heads);
    heads.into_iter().map(|head| head + suffix).collect()
}

/// Largest `k` such that the last `k` symbols of `a` equal the first `k` of `b`.
pub fn calculate_overlap(a: &str, b: &str) -> usize {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let max = a.len().min(b.len());
    (1..=max)
        .rev()
        .find(|&k| a[a.len() - k..] == b[..k])
        .unwrap_or(0)
}

/// Append `next` to `sequence` after its maximal overlap; returns the overlap used.
pub fn append_with_overlap(sequence: &mut String, next: &str) -> usize {
    let overlap = calculate_overlap(sequence, next);
    sequence.push_str(&next[overlap..]);
    overlap
}

/// Start positions of every window of length `n` that is a permutation.
pub fn permutation_occurrences(sequence: &str, n: usize) -> Vec<usize> {
    if n == 0 || sequence.len() < n {
        return Vec::new();
    }
    sequence
        .as_bytes()
        .windows(n)
        .enumerate()
        .filter(|(_, w)| is_permutation_bytes(w, n))
        .map(|(i, _)| i)
        .collect()
}

/// Positional overlaps `n - gap` (clamped at zero) between consecutive occurrences.
pub fn occurrence_overlaps(positions: &[usize], n: usize) -> Vec<usize> {
    positions
        .windows(2)
        .map(|pair| n.saturating_sub(pair[1] - pair[0]))
        .collect()
}

/// Ids of the permutations present as windows of `sequence`.
pub fn covered_permutations(sequence: &str, n: usize) -> Result<HashSet<PermutationId>> {
    validate_order(n)?;
    let bytes = sequence.as_bytes();
    Ok(permutation_occurrences(sequence, n)
        .into_iter()
        .map(|i| rank_bytes(&bytes[i..i + n]))
        .collect())
}

/// Ids of the permutations not yet present as windows of `sequence`.
pub fn missing_permutations(sequence: &str, n: usize) -> Result<HashSet<PermutationId>> {
    let covered = covered_permutations(sequence, n)?;
    Ok((0..factorial(n) as PermutationId)
        .filter(|id| !covered.contains(id))
        .collect())
}

/// Remove from `missing` every permutation whose window starts at or after `from`.
pub fn mark_covered_from(sequence: &str, n: usize, from: usize, missing: &mut HashSet<PermutationId>) {
    let bytes = sequence.as_bytes();
    if n == 0 || bytes.len() < n {
        return;
    }
    for start in from..=bytes.len() - n {
        let window = &bytes[start..start + n];
        if is_permutation_bytes(window, n) {
            missing.remove(&rank_bytes(window));
        }
    }
}

/// Every length-`k` window of `sequence` in order.
pub fn kmers(sequence: &str, k: usize) -> impl Iterator<Item = &str> {
    let len = sequence.len();
    let count = if k == 0 || k > len { 0 } else { len - k + 1 };
    (0..count).map(move |i| &sequence[i..i + k])
}

/// Rotate a sequence so it starts at its smallest rotation beginning with the smallest symbol.
pub fn normalize_sequence(sequence: &str) -> String {
    let Some(min_symbol) = sequence.bytes().min() else {
        return String::new();
    };
    sequence
        .bytes()
        .enumerate()
        .filter(|&(_, b)| b == min_symbol)
        .map(|(i, _)| format!("{}{}", &sequence[i..], &sequence[..i]))
        .min()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_decode_round_trip_for_small_orders() {
        for n in 1..=7 {
            let total = factorial(n) as PermutationId;
            for id in 0..total {
                let perm = decode(id, n).expect("id in range");
                assert!(is_permutation(&perm, n));
                assert_eq!(encode(&perm).expect("valid permutation"), id);
            }
        }
    }

    #[test]
    fn enumeration_is_lexicographic_and_stable() {
        let first: Vec<String> = enumerate(3).expect("order 3").collect();
        let second: Vec<String> = enumerate(3).expect("order 3").collect();
        assert_eq!(first, vec!["123", "132", "213", "231", "312", "321"]);
        assert_eq!(first, second);
        assert_eq!(enumerate(5).expect("order 5").len(), 120);
    }

    #[test]
    fn decode_rejects_out_of_range_ids() {
        assert!(matches!(
            decode(6, 3),
            Err(ConstructError::InvalidId { id: 6, order: 3 })
        ));
        assert!(matches!(decode(0, 0), Err(ConstructError::OrderOutOfRange(0))));
        assert!(matches!(decode(0, 10), Err(ConstructError::OrderOutOfRange(10))));
    }

    #[test]
    fn encode_rejects_duplicates_and_foreign_symbols() {
        assert!(matches!(encode("112"), Err(ConstructError::InvalidInput(_))));
        assert!(matches!(encode("124"), Err(ConstructError::InvalidInput(_))));
        assert!(matches!(encode(""), Err(ConstructError::InvalidInput(_))));
    }

    #[test]
    fn is_permutation_checks_length_and_multiset() {
        assert!(is_permutation("2413", 4));
        assert!(!is_permutation("2413", 5));
        assert!(!is_permutation("2213", 4));
        assert!(!is_permutation("2403", 4));
        assert!(!is_permutation("241", 4));
    }

    #[test]
    fn overlap_bounds_and_splicing() {
        assert_eq!(calculate_overlap("12312", "12321"), 3);
        assert_eq!(calculate_overlap("123", "123"), 3);
        assert_eq!(calculate_overlap("123", "456"), 0);
        assert_eq!(calculate_overlap("", "12"), 0);

        let mut combined = String::from("1231");
        let overlap = append_with_overlap(&mut combined, "3121");
        assert_eq!(overlap, 2);
        assert_eq!(combined, "123121");
        assert!(combined.ends_with("3121"));
    }

    #[test]
    fn occurrences_and_missing_sets() {
        let sp = "123121321";
        assert_eq!(permutation_occurrences(sp, 3), vec![0, 1, 2, 4, 5, 6]);
        assert_eq!(occurrence_overlaps(&[0, 1, 2, 4, 5, 6], 3), vec![2, 2, 1, 2, 2]);
        assert!(missing_permutations(sp, 3).expect("order 3").is_empty());
        let missing = missing_permutations("1231", 3).expect("order 3");
        assert_eq!(missing.len(), 4);
        assert!(!missing.contains(&encode("231").expect("valid")));
    }

    #[test]
    fn mark_covered_only_scans_new_windows() {
        let mut missing = missing_permutations("123", 3).expect("order 3");
        mark_covered_from("1231", 3, 1, &mut missing);
        assert!(!missing.contains(&encode("231").expect("valid")));
        assert_eq!(missing.len(), 4);
    }

    #[test]
    fn normalize_picks_smallest_rotation_from_min_symbol() {
        assert_eq!(normalize_sequence("3121"), "1213");
        assert_eq!(normalize_sequence(""), "");
    }

    #[test]
    fn kmers_skip_when_window_too_long() {
        let windows: Vec<&str> = kmers("1234", 2).collect();
        assert_eq!(windows, vec!["12", "23", "34"]);
        assert_eq!(kmers("12", 3).count(), 0);
        assert_eq!(kmers("12", 0).count(), 0);
    }

    #[test]
    fn partial_permutations_and_affix_completions() {
        assert_eq!(partial_permutations(3, 2), vec!["12", "13", "21", "23", "31", "32"]);
        assert_eq!(partial_permutations(2, 3).len(), 0);
        assert_eq!(permutations_with_prefix("31", 4), vec!["3124", "3142"]);
        assert_eq!(permutations_with_suffix("31", 4), vec!["2431", "4231"]);
        assert!(permutations_with_prefix("33", 4).is_empty());
        assert_eq!(permutations_with_prefix("", 3).len(), 6);
    }

    #[test]
    fn validate_sequence_rejects_out_of_alphabet_symbols() {
        assert!(validate_sequence("1231", 3).is_ok());
        assert!(matches!(
            validate_sequence("1241", 3),
            Err(ConstructError::InvalidInput(_))
        ));
    }
}
