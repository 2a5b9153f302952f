//! Completion of partial sequences and splicing of segments.
//!
//! Both operations keep the missing set in step with the sequence: after every
//! append only the windows that start inside the new tail are rescanned.

use std::collections::HashSet;

use log::{debug, trace};

use crate::candidate::{CandidateGenerator, ExtensionEnd};
use crate::error::{ConstructError, Result};
use crate::permutation::{
    append_with_overlap, calculate_overlap, decode, mark_covered_from, PermutationId,
};

/// Highest-scoring candidate; ties keep the lowest id.
fn best_candidate<G>(
    generator: &G,
    sequence: &str,
    missing: &HashSet<PermutationId>,
    end: &ExtensionEnd,
) -> Result<Option<PermutationId>>
where
    G: CandidateGenerator + ?Sized,
{
    let mut best: Option<(f64, PermutationId)> = None;
    for id in generator.generate(sequence, missing, end) {
        let score = generator.score(sequence, id, missing, end)?;
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, id));
        }
    }
    Ok(best.map(|(_, id)| id))
}

/// Append `perm` after its overlap and drop the permutations the new tail covers.
fn append_permutation(
    sequence: &mut String,
    perm: &str,
    n: usize,
    missing: &mut HashSet<PermutationId>,
) -> usize {
    let before = sequence.len();
    let overlap = append_with_overlap(sequence, perm);
    mark_covered_from(sequence, n, before.saturating_sub(n.saturating_sub(1)), missing);
    overlap
}

/// Greedily extend `partial` at its suffix until no permutation is missing.
///
/// Fails with a dead end when no candidate survives the filters, and with an
/// exhausted budget when the attempts run out or the sequence reaches `bound`
/// while permutations are still missing. A successful result is never longer
/// than `bound`. `missing` is updated only on success.
pub fn complete_from_partial<G>(
    partial: &str,
    missing: &mut HashSet<PermutationId>,
    generator: &G,
    bound: usize,
    attempt_limit: usize,
) -> Result<String>
where
    G: CandidateGenerator + ?Sized,
{
    let n = generator.order();
    let mut pending = missing.clone();
    let mut sequence = partial.to_string();
    let mut attempts = 0;
    while !pending.is_empty() {
        if sequence.len() >= bound {
            return Err(ConstructError::BudgetExhausted(format!(
                "length {} reached the bound {} with {} permutations missing",
                sequence.len(),
                bound,
                pending.len()
            )));
        }
        if attempts >= attempt_limit {
            return Err(ConstructError::BudgetExhausted(format!(
                "{} attempts used with {} permutations missing",
                attempts,
                pending.len()
            )));
        }
        attempts += 1;

        let Some(id) = best_candidate(generator, &sequence, &pending, &ExtensionEnd::Suffix)? else {
            debug!(
                "no candidate extends a sequence of length {} ({} missing)",
                sequence.len(),
                pending.len()
            );
            return Err(ConstructError::DeadEnd(format!(
                "no candidate after {} attempts",
                attempts
            )));
        };
        let perm = decode(id, n)?;
        let overlap = append_permutation(&mut sequence, &perm, n, &mut pending);
        trace!("appended {} with overlap {}, {} missing", perm, overlap, pending.len());
    }
    if sequence.len() > bound {
        return Err(ConstructError::BudgetExhausted(format!(
            "complete sequence of length {} exceeds the bound {}",
            sequence.len(),
            bound
        )));
    }
    *missing = pending;
    Ok(sequence)
}

/// Append bridge candidates to `combined` until it overlaps `segment`.
fn bridge<G>(
    combined: &mut String,
    segment: &str,
    missing: &mut HashSet<PermutationId>,
    generator: &G,
    max_steps: usize,
) -> Result<()>
where
    G: CandidateGenerator + ?Sized,
{
    let n = generator.order();
    let end = ExtensionEnd::Bridge {
        next_prefix: segment[..segment.len().min(n.saturating_sub(1))].to_string(),
    };
    for _ in 0..max_steps {
        let Some(id) = best_candidate(generator, combined, missing, &end)? else {
            break;
        };
        let perm = decode(id, n)?;
        append_permutation(combined, &perm, n, missing);
        if calculate_overlap(combined, segment) > 0 {
            return Ok(());
        }
    }
    Err(ConstructError::DeadEnd(format!(
        "cannot bridge into segment starting {}",
        &segment[..segment.len().min(n)]
    )))
}

/// Splice `segments` in order, each after its maximal overlap with the running
/// sequence. A zero overlap is bridged with candidates first; a segment that
/// cannot be reached fails the whole connection.
pub fn connect_segments<G, S>(
    segments: &[S],
    missing: &mut HashSet<PermutationId>,
    generator: &G,
    max_bridge_steps: usize,
) -> Result<String>
where
    G: CandidateGenerator + ?Sized,
    S: AsRef<str>,
{
    let n = generator.order();
    let mut combined = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        if !combined.is_empty() && calculate_overlap(&combined, segment) == 0 {
            bridge(&mut combined, segment, missing, generator, max_bridge_steps)?;
        }
        append_permutation(&mut combined, segment, n, missing);
    }
    Ok(combined)
}
