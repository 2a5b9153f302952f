//! superperm_rs: data-driven construction of superpermutations.
//!
//! Small orders are built by evidence-guided greedy completion; larger orders
//! combine five generation strategies with a bouncing-batch validator whose
//! feedback (k-mer weights, layout transitions, laminates and prodigals)
//! steers the next attempt.

pub mod analysis;
pub mod assembler;
pub mod candidate;
pub mod config;
pub mod debruijn;
pub mod error;
pub mod formulas;
pub mod graph;
pub mod kmer_stats;
pub mod laminate;
pub mod layout;
pub mod orchestrator;
pub mod permutation;
pub mod persistence;
pub mod prodigal;
pub mod strategy;
pub mod validator;

pub use analysis::{
    count_imperfect_transitions, extract_segments, permutation_coverage, profile,
    sequence_score, transition_distribution, SequenceProfile,
};
pub use assembler::{complete_from_partial, connect_segments};
pub use candidate::{
    generate_candidates, CandidateGenerator, Evidence, EvidenceGuidedGenerator, ExtensionEnd,
};
pub use config::{ConfigSet, ConstructConfig};
pub use error::{ConstructError, Result};
pub use formulas::{FormulaLibrary, LengthFormula, StandardFormulas};
pub use kmer_stats::{compute_winners_losers, KmerKey, WinnerLoserTable};
pub use laminate::{Laminate, LaminateAlbum, MergeMethod};
pub use layout::LayoutMemory;
pub use orchestrator::{Orchestrator, OrderOutcome};
pub use permutation::{
    calculate_overlap, decode, encode, factorial, is_permutation, missing_permutations,
    PermutationId,
};
pub use persistence::{InMemoryPersistence, JsonDirPersistence, Persistence};
pub use prodigal::{Prodigal, ProdigalStore};
pub use strategy::Strategy;
pub use validator::{BouncingBatch, SequenceValidator, ValidationReport};
