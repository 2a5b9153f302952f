//! Checkpoint storage for best sequences and accumulated evidence.
//!
//! The orchestrator saves after every new best and after each completed order.
//! Storage layout is private to each implementation.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kmer_stats::WeightEntry;
use crate::laminate::LaminateRecord;
use crate::layout::LayoutRecord;
use crate::prodigal::Prodigal;

/// Everything the orchestrator accumulated for one order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceSnapshot {
    pub order: usize,
    pub best_length: Option<usize>,
    pub winners_losers: Vec<WeightEntry>,
    pub layout: Vec<LayoutRecord>,
    pub prodigals: Vec<Prodigal>,
    pub laminates: Vec<LaminateRecord>,
    pub anti_laminates: Vec<LaminateRecord>,
    pub limbo: Vec<String>,
}

pub trait Persistence {
    fn save_best(&mut self, n: usize, sequence: &str) -> Result<()>;
    fn load_best(&self, n: usize) -> Result<Option<String>>;
    fn save_evidence(&mut self, n: usize, snapshot: &EvidenceSnapshot) -> Result<()>;
    fn load_evidence(&self, n: usize) -> Result<Option<EvidenceSnapshot>>;
}

/// Keeps checkpoints for the lifetime of the process only.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    best: BTreeMap<usize, String>,
    evidence: BTreeMap<usize, EvidenceSnapshot>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_best(&mut self, n: usize, sequence: &str) -> Result<()> {
        self.best.insert(n, sequence.to_string());
        Ok(())
    }

    fn load_best(&self, n: usize) -> Result<Option<String>> {
        Ok(self.best.get(&n).cloned())
    }

    fn save_evidence(&mut self, n: usize, snapshot: &EvidenceSnapshot) -> Result<()> {
        self.evidence.insert(n, snapshot.clone());
        Ok(())
    }

    fn load_evidence(&self, n: usize) -> Result<Option<EvidenceSnapshot>> {
        Ok(self.evidence.get(&n).cloned())
    }
}

/// One directory holding `best_superpermutation_n{n}.txt` and pretty-printed
/// `evidence_n{n}.json` per order.
#[derive(Debug, Clone)]
pub struct JsonDirPersistence {
    root: PathBuf,
}

impl JsonDirPersistence {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn best_path(&self, n: usize) -> PathBuf {
        self.root.join(format!("best_superpermutation_n{}.txt", n))
    }

    pub fn evidence_path(&self, n: usize) -> PathBuf {
        self.root.join(format!("evidence_n{}.json", n))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl Persistence for JsonDirPersistence {
    fn save_best(&mut self, n: usize, sequence: &str) -> Result<()> {
        fs::write(self.best_path(n), sequence)?;
        Ok(())
    }

    fn load_best(&self, n: usize) -> Result<Option<String>> {
        Ok(read_optional(&self.best_path(n))?.map(|text| text.trim().to_string()))
    }

    fn save_evidence(&mut self, n: usize, snapshot: &EvidenceSnapshot) -> Result<()> {
        let text = serde_json::to_string_pretty(snapshot)?;
        fs::write(self.evidence_path(n), text)?;
        Ok(())
    }

    fn load_evidence(&self, n: usize) -> Result<Option<EvidenceSnapshot>> {
        match read_optional(&self.evidence_path(n))? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }
}
