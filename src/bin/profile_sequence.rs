//! Profile a candidate superpermutation: coverage, transition statistics,
//! perfect segments, the graph of its (n−1)-mers and the distance from the
//! predicted minimal length.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use superperm_rs::analysis::profile;
use superperm_rs::formulas::{LengthFormula, StandardFormulas};
use superperm_rs::permutation::normalize_sequence;

#[derive(Parser, Debug)]
#[command(name = "profile_sequence")]
#[command(about = "Print a JSON profile of a superpermutation candidate")]
struct Args {
    /// File holding the sequence (whitespace is ignored)
    input: PathBuf,

    /// Order of the permutations; inferred from the largest symbol when omitted
    #[arg(long, short)]
    n: Option<usize>,

    /// Length prediction used for the discrepancy: additive, golden-ratio or lower-bound
    #[arg(long, default_value = "additive")]
    formula: String,

    /// Rotate to the lexicographically smallest rotation before profiling
    #[arg(long)]
    normalize: bool,
}

fn parse_formula(name: &str) -> Result<LengthFormula> {
    match name {
        "additive" => Ok(LengthFormula::Additive),
        "golden-ratio" => Ok(LengthFormula::GoldenRatio),
        "lower-bound" => Ok(LengthFormula::LowerBound),
        other => bail!("Unknown length formula '{}'", other),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let mut sequence: String = text.split_whitespace().collect();
    if args.normalize {
        sequence = normalize_sequence(&sequence);
    }
    let n = match args.n {
        Some(n) => n,
        None => sequence
            .bytes()
            .filter(u8::is_ascii_digit)
            .max()
            .map(|b| usize::from(b - b'0'))
            .context("Input holds no symbols")?,
    };

    let formulas = StandardFormulas::new(parse_formula(&args.formula)?);
    let report = profile(&sequence, n, &formulas)
        .with_context(|| format!("Cannot profile {} as an order-{} sequence", args.input.display(), n))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
