use log::{debug, info};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use serde_json::json;

use superperm_rs::{ConfigSet, JsonDirPersistence, Orchestrator, OrderOutcome};

/// Build a superpermutation of order N, order by order from 1.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target order (1..=9)
    n: usize,

    /// Random seed applied to every order (default: per-order config)
    #[arg(long)]
    seed: Option<u64>,

    /// JSON file of per-order config overrides ({"6": {...}, "*": {...}})
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for best sequences and evidence checkpoints; enables resume
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Known sequences, one per line (plain text or .gz), used to prime the tables
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Override the per-order iteration cap
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Worker threads for validation (used with the `parallel` feature)
    #[arg(long, default_value_t = num_cpus::get())]
    max_workers: usize,

    /// Write the final sequence here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the JSON run summary here instead of stdout
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Verbose/info output (default: quiet)
    #[arg(long, short = 'v', alias = "info")]
    verbose: bool,

    /// Debug output
    #[arg(long)]
    debug: bool,

    /// Trace output
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    target: usize,
    length: usize,
    outcomes: &'a [OrderOutcome],
}

fn main() {
    let args = Args::parse();
    let log_level = if args.trace {
        "trace"
    } else if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "error"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(error) = run(&args) {
        eprintln!("Construction failed: {error:?}");
        std::process::exit(1);
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn read_corpus(path: &Path) -> Result<Vec<String>> {
    let mut sequences = Vec::new();
    for line in open_reader(path)?.lines() {
        let line = line.with_context(|| format!("Error reading {}", path.display()))?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            sequences.push(trimmed.to_string());
        }
    }
    Ok(sequences)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(path)?;
    writeln!(file, "{text}")?;
    Ok(())
}

fn run(args: &Args) -> Result<String> {
    if !(1..=9).contains(&args.n) {
        bail!("Target order {} is outside 1..=9", args.n);
    }

    #[cfg(feature = "parallel")]
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.max_workers.max(1))
        .build_global()
        .context("Failed to start the validation thread pool")?;
    debug!("validation workers: {}", args.max_workers);

    let mut configs = match &args.config {
        Some(path) => ConfigSet::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ConfigSet::new(),
    };
    if let Some(seed) = args.seed {
        configs.set_global("seed", json!(seed));
    }
    if let Some(cap) = args.max_iterations {
        configs.set_global("max_iterations", json!(cap));
    }

    let mut orchestrator = Orchestrator::new(configs);
    if let Some(dir) = &args.state_dir {
        let persistence = JsonDirPersistence::new(dir)
            .with_context(|| format!("Failed to open state directory {}", dir.display()))?;
        orchestrator = orchestrator.with_persistence(Box::new(persistence));
    }
    if let Some(path) = &args.corpus {
        let corpus = read_corpus(path)?;
        info!("priming from {} corpus sequences", corpus.len());
        orchestrator
            .prime(&corpus)
            .with_context(|| format!("Invalid corpus {}", path.display()))?;
    }

    let sequence = orchestrator
        .run(args.n)
        .with_context(|| format!("No superpermutation of order {}", args.n))?;
    info!("order {} finished with length {}", args.n, sequence.len());

    match &args.output {
        Some(path) => write_text(path, &sequence)?,
        None => println!("{sequence}"),
    }
    let summary = serde_json::to_string_pretty(&RunSummary {
        target: args.n,
        length: sequence.len(),
        outcomes: orchestrator.outcomes(),
    })?;
    match &args.summary_json {
        Some(path) => write_text(path, &summary)?,
        None => println!("{summary}"),
    }
    Ok(sequence)
}

#[cfg(test)]
mod smoke {
    use super::*;

    #[test]
    fn smoke_run() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let corpus = dir.path().join("corpus.txt");
        std::fs::write(&corpus, "123121321\n\n").expect("write corpus");
        let args = Args::parse_from([
            "superperm",
            "3",
            "--corpus",
            corpus.to_str().expect("utf-8 path"),
            "--state-dir",
            dir.path().join("state").to_str().expect("utf-8 path"),
            "--output",
            dir.path().join("best.txt").to_str().expect("utf-8 path"),
            "--summary-json",
            dir.path().join("summary.json").to_str().expect("utf-8 path"),
        ]);
        let sequence = run(&args).expect("order 3 builds");
        assert_eq!(sequence.len(), 9);
        assert!(dir.path().join("state/best_superpermutation_n3.txt").exists());
        let summary = std::fs::read_to_string(dir.path().join("summary.json")).expect("summary");
        assert!(summary.contains("\"target\": 3"));
    }
}
