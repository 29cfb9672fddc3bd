//! Decimate directory-store recordings into `<name>_dec` siblings.
//!
//! Each input store must hold a single experiment node with its raw
//! waveform at `<experiment>/data/physiology/raw`.

use clap::Parser;
use ephys::analysis::BlockData;
use ephys::prelude::*;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Decimate files")]
struct Args {
    /// Recordings to decimate
    #[arg(value_name = "FILES", required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Overwrite existing output files
    #[arg(long, default_value_t = false)]
    force_overwrite: bool,

    /// Desired output rate in Hz
    #[arg(long, default_value_t = 600.0)]
    target_rate: f64,

    /// Decimation factor (overrides --target-rate)
    #[arg(long)]
    factor: Option<usize>,

    /// Low-pass filter order
    #[arg(long, default_value_t = 4)]
    order: usize,

    /// Maximum bytes held per chunk
    #[arg(long, default_value_t = ephys::DEFAULT_MEMORY_BUDGET)]
    memory_budget: usize,

    /// Do not copy trial and event data
    #[arg(long, default_value_t = false)]
    no_block_data: bool,
}

/// `dir/name.ext` becomes `dir/name_dec.ext`.
fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}_dec.{}", ext.to_string_lossy()),
        None => format!("{stem}_dec"),
    };
    input.with_file_name(name)
}

fn decimate_file(input: &Path, args: &Args, analyzer: &Analyzer) -> ephys::Result<()> {
    let source = DirStore::open(input)?;
    let experiments = source.children("")?;
    let [experiment] = experiments.as_slice() else {
        return Err(ephys::core::Error::config(format!(
            "unable to process {}: expected one experiment node, found {}",
            input.display(),
            experiments.len()
        ))
        .into());
    };
    println!("Processing {}", input.display());

    let output = output_path(input);
    if output.exists() {
        if !args.force_overwrite {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", output.display()),
            )
            .into());
        }
        std::fs::remove_dir_all(&output)?;
    }

    let data = format!("{experiment}/data");
    let raw = StoreRecording::open(&source, &format!("{data}/physiology/raw"))?;
    let params = DecimateParams {
        factor: args.factor,
        target_rate: args.target_rate,
        filter_order: args.order,
        include_block_data: !args.no_block_data,
    };
    // Reject bad rates and orders before anything lands on disk
    let q = params.factor_for(raw.fs())?;
    params.design(q)?;

    let mut sink = DirStore::create(&output)?;
    let block = BlockData {
        store: &source,
        path: &data,
    };
    let mut report = |done: usize, total: usize, _: &str| {
        let percent = if total == 0 { 100.0 } else { 100.0 * done as f64 / total as f64 };
        eprint!("\r{percent:6.2}%");
        ControlFlow::Continue(())
    };
    let done = match analyzer.decimate(&raw, &mut sink, "", &params, Some(block), &mut report) {
        Ok(done) => done,
        Err(e) => {
            drop(sink);
            if let Err(cleanup) = std::fs::remove_dir_all(&output) {
                warn!(output = %output.display(), "could not remove partial output: {cleanup}");
            }
            return Err(e);
        }
    };
    eprintln!();
    info!(
        output = %output.display(),
        samples = done.samples_processed,
        "decimated"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let analyzer = match Analyzer::builder().memory_budget(args.memory_budget).build() {
        Ok(analyzer) => analyzer,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut failed = false;
    for file in &args.files {
        if let Err(e) = decimate_file(file, &args, &analyzer) {
            error!(file = %file.display(), "{e}");
            eprintln!("{e}");
            failed = true;
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
