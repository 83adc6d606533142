// src/main.rs
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use mtdayfile::survey::{estimate_station, process_survey};
use mtdayfile::transfer::{read_file, write_file, CancelToken, OverlapPolicy, TransferFunctionFile};
use mtdayfile::SurveyConfig;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Magnetotelluric dayfiles and transfer-function files",
    arg_required_else_help = true,
    after_help = "Examples:\n  mtdayfile dayfiles --config survey.json --out dayfiles --waveform\n  mtdayfile estimate --config survey.json --station MT01 --out work\n  mtdayfile merge long.tf short.tf --out MT01.tf --policy prefer-first\n  mtdayfile validate MT01.tf\n\nSet RUST_LOG=info (or debug) for progress output."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calibrate, align, re-orient and split every station into UTC dayfiles
    Dayfiles {
        /// Survey configuration (JSON)
        #[arg(long)]
        config: PathBuf,
        /// Output directory; one subdirectory per station
        #[arg(long)]
        out: PathBuf,
        /// Also write waveform files (miniSEED with the `miniseed` feature, IRIS ASCII otherwise)
        #[arg(long)]
        waveform: bool,
    },
    /// Run the external estimator for one station and write its tensor file
    Estimate {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        station: String,
        /// Working directory; estimator files go to <out>/birrp_processed
        #[arg(long)]
        out: PathBuf,
    },
    /// Combine tensor files of one station
    Merge {
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        /// prefer-first, prefer-last or average; overlapping frequencies are an error without it
        #[arg(long)]
        policy: Option<OverlapPolicy>,
    },
    /// Reload a tensor file and check its invariants
    Validate { file: PathBuf },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Dayfiles {
            config,
            out,
            waveform,
        } => {
            let survey = SurveyConfig::load(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            let outcomes = process_survey(&survey, &out, waveform)
                .with_context(|| format!("failed to prepare {}", out.display()))?;
            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(summary) => println!(
                        "{}: {} days ({} full), {} files",
                        outcome.station,
                        summary.days,
                        summary.full_days,
                        summary.files.len()
                    ),
                    Err(e) => {
                        failed += 1;
                        println!("{}: FAILED: {e}", outcome.station);
                    }
                }
            }
            if failed == outcomes.len() {
                bail!("no station could be processed");
            }
        }
        Command::Estimate {
            config,
            station,
            out,
        } => {
            let survey = SurveyConfig::load(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            let (file, problems) = estimate_station(&survey, &station, &out, &CancelToken::new())
                .with_context(|| format!("estimation for {station} failed"))?;
            for problem in &problems {
                eprintln!("warning: {problem}");
            }
            let path = out.join(format!("{}.tf", file.header().station_id));
            write_file(&path, &file).with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{}: {} frequencies ({} invalid) -> {}",
                file.header().station_id,
                file.entries().len(),
                file.invalid_count(),
                path.display()
            );
        }
        Command::Merge { files, out, policy } => {
            let loaded = files
                .iter()
                .map(|p| read_file(p).with_context(|| format!("failed to read {}", p.display())))
                .collect::<Result<Vec<_>>>()?;
            let merged = TransferFunctionFile::merge(&loaded, policy).context("merge failed")?;
            write_file(&out, &merged).with_context(|| format!("failed to write {}", out.display()))?;
            println!("merged {} files into {} frequencies", loaded.len(), merged.entries().len());
        }
        Command::Validate { file } => {
            let tf = read_file(&file).with_context(|| format!("{} is not valid", file.display()))?;
            let (lo, hi) = tf
                .frequencies()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), f| (lo.min(f), hi.max(f)));
            println!(
                "{}: {} frequencies from {lo} to {hi} Hz, {} flagged invalid",
                tf.header().station_id,
                tf.entries().len(),
                tf.invalid_count()
            );
        }
    }
    Ok(())
}
