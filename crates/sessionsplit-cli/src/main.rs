//! CLI for splitting sharded session data into train and test partitions.

mod error;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::{debug, info};
use snafu::ResultExt;
use sessionsplit_core::{
    PipelineConfig,
    columns::{DID_PURCHASE, SESSION_START, SessionColumns},
    cutoff::DEFAULT_TRAIN_FRACTION,
    dataset::{FEATURE_COUNT, FeatureDataset},
    pipeline::{DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_DIR, default_concurrency},
    run_pipeline,
};

use crate::error::{CliResult, LoadDatasetSnafu, PipelineSnafu};

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute the global cutoff and write train/ and test/ feature files
    Process {
        /// Directory of input Parquet shards
        #[arg(long = "input-data", default_value = DEFAULT_INPUT_DIR)]
        input_data: PathBuf,

        /// Output root; train/ and test/ are created beneath it
        #[arg(long = "output-data", default_value = DEFAULT_OUTPUT_DIR)]
        output_data: PathBuf,

        /// Column holding each session's start timestamp
        #[arg(long = "time-column", default_value = SESSION_START)]
        time_column: String,

        /// Column holding the purchase label (0/1 or boolean)
        #[arg(long = "label-column", default_value = DID_PURCHASE)]
        label_column: String,

        /// Share of sessions (by start time) that goes to train
        #[arg(long = "train-fraction", default_value_t = DEFAULT_TRAIN_FRACTION)]
        train_fraction: f64,

        /// Shards processed at once (default: available cores)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Load a partition directory the way the trainer does and summarize it
    Inspect {
        /// Partition directory to load, such as OUTPUT/train
        #[arg(long)]
        dir: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

struct ProcessArgs {
    input_data: PathBuf,
    output_data: PathBuf,
    time_column: String,
    label_column: String,
    train_fraction: f64,
    concurrency: Option<usize>,
}

async fn cmd_process(args: ProcessArgs) -> CliResult<()> {
    let columns = SessionColumns {
        time: args.time_column,
        label: args.label_column,
        ..SessionColumns::default()
    };
    let config = PipelineConfig::new(args.input_data, args.output_data)
        .with_columns(columns)
        .with_train_fraction(args.train_fraction)
        .with_concurrency(args.concurrency.unwrap_or_else(default_concurrency));
    debug!("{config:?}");

    let report = run_pipeline(&config).await.context(PipelineSnafu)?;

    println!("cutoff: {}", report.cutoff);
    println!(
        "shards: {} processed, {} skipped",
        report.processed_count(),
        report.skipped_count()
    );
    println!("train rows: {}", report.train_rows());
    println!("test rows: {}", report.test_rows());
    Ok(())
}

fn cmd_inspect(dir: &Path) -> CliResult<()> {
    info!("loading partition files from {}", dir.display());
    let dataset = FeatureDataset::load_dir(dir).context(LoadDatasetSnafu {
        dir: dir.display().to_string(),
    })?;

    println!("rows: {}", dataset.len());
    println!("features: {FEATURE_COUNT}");
    match dataset.positive_rate() {
        Some(rate) => println!("positive rate: {rate:.4}"),
        None => println!("positive rate: n/a"),
    }
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Process {
            input_data,
            output_data,
            time_column,
            label_column,
            train_fraction,
            concurrency,
        } => {
            cmd_process(ProcessArgs {
                input_data,
                output_data,
                time_column,
                label_column,
                train_fraction,
                concurrency,
            })
            .await
        }
        Command::Inspect { dir } => cmd_inspect(&dir),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
