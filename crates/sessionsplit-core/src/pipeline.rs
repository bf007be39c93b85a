//! Two-pass driver: estimate the global cutoff, then split every shard.
//!
//! Pass 1 reads only the time column of every shard and hands the values to a
//! [`CutoffEstimator`]. Pass 2 starts once the estimator has been consumed into
//! a [`GlobalCutoff`]; it re-reads each shard, derives features and writes the
//! train and test files. The output directories are created between the two
//! passes, so a run that fails to produce a cutoff leaves the output root
//! untouched.
//!
//! Shard-level failures are logged and recorded in the [`RunReport`]; they
//! never abort the run or cancel other shards.

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use futures::{StreamExt, stream};
use log::{debug, info, warn};
use snafu::prelude::*;

use crate::{
    columns::{Partition, SessionColumns},
    cutoff::{CutoffEstimator, DEFAULT_TRAIN_FRACTION, GlobalCutoff},
    error::{
        CreateOutputDirSnafu, CutoffSnafu, InvalidConfigSnafu, ListInputSnafu, NoInputSnafu,
        PipelineError, SerializeReportSnafu, ShardResult, WriteReportSnafu,
    },
    features::transform_shard,
    report::{self, RunReport, ShardReport, ShardStatus},
    shard::{Shard, ShardId, discover_shards},
    storage::{self, StorageLocation},
    timestamps::collect_timestamps,
    writer::{partition_rel_path, write_partition},
};

/// Default input directory of a processing job.
pub const DEFAULT_INPUT_DIR: &str = "/opt/ml/processing/input";
/// Default output directory of a processing job.
pub const DEFAULT_OUTPUT_DIR: &str = "/opt/ml/processing/output";

/// Everything a run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Directory holding the input shards.
    pub input_dir: PathBuf,
    /// Output root; `train/` and `test/` are created beneath it.
    pub output_dir: PathBuf,
    /// Raw input column names.
    pub columns: SessionColumns,
    /// Fraction of the corpus (by start time) that goes to train.
    pub train_fraction: f64,
    /// Maximum number of shards in flight per pass.
    pub concurrency: usize,
}

impl PipelineConfig {
    /// Config with default columns, fraction and concurrency.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            columns: SessionColumns::default(),
            train_fraction: DEFAULT_TRAIN_FRACTION,
            concurrency: default_concurrency(),
        }
    }

    /// Override the raw column names.
    pub fn with_columns(mut self, columns: SessionColumns) -> Self {
        self.columns = columns;
        self
    }

    /// Override the train fraction.
    pub fn with_train_fraction(mut self, train_fraction: f64) -> Self {
        self.train_fraction = train_fraction;
        self
    }

    /// Override the number of shards processed concurrently.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Reject settings that cannot drive a run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        ensure!(
            self.train_fraction > 0.0 && self.train_fraction < 1.0,
            InvalidConfigSnafu {
                message: format!(
                    "train fraction must lie strictly between 0 and 1, got {}",
                    self.train_fraction
                ),
            }
        );
        ensure!(
            self.concurrency > 0,
            InvalidConfigSnafu {
                message: "concurrency must be at least 1",
            }
        );
        ensure!(
            !self.same_directory(),
            InvalidConfigSnafu {
                message: format!(
                    "input and output directory are the same: {}",
                    self.input_dir.display()
                ),
            }
        );
        Ok(())
    }

    /// Whether input and output name the same directory. Existing paths are
    /// compared after resolving `.`, `..` and symlinks.
    fn same_directory(&self) -> bool {
        match (
            std::fs::canonicalize(&self.input_dir),
            std::fs::canonicalize(&self.output_dir),
        ) {
            (Ok(input), Ok(output)) => input == output,
            _ => self.input_dir == self.output_dir,
        }
    }
}

/// Number of shards processed concurrently when not configured.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Result of pass 1.
#[derive(Debug, Clone, Copy)]
pub struct CutoffSummary {
    /// The resolved cutoff.
    pub cutoff: GlobalCutoff,
    /// Timestamps it was computed from.
    pub timestamps: usize,
    /// Shards that contributed at least one timestamp.
    pub shards: usize,
}

/// Run both passes and write the report.
pub async fn run_pipeline(config: &PipelineConfig) -> Result<RunReport, PipelineError> {
    config.validate()?;

    let input = StorageLocation::local(&config.input_dir);
    let output = StorageLocation::local(&config.output_dir);

    let shards = discover_shards(&input).await.context(ListInputSnafu {
        path: config.input_dir.display().to_string(),
    })?;
    ensure!(
        !shards.is_empty(),
        NoInputSnafu {
            path: config.input_dir.display().to_string(),
        }
    );
    info!(
        "found {} shards in {}",
        shards.len(),
        config.input_dir.display()
    );

    let summary = estimate_cutoff(&shards, config).await?;
    info!(
        "global cutoff {} ({} timestamps from {} shards, fraction {})",
        summary.cutoff, summary.timestamps, summary.shards, config.train_fraction
    );

    for partition in Partition::ALL {
        storage::create_dir_all(&output, Path::new(partition.as_str()))
            .await
            .context(CreateOutputDirSnafu)?;
    }

    let entries = split_shards(&shards, summary.cutoff, &output, config).await;
    let report = RunReport::new(
        summary.cutoff,
        config.train_fraction,
        summary.timestamps,
        summary.shards,
        entries,
    );

    let json = report.to_json().context(SerializeReportSnafu)?;
    report::write_report(&output, &json)
        .await
        .context(WriteReportSnafu)?;

    info!(
        "split complete: {} shards processed, {} skipped, {} train rows, {} test rows",
        report.processed_count(),
        report.skipped_count(),
        report.train_rows(),
        report.test_rows()
    );
    Ok(report)
}

/// Pass 1: collect start timestamps from every shard and resolve the cutoff.
///
/// Shards that cannot be read, or that lack the time column, are skipped.
/// Fails only when no shard contributed a timestamp.
pub async fn estimate_cutoff(
    shards: &[Shard],
    config: &PipelineConfig,
) -> Result<CutoffSummary, PipelineError> {
    let mut estimator = CutoffEstimator::new(config.train_fraction).context(CutoffSnafu)?;
    let time_column = config.columns.time.as_str();

    let mut results = stream::iter(shards)
        .map(|shard| async move { (shard, collect_timestamps(shard, time_column).await) })
        .buffer_unordered(config.concurrency.max(1));

    while let Some((shard, result)) = results.next().await {
        match result {
            Ok(Some(timestamps)) => {
                debug!("{}: {} start timestamps", shard.id(), timestamps.len());
                estimator.add_shard(timestamps);
            }
            Ok(None) => debug!("{}: no {time_column} column, ignored for cutoff", shard.id()),
            Err(e) => warn!("skipping shard {} while estimating cutoff: {e}", shard.id()),
        }
    }

    let timestamps = estimator.timestamp_count();
    let shard_count = estimator.shard_count();
    let cutoff = estimator.finish().context(CutoffSnafu)?;
    Ok(CutoffSummary {
        cutoff,
        timestamps,
        shards: shard_count,
    })
}

/// Pass 2: transform and write every shard against `cutoff`.
async fn split_shards(
    shards: &[Shard],
    cutoff: GlobalCutoff,
    output: &StorageLocation,
    config: &PipelineConfig,
) -> Vec<ShardReport> {
    stream::iter(shards)
        .map(|shard| async move {
            let status = match split_shard(shard, cutoff, output, &config.columns).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("skipping shard {}: {e}", shard.id());
                    ShardStatus::Skipped {
                        reason: e.to_string(),
                    }
                }
            };
            if matches!(status, ShardStatus::Skipped { .. }) {
                discard_outputs(output, shard.id()).await;
            }
            ShardReport {
                shard: shard.id().clone(),
                status,
            }
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await
}

async fn split_shard(
    shard: &Shard,
    cutoff: GlobalCutoff,
    output: &StorageLocation,
    columns: &SessionColumns,
) -> ShardResult<ShardStatus> {
    let Some(split) = transform_shard(shard, cutoff, columns).await? else {
        debug!(
            "{}: no {} or {} column, contributes nothing",
            shard.id(),
            columns.time,
            columns.label
        );
        return Ok(ShardStatus::Skipped {
            reason: format!("missing {} or {} column", columns.time, columns.label),
        });
    };

    let train = write_partition(output, Partition::Train, shard.id(), split.train()).await?;
    let test = write_partition(output, Partition::Test, shard.id(), split.test()).await?;

    Ok(ShardStatus::Processed {
        train_rows: split.train().num_rows(),
        test_rows: split.test().num_rows(),
        train_file: train.as_deref().map(report_path),
        test_file: test.as_deref().map(report_path),
    })
}

/// Remove both partition files of a skipped shard, including any left by an
/// earlier run, so the output never holds half of a shard.
async fn discard_outputs(output: &StorageLocation, shard: &ShardId) {
    for partition in Partition::ALL {
        let rel = partition_rel_path(partition, shard);
        match storage::remove_file_if_exists(output, &rel).await {
            Ok(true) => debug!("removed {}", output.join(&rel).display()),
            Ok(false) => {}
            Err(e) => warn!("could not remove {}: {e}", output.join(&rel).display()),
        }
    }
}

/// Relative output path with `/` separators, as recorded in the report.
fn report_path(rel: &Path) -> String {
    rel.iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
