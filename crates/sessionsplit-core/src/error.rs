//! Error types and SNAFU context selectors for the pipeline.
//!
//! Errors come in two layers:
//!
//! - [`ShardError`] describes anything that goes wrong while reading,
//!   transforming or writing a single shard. These never escape the shard
//!   boundary: the driver logs them against the shard id and moves on.
//! - [`PipelineError`] is fatal for the whole run (no input, no timestamps to
//!   derive a cutoff from, output directory not writable, bad config).

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::{Backtrace, prelude::*};

use crate::{cutoff::CutoffError, storage::StorageError};

/// Result alias for per-shard operations.
pub type ShardResult<T> = Result<T, ShardError>;

/// Errors confined to one shard. The shard is skipped; the run continues.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ShardError {
    /// Reading the shard or writing one of its outputs failed.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error (carries the path).
        source: StorageError,
    },

    /// The shard is not a readable Parquet file.
    #[snafu(display("Parquet read error in {path}: {source}"))]
    ParquetRead {
        /// Path of the shard.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// Decoding a record batch or running a compute kernel failed.
    #[snafu(display("Arrow error in {path}: {source}"))]
    Arrow {
        /// Path of the shard.
        path: String,
        /// Underlying Arrow error.
        source: ArrowError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A column needed to derive features is absent.
    #[snafu(display("Missing column {column} in {path}"))]
    MissingColumn {
        /// Path of the shard.
        path: String,
        /// Name of the missing column.
        column: String,
    },

    /// A column exists but its Arrow type cannot be interpreted.
    #[snafu(display("Unsupported type for column {column} in {path}: {datatype}"))]
    UnsupportedColumnType {
        /// Path of the shard.
        path: String,
        /// Name of the offending column.
        column: String,
        /// Arrow data type found in the file.
        datatype: String,
    },

    /// A floating-point count or label column holds a value that is not a
    /// whole number (fractional, NaN or infinite).
    #[snafu(display("Column {column} in {path} holds a non-integral value"))]
    NonIntegralValue {
        /// Path of the shard.
        path: String,
        /// Name of the offending column.
        column: String,
    },

    /// Encoding an output batch as CSV failed.
    #[snafu(display("Failed to write CSV {path}: {source}"))]
    CsvWrite {
        /// Output path being written.
        path: String,
        /// Underlying Arrow CSV error.
        source: ArrowError,
    },

    /// The blocking task decoding the shard panicked or was cancelled.
    #[snafu(display("Worker task for {path} did not complete: {source}"))]
    TaskJoin {
        /// Path of the shard.
        path: String,
        /// Join error reported by the runtime.
        source: tokio::task::JoinError,
    },
}

/// Errors that abort the whole run. Nothing further is written once one occurs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    /// The supplied configuration cannot drive a run.
    #[snafu(display("Invalid pipeline configuration: {message}"))]
    InvalidConfig {
        /// What is wrong with the configuration.
        message: String,
    },

    /// The input directory could not be listed.
    #[snafu(display("Cannot list input directory {path}: {source}"))]
    ListInput {
        /// Input directory.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// The input directory holds no candidate shard files.
    #[snafu(display("No input shards found in {path}"))]
    NoInput {
        /// Input directory.
        path: String,
    },

    /// No global cutoff could be derived (for example, an empty corpus).
    #[snafu(display("Cannot derive a global cutoff: {source}"))]
    Cutoff {
        /// Underlying estimator error.
        source: CutoffError,
    },

    /// The `train/` or `test/` output directory could not be created.
    #[snafu(display("Cannot create output directory: {source}"))]
    CreateOutputDir {
        /// Underlying storage error.
        source: StorageError,
    },

    /// The run report could not be serialized.
    #[snafu(display("Cannot serialize run report: {source}"))]
    SerializeReport {
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// The run report could not be written.
    #[snafu(display("Cannot write run report: {source}"))]
    WriteReport {
        /// Underlying storage error.
        source: StorageError,
    },
}
