//! Leakage-free train/test partitioning of sharded session data.
//!
//! The pipeline runs in two passes over a directory of Parquet shards:
//!
//! - Pass 1 collects the session start timestamps of every shard
//!   (`timestamps` module) and resolves one global cutoff at the 80th
//!   percentile of the whole corpus (`cutoff` module).
//! - Pass 2 re-reads each shard, derives the feature vector and label of every
//!   session (`features` module) and writes the rows that started before the
//!   cutoff to `train/` and the rest to `test/` (`writer` module).
//!
//! `pipeline::run_pipeline` drives both passes and writes a JSON run report
//! (`report` module). The `dataset` module reads the partition files back the
//! way the downstream trainer does.
#![deny(missing_docs)]
pub mod columns;
pub mod cutoff;
pub mod dataset;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod report;
pub mod shard;
pub mod storage;
pub mod timestamps;
pub mod writer;

#[cfg(test)]
mod test_util;

pub use cutoff::{CutoffEstimator, GlobalCutoff};
pub use error::{PipelineError, ShardError};
pub use pipeline::{PipelineConfig, run_pipeline};
pub use report::RunReport;
