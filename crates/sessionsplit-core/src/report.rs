//! Summary of one pipeline run, persisted next to the partition directories.
//!
//! The report holds no wall-clock data and lists shards in id order, so two
//! runs over unchanged input write byte-identical reports.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    cutoff::GlobalCutoff,
    shard::ShardId,
    storage::{self, StorageLocation, StorageResult},
};

/// File name of the report under the output root.
pub const REPORT_FILE_NAME: &str = "_split_report.json";

/// What happened to one shard in pass 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ShardStatus {
    /// The shard was transformed; empty sides produce no file.
    Processed {
        /// Rows routed to train.
        train_rows: usize,
        /// Rows routed to test.
        test_rows: usize,
        /// Train file, relative to the output root.
        train_file: Option<String>,
        /// Test file, relative to the output root.
        test_file: Option<String>,
    },
    /// The shard contributed nothing.
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
}

/// Per-shard entry of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardReport {
    /// Source shard.
    pub shard: ShardId,
    /// Outcome.
    #[serde(flatten)]
    pub status: ShardStatus,
}

/// Outcome of a complete run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Cutoff in nanoseconds since the Unix epoch.
    pub cutoff_nanos: i64,
    /// Cutoff rendered as RFC 3339 (UTC).
    pub cutoff: String,
    /// Fraction used to pick the cutoff.
    pub train_fraction: f64,
    /// Start timestamps that fed the cutoff.
    pub corpus_timestamps: usize,
    /// Shards that contributed at least one timestamp in pass 1.
    pub cutoff_shards: usize,
    /// Pass 2 outcome of every discovered shard, sorted by shard id.
    pub shards: Vec<ShardReport>,
}

impl RunReport {
    /// Assemble a report; shard entries are sorted by id.
    pub fn new(
        cutoff: GlobalCutoff,
        train_fraction: f64,
        corpus_timestamps: usize,
        cutoff_shards: usize,
        mut shards: Vec<ShardReport>,
    ) -> Self {
        shards.sort_by(|a, b| a.shard.cmp(&b.shard));
        Self {
            cutoff_nanos: cutoff.as_nanos(),
            cutoff: cutoff.to_string(),
            train_fraction,
            corpus_timestamps,
            cutoff_shards,
            shards,
        }
    }

    /// Number of shards that produced output.
    pub fn processed_count(&self) -> usize {
        self.shards
            .iter()
            .filter(|s| matches!(s.status, ShardStatus::Processed { .. }))
            .count()
    }

    /// Number of shards that were skipped.
    pub fn skipped_count(&self) -> usize {
        self.shards.len() - self.processed_count()
    }

    /// Total rows written to train files.
    pub fn train_rows(&self) -> usize {
        self.rows(|train, _| train)
    }

    /// Total rows written to test files.
    pub fn test_rows(&self) -> usize {
        self.rows(|_, test| test)
    }

    fn rows(&self, pick: impl Fn(usize, usize) -> usize) -> usize {
        self.shards
            .iter()
            .map(|s| match s.status {
                ShardStatus::Processed {
                    train_rows,
                    test_rows,
                    ..
                } => pick(train_rows, test_rows),
                ShardStatus::Skipped { .. } => 0,
            })
            .sum()
    }

    /// Entry for `shard`, if it was discovered.
    pub fn shard(&self, shard: &str) -> Option<&ShardReport> {
        self.shards.iter().find(|s| s.shard.as_str() == shard)
    }

    /// Serialize as pretty JSON with a trailing newline.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }
}

/// Write pre-serialized report bytes to `{output}/_split_report.json`.
pub(crate) async fn write_report(output: &StorageLocation, json: &[u8]) -> StorageResult<()> {
    storage::write_atomic(output, Path::new(REPORT_FILE_NAME), json).await
}
