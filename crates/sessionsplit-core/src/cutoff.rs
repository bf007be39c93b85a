//! Global time cutoff estimation (pass 1 → pass 2 barrier).
//!
//! The cutoff is the nearest-rank quantile of the start timestamps of the
//! whole corpus: all shards' values are merged, sorted ascending, and the
//! element at zero-based index `floor(fraction × N)` is taken. With the
//! default fraction of 0.8 roughly 80% of the sessions start strictly before
//! the cutoff and land in the training partition.
//!
//! [`CutoffEstimator::finish`] consumes the estimator and is the only way to
//! obtain a [`GlobalCutoff`]. Pass 2 APIs take the cutoff by value, so no
//! shard can be partitioned before every shard has been scanned.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use rayon::prelude::*;
use snafu::prelude::*;

/// Fraction of the corpus (by start time) routed to training by default.
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

/// Errors from cutoff estimation.
#[derive(Debug, Snafu, Clone, PartialEq)]
pub enum CutoffError {
    /// No shard contributed a single timestamp.
    #[snafu(display("No valid data found: no shard contributed any start timestamp"))]
    EmptyCorpus,

    /// The train fraction is outside `(0, 1)`.
    #[snafu(display("Train fraction must lie strictly between 0 and 1, got {fraction}"))]
    InvalidFraction {
        /// The rejected fraction.
        fraction: f64,
    },
}

/// The single train/test boundary of a run, in nanoseconds since the epoch.
///
/// Records whose start time is strictly earlier belong to the training
/// partition; everything else (including records without a start time)
/// belongs to the test partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalCutoff {
    nanos: i64,
}

impl GlobalCutoff {
    /// Cutoff as nanoseconds since the Unix epoch.
    pub fn as_nanos(self) -> i64 {
        self.nanos
    }

    /// Cutoff as a UTC datetime.
    pub fn as_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.nanos)
    }

    /// Whether a record starting at `start_nanos` goes to the training set.
    pub fn is_train(self, start_nanos: i64) -> bool {
        start_nanos < self.nanos
    }
}

impl fmt::Display for GlobalCutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(
            &self
                .as_datetime()
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )
    }
}

/// Zero-based nearest-rank index for `fraction` over `n` sorted values.
///
/// Computed as `floor(n × fraction)` in `f64`, clamped to the last element.
/// `n` must be non-zero.
pub fn nearest_rank_index(n: usize, fraction: f64) -> usize {
    debug_assert!(n > 0);
    let idx = (n as f64 * fraction).floor() as usize;
    idx.min(n - 1)
}

/// Accumulates per-shard timestamp columns and resolves the global cutoff.
#[derive(Debug)]
pub struct CutoffEstimator {
    fraction: f64,
    shards: Vec<Vec<i64>>,
    total: usize,
}

impl CutoffEstimator {
    /// Create an estimator for the given train fraction.
    pub fn new(fraction: f64) -> Result<Self, CutoffError> {
        ensure!(
            fraction > 0.0 && fraction < 1.0,
            InvalidFractionSnafu { fraction }
        );
        Ok(Self {
            fraction,
            shards: Vec::new(),
            total: 0,
        })
    }

    /// The configured train fraction.
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Add one shard's start timestamps (nanoseconds). Empty input is ignored.
    pub fn add_shard(&mut self, timestamps: Vec<i64>) {
        if timestamps.is_empty() {
            return;
        }
        self.total += timestamps.len();
        self.shards.push(timestamps);
    }

    /// Number of shards that contributed at least one timestamp.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of timestamps collected so far.
    pub fn timestamp_count(&self) -> usize {
        self.total
    }

    /// Merge, sort and select the cutoff.
    pub fn finish(self) -> Result<GlobalCutoff, CutoffError> {
        ensure!(self.total > 0, EmptyCorpusSnafu);

        let mut all = Vec::with_capacity(self.total);
        for shard in self.shards {
            all.extend(shard);
        }
        all.par_sort_unstable();

        let idx = nearest_rank_index(all.len(), self.fraction);
        Ok(GlobalCutoff { nanos: all[idx] })
    }
}
