//! Persist one side of a shard's split as a headerless CSV file.
//!
//! Each (shard, partition) pair maps to exactly one file,
//! `{partition}/{partition}_{shard}.csv` under the output root. Files are
//! written through a temp file and renamed into place, so a rerun over the
//! same input replaces the previous output instead of adding to it.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use arrow::array::RecordBatch;
use arrow_csv::WriterBuilder;
use log::debug;
use snafu::ResultExt;
use tokio::fs;

use crate::{
    columns::Partition,
    error::{CsvWriteSnafu, ShardResult, StorageSnafu},
    shard::ShardId,
    storage::{self, IoSnafu, StorageLocation, StorageResult, TempFileGuard, create_parent_dir},
};

/// One partition file being written: rows go to `{final}.tmp`, which is
/// renamed over the final path by [`PartitionSink::finish`]. Dropping an
/// unfinished sink removes the temp file and leaves any previous output as is.
struct PartitionSink {
    tmp_path: PathBuf,
    final_path: PathBuf,
    file: BufWriter<File>,
    guard: TempFileGuard,
}

impl PartitionSink {
    async fn open(output: &StorageLocation, rel_path: &Path) -> StorageResult<Self> {
        let final_path = output.join(rel_path);
        create_parent_dir(&final_path).await?;

        let tmp_path = final_path.with_extension("tmp");
        // arrow-csv writes through std::io::Write.
        let file = File::create(&tmp_path).context(IoSnafu {
            path: tmp_path.display().to_string(),
        })?;
        let guard = TempFileGuard::new(tmp_path.clone());

        Ok(Self {
            tmp_path,
            final_path,
            file: BufWriter::new(file),
            guard,
        })
    }

    async fn finish(mut self) -> StorageResult<()> {
        let tmp = self.tmp_path.display().to_string();
        self.file.flush().context(IoSnafu { path: &tmp })?;
        self.file.get_ref().sync_all().context(IoSnafu { path: &tmp })?;

        fs::rename(&self.tmp_path, &self.final_path)
            .await
            .context(IoSnafu {
                path: self.final_path.display().to_string(),
            })?;
        self.guard.disarm();
        Ok(())
    }
}

/// Output path of `shard`'s `partition` file, relative to the output root.
pub fn partition_rel_path(partition: Partition, shard: &ShardId) -> PathBuf {
    PathBuf::from(partition.as_str()).join(partition.file_name(shard))
}

/// Write `batch` as `shard`'s `partition` file.
///
/// Returns the relative path written, or `None` for an empty batch. An empty
/// batch creates no file and removes one left by an earlier run.
pub async fn write_partition(
    output: &StorageLocation,
    partition: Partition,
    shard: &ShardId,
    batch: &RecordBatch,
) -> ShardResult<Option<PathBuf>> {
    let rel_path = partition_rel_path(partition, shard);
    if batch.num_rows() == 0 {
        if storage::remove_file_if_exists(output, &rel_path)
            .await
            .context(StorageSnafu)?
        {
            debug!("removed stale {}", output.join(&rel_path).display());
        }
        return Ok(None);
    }

    let mut sink = PartitionSink::open(output, &rel_path)
        .await
        .context(StorageSnafu)?;

    {
        let mut writer = WriterBuilder::new()
            .with_header(false)
            .build(&mut sink.file);
        writer.write(batch).context(CsvWriteSnafu {
            path: output.join(&rel_path).display().to_string(),
        })?;
    }

    sink.finish().await.context(StorageSnafu)?;
    debug!(
        "wrote {} rows to {}",
        batch.num_rows(),
        output.join(&rel_path).display()
    );
    Ok(Some(rel_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::SessionColumns;
    use crate::cutoff::CutoffEstimator;
    use crate::features::transform_batch;
    use crate::test_util::{SessionRow, TestResult, session_batch};
    use tempfile::TempDir;

    fn split_for(rows: &[SessionRow], cutoff_nanos: i64) -> TestResult<crate::features::FeatureSplit> {
        let mut est = CutoffEstimator::new(0.5)?;
        est.add_shard(vec![cutoff_nanos]);
        let cutoff = est.finish()?;
        Ok(transform_batch(
            "mem",
            &session_batch(rows)?,
            cutoff,
            &SessionColumns::default(),
        )?)
    }

    #[tokio::test]
    async fn writes_headerless_rows_in_fixed_column_order() -> TestResult {
        let tmp = TempDir::new()?;
        let output = StorageLocation::local(tmp.path());
        let shard = ShardId::new("part-0.parquet");

        // 1970-01-01 was a Thursday; 2h after epoch.
        let rows = vec![SessionRow::at_millis(2 * 3_600_000).with_counts(0, 3).purchased()];
        let split = split_for(&rows, i64::MAX)?;

        let rel = write_partition(&output, Partition::Train, &shard, split.train())
            .await?
            .ok_or("non-empty batch is written")?;
        assert_eq!(rel, PathBuf::from("train/train_part-0.parquet.csv"));

        let text = std::fs::read_to_string(tmp.path().join(&rel))?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let fields: Vec<&str> = lines[0].split(',').collect();
        assert_eq!(fields.len(), 9);
        assert_eq!(&fields[..7], &["0", "3", "3", "2", "2", "3", "0"]);
        assert_eq!(fields[7].parse::<f64>()?, 3.0);
        assert_eq!(fields[8], "1");
        Ok(())
    }

    #[tokio::test]
    async fn empty_batches_produce_no_file() -> TestResult {
        let tmp = TempDir::new()?;
        let output = StorageLocation::local(tmp.path());
        let shard = ShardId::new("part-1.parquet");
        let split = split_for(&[SessionRow::at_millis(10)], i64::MAX)?;

        let written = write_partition(&output, Partition::Test, &shard, split.test()).await?;
        assert!(written.is_none());
        assert!(!tmp.path().join("test").exists());
        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_removes_stale_output() -> TestResult {
        let tmp = TempDir::new()?;
        let output = StorageLocation::local(tmp.path());
        let shard = ShardId::new("part-3.parquet");

        let before = split_for(&[SessionRow::at_millis(0)], i64::MAX)?;
        let rel = write_partition(&output, Partition::Train, &shard, before.train())
            .await?
            .ok_or("written")?;
        assert!(tmp.path().join(&rel).exists());

        // Same shard, now entirely after the cutoff.
        let after = split_for(&[SessionRow::at_millis(0)], 0)?;
        assert!(
            write_partition(&output, Partition::Train, &shard, after.train())
                .await?
                .is_none()
        );
        assert!(!tmp.path().join(&rel).exists());
        Ok(())
    }

    #[tokio::test]
    async fn finished_sink_leaves_no_temp_file() -> TestResult {
        let tmp = TempDir::new()?;
        let output = StorageLocation::local(tmp.path());
        let rel = Path::new("train/train_a.parquet.csv");

        let mut sink = PartitionSink::open(&output, rel).await?;
        sink.file.write_all(b"1,2,3\n")?;
        assert!(tmp.path().join("train/train_a.parquet.tmp").exists());
        sink.finish().await?;

        assert_eq!(std::fs::read_to_string(tmp.path().join(rel))?, "1,2,3\n");
        assert!(!tmp.path().join("train/train_a.parquet.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_sink_keeps_previous_output() -> TestResult {
        let tmp = TempDir::new()?;
        let output = StorageLocation::local(tmp.path());
        let rel = Path::new("test/test_b.parquet.csv");
        std::fs::create_dir_all(tmp.path().join("test"))?;
        std::fs::write(tmp.path().join(rel), "old\n")?;

        {
            let mut sink = PartitionSink::open(&output, rel).await?;
            sink.file.write_all(b"partial")?;
        }

        assert_eq!(std::fs::read_to_string(tmp.path().join(rel))?, "old\n");
        assert!(!tmp.path().join("test/test_b.parquet.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn rewriting_replaces_previous_output() -> TestResult {
        let tmp = TempDir::new()?;
        let output = StorageLocation::local(tmp.path());
        let shard = ShardId::new("part-2.parquet");

        let first = split_for(
            &[SessionRow::at_millis(0), SessionRow::at_millis(1)],
            i64::MAX,
        )?;
        write_partition(&output, Partition::Train, &shard, first.train()).await?;

        let second = split_for(&[SessionRow::at_millis(0)], i64::MAX)?;
        let rel = write_partition(&output, Partition::Train, &shard, second.train())
            .await?
            .ok_or("written")?;

        let text = std::fs::read_to_string(tmp.path().join(rel))?;
        assert_eq!(text.lines().count(), 1);
        Ok(())
    }
}
