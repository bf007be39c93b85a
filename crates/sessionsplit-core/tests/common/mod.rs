#![allow(dead_code)]

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::array::{ArrayRef, Int64Builder, TimestampMillisecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{TimeZone, Utc};
use parquet::arrow::ArrowWriter;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Clone, Debug)]
pub struct Session {
    pub start_ms: Option<i64>,
    pub n_views: i64,
    pub n_cart: i64,
    pub n_unique_product: i64,
    pub n_unique_category: i64,
    pub did_purchase: bool,
}

impl Session {
    pub fn at(start_ms: i64) -> Self {
        Self {
            start_ms: Some(start_ms),
            n_views: 5,
            n_cart: 1,
            n_unique_product: 4,
            n_unique_category: 2,
            did_purchase: false,
        }
    }
}

/// Midnight UTC of the given day, in milliseconds.
pub fn day_start_ms(y: i32, m: u32, d: u32) -> TestResult<i64> {
    Ok(Utc
        .with_ymd_and_hms(y, m, d, 0, 0, 0)
        .single()
        .ok_or("invalid test date")?
        .timestamp_millis())
}

/// `n` sessions evenly spread over `[start_ms, start_ms + span_ms)` with
/// pseudo-random counts and labels.
pub fn uniform_sessions(n: usize, start_ms: i64, span_ms: i64) -> Vec<Session> {
    let step = span_ms / n as i64;
    let mut seed = 0x5E55_1045_u64;
    (0..n)
        .map(|i| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let rnd = seed >> 33;
            let n_views = (rnd % 20) as i64;
            Session {
                start_ms: Some(start_ms + i as i64 * step),
                n_views,
                n_cart: ((rnd >> 5) % 4) as i64,
                n_unique_product: n_views.min(((rnd >> 9) % 10) as i64),
                n_unique_category: ((rnd >> 13) % 3) as i64,
                did_purchase: (rnd >> 17) % 10 == 0,
            }
        })
        .collect()
}

pub fn write_shard(path: &Path, sessions: &[Session]) -> TestResult {
    write_shard_without(path, sessions, &[])
}

/// Write a session shard with the named columns left out.
pub fn write_shard_without(path: &Path, sessions: &[Session], omit: &[&str]) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut start = TimestampMillisecondBuilder::with_capacity(sessions.len());
    let mut counts: [Int64Builder; 5] = std::array::from_fn(|_| Int64Builder::new());
    for s in sessions {
        start.append_option(s.start_ms);
        counts[0].append_value(s.n_views);
        counts[1].append_value(s.n_cart);
        counts[2].append_value(s.n_unique_product);
        counts[3].append_value(s.n_unique_category);
        counts[4].append_value(i64::from(s.did_purchase));
    }

    let names = [
        "n_views",
        "n_cart",
        "n_unique_product",
        "n_unique_category",
        "did_purchase",
    ];
    let mut fields = vec![Field::new(
        "session_start",
        DataType::Timestamp(TimeUnit::Millisecond, None),
        true,
    )];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(start.finish())];
    for (name, builder) in names.iter().zip(counts.iter_mut()) {
        fields.push(Field::new(*name, DataType::Int64, false));
        columns.push(Arc::new(builder.finish()));
    }

    let keep: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| !omit.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?.project(&keep)?;

    let mut writer = ArrowWriter::try_new(File::create(path)?, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Every `*.csv` file directly under `dir`, sorted.
pub fn csv_files(dir: &Path) -> TestResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Rows of a headerless CSV output file, split into fields.
pub fn csv_rows(path: &Path) -> TestResult<Vec<Vec<String>>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect())
}

/// Relative path to contents of every file under `dir`, recursively.
pub fn snapshot(dir: &Path) -> TestResult<Vec<(PathBuf, Vec<u8>)>> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                out.push((path.strip_prefix(dir)?.to_path_buf(), std::fs::read(&path)?));
            }
        }
    }
    out.sort();
    Ok(out)
}
