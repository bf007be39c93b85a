use std::{fs::File, path::Path, sync::Arc};

use arrow::array::{ArrayRef, Int64Builder, RecordBatch, TimestampMillisecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

pub(crate) type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Clone, Debug)]
pub(crate) struct SessionRow {
    pub(crate) start_ms: Option<i64>,
    pub(crate) n_views: i64,
    pub(crate) n_cart: i64,
    pub(crate) n_unique_product: i64,
    pub(crate) n_unique_category: i64,
    pub(crate) did_purchase: bool,
}

impl SessionRow {
    pub(crate) fn at_millis(start_ms: i64) -> Self {
        Self {
            start_ms: Some(start_ms),
            n_views: 4,
            n_cart: 1,
            n_unique_product: 3,
            n_unique_category: 2,
            did_purchase: false,
        }
    }

    pub(crate) fn without_start() -> Self {
        Self {
            start_ms: None,
            ..Self::at_millis(0)
        }
    }

    pub(crate) fn with_counts(mut self, n_views: i64, n_cart: i64) -> Self {
        self.n_views = n_views;
        self.n_cart = n_cart;
        self
    }

    pub(crate) fn purchased(mut self) -> Self {
        self.did_purchase = true;
        self
    }
}

pub(crate) fn utc_millis(y: i32, m: u32, d: u32, h: u32, min: u32) -> TestResult<i64> {
    Ok(Utc
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .ok_or("invalid test datetime")?
        .timestamp_millis())
}

pub(crate) fn session_batch(rows: &[SessionRow]) -> TestResult<RecordBatch> {
    let mut start = TimestampMillisecondBuilder::with_capacity(rows.len());
    let mut views = Int64Builder::with_capacity(rows.len());
    let mut cart = Int64Builder::with_capacity(rows.len());
    let mut products = Int64Builder::with_capacity(rows.len());
    let mut categories = Int64Builder::with_capacity(rows.len());
    let mut purchase = Int64Builder::with_capacity(rows.len());

    for row in rows {
        start.append_option(row.start_ms);
        views.append_value(row.n_views);
        cart.append_value(row.n_cart);
        products.append_value(row.n_unique_product);
        categories.append_value(row.n_unique_category);
        purchase.append_value(i64::from(row.did_purchase));
    }

    let schema = Schema::new(vec![
        Field::new(
            "session_start",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        ),
        Field::new("n_views", DataType::Int64, false),
        Field::new("n_cart", DataType::Int64, false),
        Field::new("n_unique_product", DataType::Int64, false),
        Field::new("n_unique_category", DataType::Int64, false),
        Field::new("did_purchase", DataType::Int64, false),
    ]);

    let columns: Vec<ArrayRef> = vec![
        Arc::new(start.finish()),
        Arc::new(views.finish()),
        Arc::new(cart.finish()),
        Arc::new(products.finish()),
        Arc::new(categories.finish()),
        Arc::new(purchase.finish()),
    ];
    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}

fn write_batch<W: std::io::Write + Send>(sink: W, batch: &RecordBatch) -> TestResult<W> {
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(sink, batch.schema(), Some(props))?;
    writer.write(batch)?;
    Ok(writer.into_inner()?)
}

pub(crate) fn write_sessions_parquet(path: &Path, rows: &[SessionRow]) -> TestResult {
    write_sessions_parquet_without(path, rows, &[])
}

/// Write a session shard with the named columns dropped from its schema.
pub(crate) fn write_sessions_parquet_without(
    path: &Path,
    rows: &[SessionRow],
    omit: &[&str],
) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let batch = session_batch(rows)?;
    let keep: Vec<usize> = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !omit.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    let batch = batch.project(&keep)?;

    write_batch(File::create(path)?, &batch)?;
    Ok(())
}

pub(crate) fn parquet_bytes(rows: &[SessionRow]) -> TestResult<Bytes> {
    let buf = write_batch(Vec::new(), &session_batch(rows)?)?;
    Ok(Bytes::from(buf))
}
