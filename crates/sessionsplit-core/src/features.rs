//! Feature derivation and train/test routing for one shard (pass 2).
//!
//! For every record the transformer emits the four raw counts, the session's
//! hour of day and weekday, a weekend flag, and the cart-to-view ratio,
//! followed by the purchase label, in the column order of
//! [`output_schema`]. Each record then goes to exactly one side of the split:
//! train iff its start time is strictly before the [`GlobalCutoff`].
//!
//! Row order within each side follows the source file. Shards lacking the
//! time or the label column contribute nothing and are not an error; any
//! other problem fails the whole shard so no partial output is produced.

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, RecordBatch},
    compute::{
        cast, concat_batches, filter_record_batch,
        kernels::temporal::{DatePart, date_part},
    },
    datatypes::{DataType, Float64Type, Int64Type},
};
use bytes::Bytes;
use log::debug;
use parquet::arrow::{ProjectionMask, arrow_reader::ParquetRecordBatchReaderBuilder};
use snafu::prelude::*;

use crate::{
    columns::{Partition, SessionColumns, output_schema},
    cutoff::GlobalCutoff,
    error::{
        ArrowSnafu, MissingColumnSnafu, NonIntegralValueSnafu, ParquetReadSnafu, ShardResult,
        UnsupportedColumnTypeSnafu,
    },
    shard::{Shard, run_blocking},
    timestamps::{cast_strict, to_epoch_nanos},
};

/// The two disjoint row sets derived from one shard, both in output schema.
#[derive(Debug, Clone)]
pub struct FeatureSplit {
    train: RecordBatch,
    test: RecordBatch,
}

impl FeatureSplit {
    /// Rows whose session started before the cutoff.
    pub fn train(&self) -> &RecordBatch {
        &self.train
    }

    /// Rows whose session started at or after the cutoff (or has no start).
    pub fn test(&self) -> &RecordBatch {
        &self.test
    }

    /// The row set routed to `partition`.
    pub fn partition(&self, partition: Partition) -> &RecordBatch {
        match partition {
            Partition::Train => &self.train,
            Partition::Test => &self.test,
        }
    }

    /// Total rows across both sides.
    pub fn total_rows(&self) -> usize {
        self.train.num_rows() + self.test.num_rows()
    }
}

/// Read `shard` and split its derived features around `cutoff`.
///
/// Returns `Ok(None)` when the shard lacks the time or label column.
pub async fn transform_shard(
    shard: &Shard,
    cutoff: GlobalCutoff,
    columns: &SessionColumns,
) -> ShardResult<Option<FeatureSplit>> {
    let data = shard.read_bytes().await?;
    let path = shard.display_path();
    let task_path = path.clone();
    let columns = columns.clone();
    run_blocking(&path, move || {
        transform_parquet_bytes(&task_path, data, cutoff, &columns)
    })
    .await
}

/// Decode an in-memory Parquet shard and split its derived features.
pub fn transform_parquet_bytes(
    path: &str,
    data: Bytes,
    cutoff: GlobalCutoff,
    columns: &SessionColumns,
) -> ShardResult<Option<FeatureSplit>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data).context(ParquetReadSnafu { path })?;
    let schema = Arc::clone(builder.schema());

    for gate in [&columns.time, &columns.label] {
        if schema.index_of(gate).is_err() {
            debug!("{path}: no {gate} column, contributes nothing");
            return Ok(None);
        }
    }

    let mut indices = Vec::with_capacity(6);
    for name in columns.required() {
        let idx = schema
            .index_of(name)
            .map_err(|_| MissingColumnSnafu { path, column: name }.build())?;
        indices.push(idx);
    }
    indices.sort_unstable();
    indices.dedup();

    let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
    let reader = builder
        .with_projection(mask)
        .build()
        .context(ParquetReadSnafu { path })?;

    let mut train = Vec::new();
    let mut test = Vec::new();
    for batch in reader {
        let batch = batch.context(ArrowSnafu { path })?;
        let split = transform_batch(path, &batch, cutoff, columns)?;
        train.push(split.train);
        test.push(split.test);
    }

    let out_schema = output_schema();
    Ok(Some(FeatureSplit {
        train: concat_batches(&out_schema, &train).context(ArrowSnafu { path })?,
        test: concat_batches(&out_schema, &test).context(ArrowSnafu { path })?,
    }))
}

/// Derive features for one decoded batch and split it around `cutoff`.
///
/// `batch` must carry every column of [`SessionColumns::required`].
pub fn transform_batch(
    path: &str,
    batch: &RecordBatch,
    cutoff: GlobalCutoff,
    columns: &SessionColumns,
) -> ShardResult<FeatureSplit> {
    let start = to_epoch_nanos(path, &columns.time, column(path, batch, &columns.time)?)?;
    let n_views = int64_column(path, batch, &columns.n_views)?;
    let n_cart = int64_column(path, batch, &columns.n_cart)?;
    let n_unique_product = int64_column(path, batch, &columns.n_unique_product)?;
    let n_unique_category = int64_column(path, batch, &columns.n_unique_category)?;
    let label = int64_column(path, batch, &columns.label)?;

    let hour = calendar_field(path, &start, DatePart::Hour)?;
    let weekday = calendar_field(path, &start, DatePart::DayOfWeekMonday0)?;
    let is_weekend = weekday.unary::<_, Int64Type>(|day| i64::from(day >= 5));
    let ratio = cart_to_view_ratio(&n_views, &n_cart);

    let features = RecordBatch::try_new(
        output_schema(),
        vec![
            Arc::new(n_views) as ArrayRef,
            Arc::new(n_cart),
            Arc::new(n_unique_product),
            Arc::new(n_unique_category),
            Arc::new(hour),
            Arc::new(weekday),
            Arc::new(is_weekend),
            Arc::new(ratio),
            Arc::new(label),
        ],
    )
    .context(ArrowSnafu { path })?;

    // Null start times compare as "not before", so they land in test.
    let train_flags: Vec<bool> = start
        .iter()
        .map(|ts| ts.is_some_and(|t| cutoff.is_train(t)))
        .collect();
    let test_mask = BooleanArray::from(train_flags.iter().map(|f| !f).collect::<Vec<_>>());
    let train_mask = BooleanArray::from(train_flags);

    Ok(FeatureSplit {
        train: filter_record_batch(&features, &train_mask).context(ArrowSnafu { path })?,
        test: filter_record_batch(&features, &test_mask).context(ArrowSnafu { path })?,
    })
}

/// `n_cart / n_views`, with a zero view count treated as 1.
///
/// A zero-view session therefore yields its cart count, never NaN or
/// infinity. A null in either input gives a null ratio.
pub fn cart_to_view_ratio(n_views: &Int64Array, n_cart: &Int64Array) -> Float64Array {
    n_views
        .iter()
        .zip(n_cart.iter())
        .map(|(views, cart)| {
            let (views, cart) = (views?, cart?);
            let denom = if views == 0 { 1 } else { views };
            Some(cart as f64 / denom as f64)
        })
        .collect()
}

fn column<'a>(path: &str, batch: &'a RecordBatch, name: &str) -> ShardResult<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .context(MissingColumnSnafu { path, column: name })
}

/// Cast a numeric or boolean column to `Int64`.
///
/// Float columns are accepted only when every value is a whole number, and a
/// value outside the `Int64` range fails the shard.
fn int64_column(path: &str, batch: &RecordBatch, name: &str) -> ShardResult<Int64Array> {
    let array = column(path, batch, name)?;
    let dt = array.data_type();
    ensure!(
        dt.is_integer() || dt.is_floating() || *dt == DataType::Boolean,
        UnsupportedColumnTypeSnafu {
            path,
            column: name,
            datatype: dt.to_string(),
        }
    );
    if dt.is_floating() {
        let floats = cast(array, &DataType::Float64).context(ArrowSnafu { path })?;
        let fractional = floats
            .as_primitive::<Float64Type>()
            .iter()
            .flatten()
            .any(|v| v.fract() != 0.0);
        ensure!(!fractional, NonIntegralValueSnafu { path, column: name });
    }
    let converted = cast_strict(path, array, &DataType::Int64)?;
    Ok(converted.as_primitive::<Int64Type>().clone())
}

/// Extract a calendar field in the column's own timezone as `Int64`.
fn calendar_field(path: &str, start: &dyn Array, part: DatePart) -> ShardResult<Int64Array> {
    let field = date_part(start, part).context(ArrowSnafu { path })?;
    let field = cast(&field, &DataType::Int64).context(ArrowSnafu { path })?;
    Ok(field.as_primitive::<Int64Type>().clone())
}
