//! Extract the session start column from a shard (pass 1).
//!
//! Only the time column is projected out of the Parquet file, so the memory
//! held per shard after decoding is one `i64` per non-null timestamp. Values
//! are normalized to nanoseconds since the Unix epoch (UTC instant) whatever
//! the on-disk unit or timezone annotation is.
//!
//! Accepted Arrow types for the time column:
//! - `Timestamp` in any unit, with or without a timezone,
//! - `Date32` / `Date64` (midnight UTC),
//! - `Utf8` / `LargeUtf8` holding ISO-8601 strings.
//!
//! A non-null value that cannot be converted fails the whole shard; it is
//! never turned into a null.

use arrow::{
    array::{Array, ArrayRef, AsArray, TimestampNanosecondArray},
    compute::{CastOptions, cast_with_options},
    datatypes::{DataType, TimeUnit, TimestampNanosecondType},
};
use bytes::Bytes;
use parquet::arrow::{ProjectionMask, arrow_reader::ParquetRecordBatchReaderBuilder};
use snafu::prelude::*;

use crate::{
    error::{ArrowSnafu, ParquetReadSnafu, ShardResult, UnsupportedColumnTypeSnafu},
    shard::{Shard, run_blocking},
};

/// Collect every non-null start timestamp of `shard`, in file order.
///
/// Returns `Ok(None)` when the shard has no `time_column`; such shards do not
/// take part in cutoff estimation. Read and decode failures are returned as
/// errors for the caller to log and skip.
pub async fn collect_timestamps(shard: &Shard, time_column: &str) -> ShardResult<Option<Vec<i64>>> {
    let data = shard.read_bytes().await?;
    let path = shard.display_path();
    let column = time_column.to_string();
    let task_path = path.clone();
    run_blocking(&path, move || {
        timestamps_from_parquet_bytes(&task_path, &column, data)
    })
    .await
}

/// Decode the time column out of an in-memory Parquet file.
pub fn timestamps_from_parquet_bytes(
    path: &str,
    time_column: &str,
    data: Bytes,
) -> ShardResult<Option<Vec<i64>>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data).context(ParquetReadSnafu { path })?;

    let Ok(time_idx) = builder.schema().index_of(time_column) else {
        return Ok(None);
    };

    let mask = ProjectionMask::roots(builder.parquet_schema(), [time_idx]);
    let reader = builder
        .with_projection(mask)
        .build()
        .context(ParquetReadSnafu { path })?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.context(ArrowSnafu { path })?;
        let nanos = to_epoch_nanos(path, time_column, batch.column(0))?;
        if nanos.null_count() == 0 {
            out.extend_from_slice(nanos.values());
        } else {
            out.extend(nanos.iter().flatten());
        }
    }

    Ok(Some(out))
}

/// Normalize a time column to nanosecond timestamps, keeping its timezone.
///
/// The timezone annotation is preserved so calendar fields (hour, weekday)
/// can later be read in the zone the data was recorded in; the underlying
/// values are UTC instants either way.
pub(crate) fn to_epoch_nanos(
    path: &str,
    column: &str,
    array: &ArrayRef,
) -> ShardResult<TimestampNanosecondArray> {
    let target = match array.data_type() {
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            return Ok(array.as_primitive::<TimestampNanosecondType>().clone());
        }
        DataType::Timestamp(_, tz) => DataType::Timestamp(TimeUnit::Nanosecond, tz.clone()),
        DataType::Date32 | DataType::Date64 | DataType::Utf8 | DataType::LargeUtf8 => {
            DataType::Timestamp(TimeUnit::Nanosecond, None)
        }
        other => {
            return UnsupportedColumnTypeSnafu {
                path,
                column,
                datatype: other.to_string(),
            }
            .fail();
        }
    };

    let converted = cast_strict(path, array, &target)?;
    Ok(converted.as_primitive::<TimestampNanosecondType>().clone())
}

/// `cast` that fails on a value it cannot represent instead of nulling it.
pub(crate) fn cast_strict(path: &str, array: &dyn Array, to: &DataType) -> ShardResult<ArrayRef> {
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(array, to, &options).context(ArrowSnafu { path })
}
