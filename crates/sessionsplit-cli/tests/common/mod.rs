use std::{fs::File, ops::Range, path::Path, sync::Arc};

use arrow::array::{ArrayRef, Int64Array, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Write a session shard with one session per second in `secs`.
///
/// Every third session is a purchase. With `with_start == false` the
/// `session_start` column is left out.
pub fn write_session_shard(path: &Path, secs: Range<i64>, with_start: bool) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let n = secs.clone().count();
    let ints = |f: &dyn Fn(i64) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from_iter_values(secs.clone().map(f)))
    };

    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();
    if with_start {
        fields.push(Field::new(
            "session_start",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ));
        columns.push(Arc::new(TimestampMillisecondArray::from_iter_values(
            secs.clone().map(|s| s * 1_000),
        )));
    }
    for (name, values) in [
        ("n_views", ints(&|s| s % 5)),
        ("n_cart", ints(&|s| s % 3)),
        ("n_unique_product", ints(&|_| 2)),
        ("n_unique_category", ints(&|_| 1)),
        ("did_purchase", ints(&|s| i64::from(s % 3 == 0))),
    ] {
        fields.push(Field::new(name, DataType::Int64, false));
        columns.push(values);
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    assert_eq!(batch.num_rows(), n);
    let mut writer = ArrowWriter::try_new(File::create(path)?, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
