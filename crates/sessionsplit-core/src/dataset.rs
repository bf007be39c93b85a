//! Reader for the partition files, as consumed by the downstream trainer.
//!
//! A partition directory holds headerless CSV files with eight feature columns
//! followed by the label. The trainer reads every `*.csv` file in the
//! directory, parses all values as `f32` and treats empty fields as missing
//! (`NaN`). The trained model is saved as [`MODEL_FILE_NAME`] in its model
//! directory.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{Array, AsArray},
    datatypes::{DataType, Field, Float32Type, Schema, SchemaRef},
    error::ArrowError,
};
use arrow_csv::{ReaderBuilder, reader::Format};
use snafu::{Backtrace, prelude::*};

use crate::columns::{FEATURE_COLUMNS, LABEL_COLUMN};

/// Number of feature columns in each partition file.
pub const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();

/// File name of the serialized model inside the model directory.
pub const MODEL_FILE_NAME: &str = "xgboost-model";

/// Where the trainer stores its model under `model_dir`.
pub fn model_path(model_dir: &Path) -> PathBuf {
    model_dir.join(MODEL_FILE_NAME)
}

/// Errors while loading a partition directory.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatasetError {
    /// The directory could not be listed.
    #[snafu(display("Cannot list {path}: {source}"))]
    ListDir {
        /// Directory being listed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The directory holds no CSV files.
    #[snafu(display("There are no files in {path}"))]
    NoCsvFiles {
        /// Directory searched.
        path: String,
    },

    /// A CSV file could not be opened.
    #[snafu(display("Cannot open {path}: {source}"))]
    OpenCsv {
        /// CSV file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A CSV file could not be parsed.
    #[snafu(display("Cannot parse {path}: {source}"))]
    ReadCsv {
        /// CSV file.
        path: String,
        /// Underlying Arrow CSV error.
        source: ArrowError,
    },

    /// A CSV file does not have eight features plus a label.
    #[snafu(display("{path} has {found} columns, expected {expected}"))]
    ColumnCount {
        /// CSV file.
        path: String,
        /// Columns found on the first line.
        found: usize,
        /// Columns expected.
        expected: usize,
    },
}

/// Features and labels of one partition, in file-name then row order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureDataset {
    /// One feature vector per row.
    pub features: Vec<[f32; FEATURE_COUNT]>,
    /// One label per row.
    pub labels: Vec<f32>,
}

fn csv_schema() -> SchemaRef {
    let fields: Vec<Field> = FEATURE_COLUMNS
        .iter()
        .chain(std::iter::once(&LABEL_COLUMN))
        .map(|name| Field::new(*name, DataType::Float32, true))
        .collect();
    Arc::new(Schema::new(fields))
}

impl FeatureDataset {
    /// Load every `*.csv` file directly under `dir`, sorted by file name.
    pub fn load_dir(dir: &Path) -> Result<Self, DatasetError> {
        let dir_str = dir.display().to_string();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).context(ListDirSnafu { path: &dir_str })? {
            let path = entry.context(ListDirSnafu { path: &dir_str })?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
                files.push(path);
            }
        }
        ensure!(!files.is_empty(), NoCsvFilesSnafu { path: dir_str });
        files.sort();

        let mut dataset = Self::default();
        for file in &files {
            dataset.append_file(file)?;
        }
        Ok(dataset)
    }

    fn append_file(&mut self, file: &Path) -> Result<(), DatasetError> {
        let path = file.display().to_string();
        let data = std::fs::read(file).context(OpenCsvSnafu { path: &path })?;
        if data.is_empty() {
            return Ok(());
        }

        let (inferred, _) = Format::default()
            .with_header(false)
            .infer_schema(Cursor::new(data.as_slice()), Some(1))
            .context(ReadCsvSnafu { path: &path })?;
        let expected = FEATURE_COUNT + 1;
        ensure!(
            inferred.fields().len() == expected,
            ColumnCountSnafu {
                path: &path,
                found: inferred.fields().len(),
                expected,
            }
        );

        let reader = ReaderBuilder::new(csv_schema())
            .with_header(false)
            .build(Cursor::new(data.as_slice()))
            .context(ReadCsvSnafu { path: &path })?;

        for batch in reader {
            let batch = batch.context(ReadCsvSnafu { path: &path })?;
            let columns: Vec<_> = batch
                .columns()
                .iter()
                .map(|c| c.as_primitive::<Float32Type>())
                .collect();
            for row in 0..batch.num_rows() {
                let value = |col: usize| {
                    let array = columns[col];
                    if array.is_null(row) {
                        f32::NAN
                    } else {
                        array.value(row)
                    }
                };
                self.features.push(std::array::from_fn(|col| value(col)));
                self.labels.push(value(FEATURE_COUNT));
            }
        }
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Share of rows labelled 1, or `None` for an empty dataset.
    pub fn positive_rate(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let positives = self.labels.iter().filter(|l| **l == 1.0).count();
        Some(positives as f64 / self.len() as f64)
    }
}
