//! Column names, the fixed output schema, and the two output partitions.

use std::{
    fmt,
    sync::{Arc, LazyLock},
};

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};

use crate::shard::ShardId;

/// Default name of the session start timestamp column.
pub const SESSION_START: &str = "session_start";
/// Default name of the purchase label column.
pub const DID_PURCHASE: &str = "did_purchase";
/// Default name of the view count column.
pub const N_VIEWS: &str = "n_views";
/// Default name of the cart-add count column.
pub const N_CART: &str = "n_cart";
/// Default name of the unique product count column.
pub const N_UNIQUE_PRODUCT: &str = "n_unique_product";
/// Default name of the unique category count column.
pub const N_UNIQUE_CATEGORY: &str = "n_unique_category";

/// Output feature columns, in file order. The label follows as the last column.
pub const FEATURE_COLUMNS: [&str; 8] = [
    "n_views",
    "n_cart",
    "n_unique_product",
    "n_unique_category",
    "session_hour",
    "session_weekday",
    "is_weekend",
    "cart_to_view_ratio",
];

/// Output label column, always last.
pub const LABEL_COLUMN: &str = "did_purchase";

static OUTPUT_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    let mut fields: Vec<Field> = FEATURE_COLUMNS
        .iter()
        .map(|name| {
            let data_type = if *name == "cart_to_view_ratio" {
                DataType::Float64
            } else {
                DataType::Int64
            };
            Field::new(*name, data_type, true)
        })
        .collect();
    fields.push(Field::new(LABEL_COLUMN, DataType::Int64, true));
    Arc::new(Schema::new(fields))
});

/// Schema of every train/test output batch: 8 features then the label.
pub fn output_schema() -> SchemaRef {
    Arc::clone(&OUTPUT_SCHEMA)
}

/// Names of the raw input columns the pipeline reads.
///
/// Defaults match the upstream session export; override individual names when
/// a corpus uses different ones. Output column names never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionColumns {
    /// Session start timestamp (drives the cutoff and the partition).
    pub time: String,
    /// Purchase label (0/1 or boolean).
    pub label: String,
    /// View count.
    pub n_views: String,
    /// Cart-add count.
    pub n_cart: String,
    /// Unique product count.
    pub n_unique_product: String,
    /// Unique category count.
    pub n_unique_category: String,
}

impl Default for SessionColumns {
    fn default() -> Self {
        Self {
            time: SESSION_START.to_string(),
            label: DID_PURCHASE.to_string(),
            n_views: N_VIEWS.to_string(),
            n_cart: N_CART.to_string(),
            n_unique_product: N_UNIQUE_PRODUCT.to_string(),
            n_unique_category: N_UNIQUE_CATEGORY.to_string(),
        }
    }
}

impl SessionColumns {
    /// Raw count columns copied through as the first four features.
    pub fn counts(&self) -> [&str; 4] {
        [
            &self.n_views,
            &self.n_cart,
            &self.n_unique_product,
            &self.n_unique_category,
        ]
    }

    /// Every raw column a shard must carry to be transformed.
    pub fn required(&self) -> Vec<&str> {
        let mut cols = vec![self.time.as_str()];
        cols.extend(self.counts());
        cols.push(&self.label);
        cols
    }
}

/// One of the two disjoint output destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Records that started strictly before the cutoff.
    Train,
    /// Records at or after the cutoff.
    Test,
}

impl Partition {
    /// Both partitions, train first.
    pub const ALL: [Partition; 2] = [Partition::Train, Partition::Test];

    /// Directory (and file prefix) used for this partition.
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Test => "test",
        }
    }

    /// Output file name for a shard: `{partition}_{shard}.csv`.
    pub fn file_name(self, shard: &ShardId) -> String {
        format!("{}_{}.csv", self.as_str(), shard)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
