//! Derived columns added right after pivoting, before sources are combined

use crate::error::Result;
use crate::frame::has_column;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Source-specific columns computed from freshly pivoted metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enrichment {
    /// Gigabyte views and usage percentage of `disk_free` / `disk_total`
    DiskCapacity,
}

impl Enrichment {
    /// Add the derived columns. Columns whose inputs are absent are simply
    /// not added.
    pub fn apply(&self, df: DataFrame) -> Result<DataFrame> {
        match self {
            Enrichment::DiskCapacity => disk_capacity(df),
        }
    }
}

fn disk_capacity(df: DataFrame) -> Result<DataFrame> {
    let has_free = has_column(&df, "disk_free");
    let has_total = has_column(&df, "disk_total");

    let mut derived = Vec::new();
    if has_free {
        derived.push((col("disk_free") / lit(BYTES_PER_GIB)).alias("disk_free_gb"));
    }
    if has_total {
        derived.push((col("disk_total") / lit(BYTES_PER_GIB)).alias("disk_total_gb"));
    }
    if has_free && has_total {
        let free = || col("disk_free");
        let total = || col("disk_total");
        derived.push(((total() - free()) / lit(BYTES_PER_GIB)).alias("disk_used_gb"));
        derived.push(
            when(total().gt(lit(0.0)))
                .then(lit(100.0) * (lit(1.0) - free() / total()))
                .otherwise(lit(NULL).cast(DataType::Float64))
                .alias("disk_usage_percent"),
        );
    }
    if derived.is_empty() {
        return Ok(df);
    }
    Ok(df.lazy().with_columns(derived).collect()?)
}
