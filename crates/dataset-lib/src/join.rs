//! Cross-source joining
//!
//! Both sides are first collapsed to one row per key tuple with a
//! per-column aggregation policy, then matched with an exact-equality inner
//! join on the composite key. Rows without a counterpart on the other side
//! are dropped.

use crate::align::{kind_name, AlignedTable};
use crate::error::{DatasetError, Result};
use crate::frame::require_columns;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Suffix given to right-side non-key columns whose name the left side
/// already uses
pub const RIGHT_SUFFIX: &str = "_right";

/// How values sharing a key tuple are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Additive counters (energy, bytes transferred, power)
    Sum,
    /// Levels and utilizations
    #[default]
    Mean,
    /// Keep the first non-missing value in row order
    First,
}

impl Aggregation {
    /// Group aggregation of `column`. Missing values are ignored; a sum over
    /// nothing is zero, mean and first over nothing are missing.
    pub fn expr(&self, column: &str) -> Expr {
        match self {
            Aggregation::Sum => col(column).sum(),
            Aggregation::Mean => col(column).mean(),
            Aggregation::First => col(column).drop_nulls().first(),
        }
        .alias(column)
    }
}

/// Aggregation per column, with a fallback for unlisted columns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregationPolicy {
    #[serde(default)]
    pub default: Aggregation,
    #[serde(default)]
    pub overrides: Vec<(String, Aggregation)>,
}

impl AggregationPolicy {
    pub fn uniform(aggregation: Aggregation) -> Self {
        Self {
            default: aggregation,
            overrides: Vec::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, aggregation: Aggregation) -> Self {
        self.overrides.push((column.into(), aggregation));
        self
    }

    pub fn for_column(&self, column: &str) -> Aggregation {
        self.overrides
            .iter()
            .rev()
            .find(|(name, _)| name == column)
            .map(|(_, agg)| *agg)
            .unwrap_or(self.default)
    }
}

fn key_exprs(keys: &[String]) -> Vec<Expr> {
    keys.iter().map(|k| col(k.as_str())).collect()
}

fn sort_by_keys(df: DataFrame, keys: &[String]) -> Result<DataFrame> {
    if keys.is_empty() {
        return Ok(df);
    }
    Ok(df.sort(keys, SortMultipleOptions::default().with_maintain_order(true))?)
}

/// Collapse `df` to one row per `keys` tuple.
///
/// Groups are emitted in ascending key order. Rows with a missing key are
/// skipped. Every non-key column must be numeric and is combined with the
/// policy's aggregation for that column.
pub fn aggregate(df: &DataFrame, keys: &[String], policy: &AggregationPolicy) -> Result<DataFrame> {
    require_columns(df, keys, "table to aggregate")?;
    let mut aggregations = Vec::new();
    for column in df.get_columns() {
        let name = column.name().as_str();
        if keys.iter().any(|k| k == name) {
            continue;
        }
        let dtype = column.dtype();
        if !dtype.is_primitive_numeric() && !matches!(dtype, DataType::Null) {
            return Err(DatasetError::WrongColumnKind {
                column: name.to_string(),
                expected: "numeric",
                actual: kind_name(dtype),
            });
        }
        aggregations.push(
            policy
                .for_column(name)
                .expr(name)
                .cast(DataType::Float64),
        );
    }

    let complete = df.drop_nulls(Some(keys))?;
    let skipped = df.height() - complete.height();
    if skipped > 0 {
        debug!(skipped, "Rows with missing keys excluded from aggregation");
    }

    let grouped = complete
        .lazy()
        .group_by(key_exprs(keys))
        .agg(aggregations)
        .collect()?;
    sort_by_keys(grouped, keys)
}

/// Exact-match inner join on `keys`.
///
/// Output rows are ordered by key. Key columns appear once, in the left
/// side's column order, followed by the right side's non-key columns. A
/// right column whose name the left side already uses gets
/// [`RIGHT_SUFFIX`].
pub fn inner_join(left: &DataFrame, right: &DataFrame, keys: &[String]) -> Result<DataFrame> {
    require_columns(left, keys, "left side of join")?;
    require_columns(right, keys, "right side of join")?;

    let joined = left
        .clone()
        .lazy()
        .join(
            right.clone().lazy(),
            key_exprs(keys),
            key_exprs(keys),
            JoinArgs::new(JoinType::Inner).with_suffix(Some(RIGHT_SUFFIX.into())),
        )
        .collect()?;
    sort_by_keys(joined, keys)
}

/// Aggregate both aligned sides by `keys`, then inner join them.
///
/// Both tables must have been floored to the same bucket.
pub fn join_aligned(
    left: &AlignedTable,
    right: &AlignedTable,
    keys: &[String],
    left_policy: &AggregationPolicy,
    right_policy: &AggregationPolicy,
) -> Result<DataFrame> {
    if left.bucket() != right.bucket() {
        return Err(DatasetError::BucketMismatch {
            left: left.bucket().as_duration(),
            right: right.bucket().as_duration(),
        });
    }
    let left_grouped = aggregate(left.frame(), keys, left_policy)?;
    let right_grouped = aggregate(right.frame(), keys, right_policy)?;
    debug!(
        left_rows = left_grouped.height(),
        right_rows = right_grouped.height(),
        "Sides aggregated for join"
    );
    inner_join(&left_grouped, &right_grouped, keys)
}
