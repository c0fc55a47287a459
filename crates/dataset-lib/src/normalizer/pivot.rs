//! Long-to-wide pivoting of raw exports
//!
//! A raw export holds one row per (timestamp, entity, metric-name, value).
//! Pivoting turns it into one row per (timestamp, entity) with one column
//! per metric name, combining duplicate observations with the source's
//! aggregation (mean unless configured otherwise).

use super::SourceSpec;
use crate::error::{DatasetError, Result};
use crate::frame::{
    blank_to_null, empty_frame, parse_number_column, parse_time_column, read_raw_csv,
    require_columns,
};
use crate::join::Aggregation;
use crate::models::{FIELD_COLUMN, TIME_COLUMN, VALUE_COLUMN};
use polars::lazy::frame::pivot::pivot_stable;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, warn};

fn index_columns(pivot_keys: &[String]) -> Vec<String> {
    std::iter::once(TIME_COLUMN.to_string())
        .chain(pivot_keys.iter().cloned())
        .collect()
}

/// Parse a raw export file into a long frame of `_time`, the pivot keys,
/// `_field` and `_value`.
///
/// Rows lacking a timestamp, an entity key value or a metric name cannot be
/// placed in the wide table and are skipped. A value that is not a number
/// becomes missing when the source coerces values, and is an error
/// otherwise.
pub fn read_long_file(path: &Path, spec: &SourceSpec) -> Result<DataFrame> {
    let context = path.display().to_string();
    let raw = read_raw_csv(path)?;

    let mut wanted = index_columns(&spec.pivot_keys);
    wanted.push(FIELD_COLUMN.to_string());
    require_columns(&raw, &wanted, &context)?;
    require_columns(&raw, &[VALUE_COLUMN.to_string()], &context)?;

    let mut columns = Vec::with_capacity(wanted.len() + 1);
    columns.push(parse_time_column(raw.column(TIME_COLUMN)?, &context)?);
    for name in &wanted[1..] {
        columns.push(blank_to_null(raw.column(name)?)?);
    }
    columns.push(raw.column(VALUE_COLUMN)?.clone());
    let located = DataFrame::new(columns)?;

    let long = located.drop_nulls(Some(wanted.as_slice()))?;
    let skipped = located.height() - long.height();
    if skipped > 0 {
        warn!(
            file = %context,
            skipped,
            "Rows without timestamp, entity key or metric name skipped"
        );
    }

    let values = parse_number_column(long.column(VALUE_COLUMN)?, spec.coerce_numeric, &context)?;
    let mut long = long;
    long.with_column(values)?;
    Ok(long)
}

/// Pivot a long frame into a wide one.
///
/// Output columns are `_time`, the pivot keys, then one numeric column per
/// metric name in lexicographic order. Rows are ordered by (time, keys).
/// Metric columns with no value at all are dropped, as are rows with no
/// value in any metric column.
pub fn pivot(
    long: &DataFrame,
    pivot_keys: &[String],
    aggregation: Aggregation,
) -> Result<DataFrame> {
    let index = index_columns(pivot_keys);
    for field in long.column(FIELD_COLUMN)?.str()?.into_iter().flatten() {
        if index.iter().any(|name| name == field) {
            return Err(DatasetError::DuplicateColumn(field.to_string()));
        }
    }

    let observed = long.drop_nulls(Some([VALUE_COLUMN.to_string()].as_slice()))?;
    let missing = long.height() - observed.height();
    if missing > 0 {
        debug!(missing, "Observations without a value ignored");
    }
    if observed.height() == 0 {
        return Ok(empty_frame(TIME_COLUMN, pivot_keys));
    }

    let group_keys: Vec<Expr> = index
        .iter()
        .map(String::as_str)
        .chain([FIELD_COLUMN])
        .map(col)
        .collect();
    let collapsed = observed
        .lazy()
        .group_by_stable(group_keys)
        .agg([aggregation.expr(VALUE_COLUMN)])
        .collect()?;

    let wide = pivot_stable(
        &collapsed,
        [FIELD_COLUMN],
        Some(index.clone()),
        Some([VALUE_COLUMN]),
        true,
        None,
        None,
    )?;
    Ok(wide.sort(index, SortMultipleOptions::default().with_maintain_order(true))?)
}
