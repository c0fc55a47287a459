//! DataFrame helpers shared by every pipeline stage
//!
//! Stages exchange polars [`DataFrame`]s. Timestamps are naive UTC
//! datetimes in microseconds, entity keys are strings and metric values are
//! `f64`. This module owns the CSV boundary: raw cells are read as strings
//! and parsed here so that malformed values surface as [`DatasetError`]s
//! naming the offending cell.

use crate::error::{DatasetError, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use polars::prelude::*;
use std::fs::File;
use std::num::ParseFloatError;
use std::path::Path;

/// In-memory representation of timestamp columns
pub const TIME_UNIT: TimeUnit = TimeUnit::Microseconds;

/// Layout of timestamps in written CSV files
const CSV_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

pub fn time_dtype() -> DataType {
    DataType::Datetime(TIME_UNIT, None)
}

/// Zero-row frame with `time_column` as timestamps and `text_columns` as
/// strings
pub fn empty_frame(time_column: &str, text_columns: &[String]) -> DataFrame {
    let mut schema = Schema::with_capacity(1 + text_columns.len());
    schema.insert(time_column.into(), time_dtype());
    for name in text_columns {
        schema.insert(name.into(), DataType::String);
    }
    DataFrame::empty_with_schema(&schema)
}

/// Read every column of a CSV file as strings
pub(crate) fn read_raw_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| DatasetError::csv(path, e))
}

/// Read a wide table written by [`write_csv`]. The time column is parsed as
/// timestamps, `text_columns` stay strings and every other column must be
/// numeric.
pub fn read_csv(path: &Path, time_column: &str, text_columns: &[String]) -> Result<DataFrame> {
    let raw = read_raw_csv(path)?;
    let context = path.display().to_string();
    let columns = raw
        .get_columns()
        .iter()
        .map(|column| {
            let name = column.name().as_str();
            if name == time_column {
                parse_time_column(column, &context)
            } else if text_columns.iter().any(|t| t == name) {
                Ok(column.clone())
            } else {
                parse_number_column(column, false, &context)
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DataFrame::new(columns)?)
}

/// Write with a header row, comma separated, no index column. Missing
/// cells are written empty.
pub fn write_csv(path: &Path, df: &DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
        }
    }
    let mut file = File::create(path).map_err(|e| DatasetError::io(path, e))?;
    let mut df = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_datetime_format(Some(CSV_DATETIME_FORMAT.to_string()))
        .finish(&mut df)
        .map_err(|e| DatasetError::csv(path, e))
}

/// Parse a string column into timestamps. Empty cells are missing, any
/// other unparsable cell is an error.
pub(crate) fn parse_time_column(column: &Column, context: &str) -> Result<Column> {
    let raw = column.str()?;
    let micros = raw
        .into_iter()
        .map(|cell| {
            let parsed = cell
                .map(|cell| parse_optional_timestamp(cell, context))
                .transpose()?
                .flatten();
            Ok(parsed.map(|ts| ts.timestamp_micros()))
        })
        .collect::<Result<Vec<Option<i64>>>>()?;
    Ok(Int64Chunked::from_iter_options(column.name().clone(), micros.into_iter())
        .into_datetime(TIME_UNIT, None)
        .into_column())
}

/// Turn empty and whitespace-only cells of a string column into missing
/// cells
pub(crate) fn blank_to_null(column: &Column) -> Result<Column> {
    let cleaned: StringChunked = column
        .str()?
        .into_iter()
        .map(|cell| cell.filter(|c| !c.trim().is_empty()))
        .collect();
    Ok(cleaned.with_name(column.name().clone()).into_column())
}

/// Parse a string column into numbers. Empty cells and NaN are missing. A
/// non-numeric cell becomes missing when `coerce` is set and is an error
/// otherwise.
pub(crate) fn parse_number_column(column: &Column, coerce: bool, context: &str) -> Result<Column> {
    let raw = column.str()?;
    let values = raw
        .into_iter()
        .map(|cell| match cell.map(parse_number).transpose() {
            Ok(value) => Ok(value.flatten()),
            Err(_) if coerce => Ok(None),
            Err(_) => Err(DatasetError::InvalidValue {
                column: column.name().to_string(),
                value: cell.unwrap_or_default().to_string(),
                context: context.to_string(),
            }),
        })
        .collect::<Result<Vec<Option<f64>>>>()?;
    Ok(Float64Chunked::from_iter_options(column.name().clone(), values.into_iter()).into_column())
}

/// Make sure `name` exists. A zero-row frame gets an empty column of
/// `dtype`; a frame with rows fails with [`DatasetError::MissingColumn`].
pub fn ensure_column(
    df: &mut DataFrame,
    name: &str,
    dtype: &DataType,
    context: &str,
) -> Result<()> {
    if has_column(df, name) {
        return Ok(());
    }
    if df.height() == 0 {
        df.with_column(Column::new_empty(name.into(), dtype))?;
        return Ok(());
    }
    Err(DatasetError::missing_column(name, context))
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

/// Fail with [`DatasetError::MissingColumn`] unless every name is present
pub fn require_columns(df: &DataFrame, names: &[String], context: &str) -> Result<()> {
    match names.iter().find(|n| !has_column(df, n)) {
        Some(missing) => Err(DatasetError::missing_column(missing, context)),
        None => Ok(()),
    }
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names_str()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Cells of a numeric column
pub fn numbers(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(df.column(name)?.f64()?.into_iter().collect())
}

/// Cells of a string column
pub fn texts(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Cells of a timestamp column
pub fn times(df: &DataFrame, name: &str) -> Result<Vec<Option<DateTime<Utc>>>> {
    Ok(df
        .column(name)?
        .datetime()?
        .physical()
        .into_iter()
        .map(|v| v.and_then(DateTime::from_timestamp_micros))
        .collect())
}

/// Build a timestamp column from parsed instants
pub fn time_column(name: &str, values: &[Option<DateTime<Utc>>]) -> Column {
    Int64Chunked::from_iter_options(
        name.into(),
        values.iter().map(|v| v.map(|ts| ts.timestamp_micros())),
    )
    .into_datetime(TIME_UNIT, None)
    .into_column()
}

/// Parse a numeric cell. Empty cells and NaN are missing.
pub(crate) fn parse_number(raw: &str) -> std::result::Result<Option<f64>, ParseFloatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: f64 = trimmed.parse()?;
    Ok((!value.is_nan()).then_some(value))
}

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse the timestamp layouts found in monitoring exports: RFC 3339,
/// space-separated with offset, or naive (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

pub(crate) fn parse_optional_timestamp(raw: &str, context: &str) -> Result<Option<DateTime<Utc>>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_timestamp(raw)
        .map(Some)
        .ok_or_else(|| DatasetError::InvalidTimestamp {
            value: raw.to_string(),
            context: context.to_string(),
        })
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
