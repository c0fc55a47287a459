//! Time alignment
//!
//! Floors every timestamp of a frame to a fixed bucket so that time values
//! from different sources become exact join keys. Flooring never aggregates:
//! rows that collapse onto the same (bucket, entity) are resolved later by
//! the joiner's per-column aggregation.

use crate::error::{DatasetError, Result};
use crate::frame::time_dtype;
use crate::models::TIME_COLUMN;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default alignment bucket (one minute)
pub const DEFAULT_BUCKET: Duration = Duration::from_secs(60);

/// Width of the buckets timestamps are floored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketWidth(Duration);

impl BucketWidth {
    /// Widths below one microsecond cannot be represented by the time
    /// columns and are rejected
    pub fn new(width: Duration) -> Result<Self> {
        if width.as_micros() == 0 {
            return Err(DatasetError::InvalidBucket(format!("{:?}", width)));
        }
        Ok(Self(width))
    }

    pub fn from_secs(secs: u64) -> Result<Self> {
        Self::new(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Bucket length in seconds, the divisor turning per-bucket energy into
    /// average power
    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }
}

impl Default for BucketWidth {
    fn default() -> Self {
        Self(DEFAULT_BUCKET)
    }
}

impl FromStr for BucketWidth {
    type Err = DatasetError;

    /// Accepts `<n><unit>` with unit one of `ms`, `s`, `min`/`m`/`T`, `h`,
    /// `d` (`"1min"`, `"30s"`, `"5T"`). A bare number means seconds.
    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (amount, unit) = raw.split_at(split);
        let amount: u64 = if amount.is_empty() && !unit.is_empty() {
            1
        } else {
            amount
                .parse()
                .map_err(|_| DatasetError::InvalidBucket(s.to_string()))?
        };
        let invalid = || DatasetError::InvalidBucket(s.to_string());
        let seconds = |factor: u64| amount.checked_mul(factor).ok_or_else(invalid);
        let width = match unit.trim() {
            "ms" => Duration::from_millis(amount),
            "" | "s" | "sec" | "S" => Duration::from_secs(amount),
            "m" | "min" | "T" => Duration::from_secs(seconds(60)?),
            "h" | "H" => Duration::from_secs(seconds(3600)?),
            "d" | "D" => Duration::from_secs(seconds(86_400)?),
            _ => return Err(invalid()),
        };
        Self::new(width).map_err(|_| invalid())
    }
}

impl TryFrom<String> for BucketWidth {
    type Error = DatasetError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BucketWidth> for String {
    fn from(value: BucketWidth) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        if d.subsec_nanos() != 0 {
            write!(f, "{}ms", d.as_millis())
        } else if d.as_secs() % 3600 == 0 {
            write!(f, "{}h", d.as_secs() / 3600)
        } else if d.as_secs() % 60 == 0 {
            write!(f, "{}min", d.as_secs() / 60)
        } else {
            write!(f, "{}s", d.as_secs())
        }
    }
}

/// A frame whose time column has been floored to `bucket`
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTable {
    frame: DataFrame,
    bucket: BucketWidth,
}

impl AlignedTable {
    pub fn bucket(&self) -> BucketWidth {
        self.bucket
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Apply a transformation that keeps the time column untouched
    pub fn map<F>(self, f: F) -> Result<AlignedTable>
    where
        F: FnOnce(DataFrame) -> Result<DataFrame>,
    {
        Ok(AlignedTable {
            frame: f(self.frame)?,
            bucket: self.bucket,
        })
    }
}

/// Floor the `_time` column of `df` to `bucket`
pub fn floor_to_bucket(df: DataFrame, bucket: BucketWidth) -> Result<AlignedTable> {
    floor_column(df, TIME_COLUMN, bucket)
}

pub fn floor_column(df: DataFrame, column: &str, bucket: BucketWidth) -> Result<AlignedTable> {
    match df.schema().get(column) {
        Some(DataType::Datetime(_, _)) => {}
        Some(other) => {
            return Err(DatasetError::WrongColumnKind {
                column: column.to_string(),
                expected: "timestamp",
                actual: kind_name(other),
            })
        }
        None => return Err(DatasetError::missing_column(column, "table to align")),
    }

    let every = format!("{}us", bucket.as_duration().as_micros());
    let frame = df
        .lazy()
        .with_column(
            col(column)
                .cast(time_dtype())
                .dt()
                .truncate(lit(every))
                .alias(column),
        )
        .collect()
        .map_err(|e| DatasetError::Alignment {
            column: column.to_string(),
            reason: e.to_string(),
        })?;

    Ok(AlignedTable { frame, bucket })
}

/// Human name of a column type in error messages
pub(crate) fn kind_name(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Datetime(_, _) => "timestamp",
        DataType::String => "text",
        dtype if dtype.is_primitive_numeric() => "numeric",
        DataType::Null => "missing",
        _ => "unsupported",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{parse_timestamp, time_column, times};

    fn times_frame(raw: &[&str]) -> DataFrame {
        let parsed: Vec<_> = raw.iter().map(|r| parse_timestamp(r)).collect();
        DataFrame::new(vec![time_column(TIME_COLUMN, &parsed)]).unwrap()
    }

    #[test]
    fn test_parse_bucket_width() {
        assert_eq!("1min".parse::<BucketWidth>().unwrap().as_duration(), DEFAULT_BUCKET);
        assert_eq!("5T".parse::<BucketWidth>().unwrap().as_duration().as_secs(), 300);
        assert_eq!("30s".parse::<BucketWidth>().unwrap().as_secs_f64(), 30.0);
        assert_eq!("h".parse::<BucketWidth>().unwrap().as_duration().as_secs(), 3600);
        assert_eq!("500ms".parse::<BucketWidth>().unwrap().as_secs_f64(), 0.5);
        assert!("0s".parse::<BucketWidth>().is_err());
        assert!("1fortnight".parse::<BucketWidth>().is_err());
        assert!("".parse::<BucketWidth>().is_err());
    }

    #[test]
    fn test_parse_bucket_width_rejects_overflow() {
        for raw in ["307445734561825861min", "5124095576030432h", "213503982334602d"] {
            assert!(matches!(
                raw.parse::<BucketWidth>(),
                Err(DatasetError::InvalidBucket(_))
            ));
        }
    }

    #[test]
    fn test_bucket_width_display() {
        assert_eq!(BucketWidth::default().to_string(), "1min");
        assert_eq!(BucketWidth::from_secs(7200).unwrap().to_string(), "2h");
        assert_eq!(BucketWidth::from_secs(45).unwrap().to_string(), "45s");
    }

    #[test]
    fn test_bucket_width_serde() {
        let width: BucketWidth = serde_json::from_str("\"15min\"").unwrap();
        assert_eq!(width.as_duration().as_secs(), 900);
        assert_eq!(serde_json::to_string(&width).unwrap(), "\"15min\"");
        assert!(serde_json::from_str::<BucketWidth>("\"soon\"").is_err());
    }

    #[test]
    fn test_floor_to_minute() {
        let df = times_frame(&[
            "2025-08-01T00:00:30Z",
            "2025-08-01T00:01:10Z",
            "2025-08-01T00:01:00Z",
        ]);
        let aligned = floor_to_bucket(df, BucketWidth::default()).unwrap();
        let floored = times(aligned.frame(), TIME_COLUMN).unwrap();
        assert_eq!(floored[0], parse_timestamp("2025-08-01T00:00:00Z"));
        assert_eq!(floored[1], parse_timestamp("2025-08-01T00:01:00Z"));
        assert_eq!(floored[2], parse_timestamp("2025-08-01T00:01:00Z"));
        assert_eq!(aligned.bucket(), BucketWidth::default());
    }

    #[test]
    fn test_floor_does_not_aggregate() {
        let df = times_frame(&["2025-08-01T00:00:10Z", "2025-08-01T00:00:50Z"]);
        let aligned = floor_to_bucket(df, BucketWidth::default()).unwrap();
        assert_eq!(aligned.frame().height(), 2);
    }

    #[test]
    fn test_floor_keeps_missing_times() {
        let df = DataFrame::new(vec![time_column(
            TIME_COLUMN,
            &[None, parse_timestamp("2025-08-01T00:00:59Z")],
        )])
        .unwrap();
        let aligned = floor_to_bucket(df, BucketWidth::from_secs(30).unwrap()).unwrap();
        let floored = times(aligned.frame(), TIME_COLUMN).unwrap();
        assert_eq!(floored[0], None);
        assert_eq!(floored[1], parse_timestamp("2025-08-01T00:00:30Z"));
    }

    #[test]
    fn test_floor_requires_time_column() {
        let df = DataFrame::new(vec![Column::new("vm_id".into(), &["101"])]).unwrap();
        assert!(matches!(
            floor_to_bucket(df, BucketWidth::default()),
            Err(DatasetError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_floor_rejects_text_time_column() {
        let df = DataFrame::new(vec![Column::new(TIME_COLUMN.into(), &["noon"])]).unwrap();
        assert!(matches!(
            floor_to_bucket(df, BucketWidth::default()),
            Err(DatasetError::WrongColumnKind { .. })
        ));
    }
}
