//! Error taxonomy for the dataset builder
//!
//! Structural problems (unreadable inputs, absent required columns,
//! inconsistent configuration) surface as [`DatasetError`] and abort the
//! whole build. Row-level data-quality gaps never reach this type: they are
//! filtered out where they are found.

use polars::prelude::PolarsError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("dataframe operation failed: {0}")]
    Frame(#[from] PolarsError),

    #[error("required column `{column}` is missing from {context}")]
    MissingColumn { column: String, context: String },

    #[error("invalid timestamp `{value}` in {context}")]
    InvalidTimestamp { value: String, context: String },

    #[error("non-numeric value `{value}` in column `{column}` ({context})")]
    InvalidValue {
        column: String,
        value: String,
        context: String,
    },

    #[error("column `{column}` holds {actual} values where {expected} values are required")]
    WrongColumnKind {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("column `{0}` appears more than once")]
    DuplicateColumn(String),

    #[error("invalid bucket width `{0}`")]
    InvalidBucket(String),

    #[error("cannot join tables aligned to different buckets ({left:?} vs {right:?})")]
    BucketMismatch { left: Duration, right: Duration },

    #[error("failed to floor column `{column}` to the bucket: {reason}")]
    Alignment { column: String, reason: String },

    #[error("invalid dataset profile `{profile}`: {reason}")]
    InvalidProfile { profile: String, reason: String },

    #[error("dataset is empty, nothing to split")]
    EmptyDataset,

    #[error("invalid test size {0}, expected a fraction in (0, 1)")]
    InvalidSplit(f64),

    #[error("a test size of {test_size} leaves no training rows out of {rows}")]
    NoTrainingRows { rows: usize, test_size: f64 },
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: PolarsError) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing_column(column: &str, context: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.to_string(),
            context: context.into(),
        }
    }

    /// Whether this error stems from configuration rather than from I/O
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn { .. }
                | Self::InvalidBucket(_)
                | Self::BucketMismatch { .. }
                | Self::InvalidProfile { .. }
                | Self::InvalidSplit(_)
        )
    }
}
