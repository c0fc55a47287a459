//! Feature engineering over joined tables
//!
//! Derives unit-converted and ratio columns, then projects the table onto
//! the final ordered column list and drops rows with a missing value in
//! that list. Derivation is pure and idempotent: deriving an already
//! derived table yields the same table.

use crate::align::BucketWidth;
use crate::error::Result;
use crate::frame::{has_column, require_columns};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MEBIBYTE: f64 = 1024.0 * 1024.0;
const GIBIBYTE: f64 = 1024.0 * MEBIBYTE;

/// Unit conversions applied by dividing by a fixed factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitConversion {
    NanocoresToMillicores,
    BytesToMegabytes,
    BytesToGigabytes,
    SecondsToHours,
    MicrowattsToWatts,
    /// Energy accumulated over one bucket to average power; the divisor is
    /// the bucket length in seconds
    JoulesPerBucketToWatts,
}

impl UnitConversion {
    pub fn divisor(&self, bucket: BucketWidth) -> f64 {
        match self {
            UnitConversion::NanocoresToMillicores => 1e6,
            UnitConversion::BytesToMegabytes => MEBIBYTE,
            UnitConversion::BytesToGigabytes => GIBIBYTE,
            UnitConversion::SecondsToHours => 3600.0,
            UnitConversion::MicrowattsToWatts => 1e6,
            UnitConversion::JoulesPerBucketToWatts => bucket.as_secs_f64(),
        }
    }
}

/// When a percentage column is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeriveMode {
    /// Always (re)computed from its inputs
    #[default]
    Always,
    /// Computed only when the table has no column of that name yet. A
    /// same-named upstream column is kept as is, whatever it holds.
    IfAbsent,
}

/// One derived column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    Convert {
        source: String,
        target: String,
        unit: UnitConversion,
    },
    /// `numerator / denominator * 100`, zero where the denominator is not
    /// positive or missing
    Percentage {
        numerator: String,
        denominator: String,
        target: String,
        #[serde(default)]
        mode: DeriveMode,
    },
}

impl Derivation {
    pub fn convert(source: &str, target: &str, unit: UnitConversion) -> Self {
        Derivation::Convert {
            source: source.to_string(),
            target: target.to_string(),
            unit,
        }
    }

    pub fn percentage(numerator: &str, denominator: &str, target: &str, mode: DeriveMode) -> Self {
        Derivation::Percentage {
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            target: target.to_string(),
            mode,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Derivation::Convert { target, .. } | Derivation::Percentage { target, .. } => target,
        }
    }

    /// Add or refresh the derived column.
    ///
    /// A derivation whose inputs are gone but whose target is present has
    /// already been applied and is skipped.
    fn apply(&self, df: DataFrame, bucket: BucketWidth) -> Result<DataFrame> {
        let column = match self {
            Derivation::Convert {
                source,
                target,
                unit,
            } => {
                if !has_column(&df, source) && has_column(&df, target) {
                    return Ok(df);
                }
                require_columns(&df, &[source.clone()], "unit conversion")?;
                (col(source.as_str()).cast(DataType::Float64) / lit(unit.divisor(bucket)))
                    .alias(target.as_str())
            }
            Derivation::Percentage {
                numerator,
                denominator,
                target,
                mode,
            } => {
                let has_inputs = has_column(&df, numerator) && has_column(&df, denominator);
                if has_column(&df, target) && (*mode == DeriveMode::IfAbsent || !has_inputs) {
                    debug!(column = %target, "Derived column already present, kept");
                    return Ok(df);
                }
                if !has_inputs && *mode == DeriveMode::IfAbsent {
                    debug!(column = %target, "Inputs absent, column not derived");
                    return Ok(df);
                }
                require_columns(&df, &[numerator.clone(), denominator.clone()], "percentage")?;
                guarded_percentage(numerator, denominator).alias(target.as_str())
            }
        };
        Ok(df.lazy().with_column(column).collect()?)
    }
}

/// `numerator / denominator * 100` over two columns.
///
/// A row whose denominator is missing or not positive yields 0; otherwise a
/// missing numerator yields a missing cell.
pub fn guarded_percentage(numerator: &str, denominator: &str) -> Expr {
    when(col(denominator).gt(lit(0.0)))
        .then(col(numerator).cast(DataType::Float64) / col(denominator) * lit(100.0))
        .otherwise(lit(0.0))
}

/// Derivations plus final projection for one dataset profile
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEngineer {
    bucket: BucketWidth,
    derivations: Vec<Derivation>,
    projection: Vec<String>,
}

impl FeatureEngineer {
    pub fn new(bucket: BucketWidth) -> Self {
        Self {
            bucket,
            derivations: Vec::new(),
            projection: Vec::new(),
        }
    }

    pub fn with_derivations(mut self, derivations: Vec<Derivation>) -> Self {
        self.derivations = derivations;
        self
    }

    pub fn with_projection(mut self, projection: Vec<String>) -> Self {
        self.projection = projection;
        self
    }

    pub fn bucket(&self) -> BucketWidth {
        self.bucket
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    /// Apply every derivation in order, then project and drop incomplete
    /// rows. Row order is preserved. An empty projection keeps all columns.
    pub fn derive(&self, df: DataFrame) -> Result<DataFrame> {
        let mut df = df;
        for derivation in &self.derivations {
            df = derivation.apply(df, self.bucket)?;
        }
        if self.projection.is_empty() {
            return Ok(df.drop_nulls::<String>(None)?);
        }
        require_columns(&df, &self.projection, "final projection")?;
        Ok(df.select(&self.projection)?.drop_nulls::<String>(None)?)
    }
}
