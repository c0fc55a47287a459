//! Dataset building
//!
//! [`DatasetBuilder`] turns two normalized source tables into one
//! feature/target table in four phases, each of which either succeeds over
//! the whole table or fails the build:
//!
//! 1. align: floor timestamps of both sides to the bucket width
//! 2. prefilter: keep the allow-listed columns of each side and drop rows
//!    missing any of them
//! 3. join: aggregate each side per (time, entity key) and inner-join
//! 4. derive: engineer features, project and drop incomplete rows
//!
//! An optional row filter runs before alignment. The two built-in
//! configurations live in [`profiles`].

mod profiles;

pub use profiles::{DEFAULT_VM_NAME_FILTER, ENERGY_PROFILE, VM_POWER_PROFILE};

use crate::align::{floor_to_bucket, kind_name, AlignedTable, BucketWidth};
use crate::error::{DatasetError, Result};
use crate::features::{Derivation, FeatureEngineer};
use crate::join::{join_aligned, AggregationPolicy};
use crate::models::{SourceKind, StageSummary, TIME_COLUMN};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::frame::{ensure_column, has_column, time_dtype};
use polars::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Row predicate over one text column, applied before alignment
#[derive(Clone)]
pub struct RowFilter {
    column: String,
    description: String,
    predicate: Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>,
}

impl RowFilter {
    pub fn new<F>(column: impl Into<String>, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(Option<&str>) -> bool + Send + Sync + 'static,
    {
        Self {
            column: column.into(),
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Keep rows whose `column` contains `needle`; missing cells never match
    pub fn contains(column: &str, needle: &str) -> Self {
        let needle = needle.to_string();
        Self::new(column, format!("{} contains {:?}", column, needle), move |value| {
            value.is_some_and(|v| v.contains(needle.as_str()))
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn apply(&self, mut df: DataFrame) -> Result<DataFrame> {
        ensure_column(&mut df, &self.column, &DataType::String, "row filter")?;
        let column = df.column(&self.column)?;
        let values = column.str().map_err(|_| DatasetError::WrongColumnKind {
            column: self.column.clone(),
            expected: "text",
            actual: kind_name(column.dtype()),
        })?;
        let mask: BooleanChunked = values.into_iter().map(|v| (self.predicate)(v)).collect();
        Ok(df.filter(&mask)?)
    }
}

impl fmt::Debug for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowFilter")
            .field("column", &self.column)
            .field("description", &self.description)
            .finish()
    }
}

/// One side of a dataset: where it comes from and which of its columns
/// enter the join
#[derive(Debug, Clone, PartialEq)]
pub struct SideSpec {
    pub source: SourceKind,
    /// Sink of `source` whose persisted intermediate feeds this side
    pub sink: String,
    /// Allow-listed value columns; all must be present
    pub columns: Vec<String>,
    /// Value columns carried along when present
    pub optional_columns: Vec<String>,
    pub aggregation: AggregationPolicy,
}

impl SideSpec {
    pub fn new(source: SourceKind, sink: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            source,
            sink: sink.into(),
            columns,
            optional_columns: Vec::new(),
            aggregation: AggregationPolicy::default(),
        }
    }

    pub fn with_optional_columns(mut self, columns: Vec<String>) -> Self {
        self.optional_columns = columns;
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationPolicy) -> Self {
        self.aggregation = aggregation;
        self
    }
}

/// A dataset configuration
#[derive(Debug, Clone)]
pub struct DatasetProfile {
    pub name: String,
    /// Entity columns that, with `_time`, identify a joined row
    pub entity_keys: Vec<String>,
    pub left: SideSpec,
    pub right: SideSpec,
    /// Applied to both sides before alignment
    pub filter: Option<RowFilter>,
    pub derivations: Vec<Derivation>,
    /// Ordered final column list
    pub projection: Vec<String>,
    /// Default training features
    pub features: Vec<String>,
    pub target: String,
}

impl DatasetProfile {
    pub fn join_keys(&self) -> Vec<String> {
        std::iter::once(TIME_COLUMN.to_string())
            .chain(self.entity_keys.iter().cloned())
            .collect()
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| DatasetError::InvalidProfile {
            profile: self.name.clone(),
            reason,
        };
        if self.entity_keys.is_empty() {
            return Err(invalid("no entity key columns".to_string()));
        }
        if !self.projection.iter().any(|c| c == &self.target) {
            return Err(invalid(format!(
                "target `{}` is not part of the final columns",
                self.target
            )));
        }
        if let Some(feature) = self
            .features
            .iter()
            .find(|f| !self.projection.contains(*f) || **f == self.target)
        {
            return Err(invalid(format!(
                "feature `{}` is not a final non-target column",
                feature
            )));
        }
        Ok(())
    }
}

/// Runs one profile over pairs of normalized tables
pub struct DatasetBuilder {
    profile: DatasetProfile,
    engineer: FeatureEngineer,
    bucket: BucketWidth,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl DatasetBuilder {
    pub fn new(profile: DatasetProfile, bucket: BucketWidth) -> Result<Self> {
        profile.validate()?;
        let engineer = FeatureEngineer::new(bucket)
            .with_derivations(profile.derivations.clone())
            .with_projection(profile.projection.clone());
        let logger = StructuredLogger::new(profile.name.as_str());
        Ok(Self {
            profile,
            engineer,
            bucket,
            metrics: PipelineMetrics::new(),
            logger,
        })
    }

    pub fn profile(&self) -> &DatasetProfile {
        &self.profile
    }

    pub fn bucket(&self) -> BucketWidth {
        self.bucket
    }

    /// Build the final dataset from the left and right source tables
    pub fn build(&self, left: DataFrame, right: DataFrame) -> Result<DataFrame> {
        self.build_with_summary(left, right).map(|(dataset, _)| dataset)
    }

    /// Like [`DatasetBuilder::build`], also reporting the row and column
    /// counts after every phase
    pub fn build_with_summary(
        &self,
        left: DataFrame,
        right: DataFrame,
    ) -> Result<(DataFrame, Vec<StageSummary>)> {
        let mut summary = Vec::new();
        let rows_in = left.height() + right.height();

        let (left, right) = match &self.profile.filter {
            Some(filter) => self.stage("filter", rows_in, &mut summary, || {
                Ok((filter.apply(left)?, filter.apply(right)?))
            })?,
            None => (left, right),
        };

        let rows_in = left.height() + right.height();
        let (left, right) = self.stage("align", rows_in, &mut summary, || {
            Ok((self.align(left)?, self.align(right)?))
        })?;

        let rows_in = left.frame().height() + right.frame().height();
        let (left, right) = self.stage("prefilter", rows_in, &mut summary, || {
            let left = left.map(|df| self.prefilter(df, &self.profile.left))?;
            let right = right.map(|df| self.prefilter(df, &self.profile.right))?;
            Ok((left, right))
        })?;
        self.metrics.add_rows_dropped(
            "prefilter",
            rows_in - left.frame().height() - right.frame().height(),
        );

        let rows_in = left.frame().height() + right.frame().height();
        let joined = self.stage("join", rows_in, &mut summary, || {
            join_aligned(
                &left,
                &right,
                &self.profile.join_keys(),
                &self.profile.left.aggregation,
                &self.profile.right.aggregation,
            )
        })?;

        let rows_in = joined.height();
        let dataset = self.stage("derive", rows_in, &mut summary, || {
            self.engineer.derive(joined)
        })?;
        self.metrics.add_rows_dropped("derive", rows_in - dataset.height());

        Ok((dataset, summary))
    }

    fn align(&self, mut df: DataFrame) -> Result<AlignedTable> {
        ensure_column(&mut df, TIME_COLUMN, &time_dtype(), "source table")?;
        floor_to_bucket(df, self.bucket)
    }

    /// Project onto time, entity keys and the side's allow-list, then drop
    /// rows missing any of them
    fn prefilter(&self, mut df: DataFrame, side: &SideSpec) -> Result<DataFrame> {
        let context = format!("{} table", side.sink);
        for key in &self.profile.entity_keys {
            ensure_column(&mut df, key, &DataType::String, &context)?;
        }
        for column in &side.columns {
            ensure_column(&mut df, column, &DataType::Float64, &context)?;
        }
        let keep: Vec<String> = self
            .profile
            .join_keys()
            .into_iter()
            .chain(side.columns.iter().cloned())
            .chain(
                side.optional_columns
                    .iter()
                    .filter(|c| has_column(&df, c))
                    .cloned(),
            )
            .collect();
        Ok(df.select(&keep)?.drop_nulls::<String>(None)?)
    }

    fn stage<T, F>(
        &self,
        stage: &str,
        rows_in: usize,
        summary: &mut Vec<StageSummary>,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
        T: StageOutput,
    {
        let started = Instant::now();
        let output = f()?;
        self.metrics
            .observe_stage_latency(stage, started.elapsed().as_secs_f64());
        let (rows, columns) = output.shape();
        self.metrics.set_stage_rows(&self.profile.name, stage, rows);
        self.logger.log_stage(stage, rows_in, rows);
        summary.push(StageSummary {
            stage: stage.to_string(),
            rows,
            columns,
        });
        Ok(output)
    }
}

/// Row and column counts reported after a phase
trait StageOutput {
    fn shape(&self) -> (usize, usize);
}

impl StageOutput for DataFrame {
    fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }
}

impl StageOutput for AlignedTable {
    fn shape(&self) -> (usize, usize) {
        self.frame().shape()
    }
}

impl<A: StageOutput, B: StageOutput> StageOutput for (A, B) {
    fn shape(&self) -> (usize, usize) {
        let (a, b) = (self.0.shape(), self.1.shape());
        (a.0 + b.0, a.1 + b.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{numbers, parse_timestamp, time_column};

    fn times(rows: &[(&str, &str, f64)]) -> Column {
        let parsed: Vec<_> = rows.iter().map(|r| parse_timestamp(r.0)).collect();
        time_column(TIME_COLUMN, &parsed)
    }

    fn names(rows: &[(&str, &str, f64)]) -> Column {
        Column::new("container_name".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>())
    }

    fn repeat(name: &str, value: &str, rows: usize) -> Column {
        Column::new(name.into(), vec![value; rows])
    }

    fn k8s(rows: &[(&str, &str, f64)]) -> DataFrame {
        let n = rows.len();
        DataFrame::new(vec![
            times(rows),
            names(rows),
            repeat("namespace", "default", n),
            repeat("pod_name", "pod-1", n),
            Column::new(
                "cpu_usage_nanocores".into(),
                rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            ),
            Column::new("memory_usage_bytes".into(), vec![1_048_576.0; n]),
            Column::new("logsfs_used_bytes".into(), vec![1.0; n]),
            Column::new("logsfs_capacity_bytes".into(), vec![0.0; n]),
        ])
        .unwrap()
    }

    fn kepler(rows: &[(&str, &str, f64)]) -> DataFrame {
        let n = rows.len();
        DataFrame::new(vec![
            times(rows),
            repeat("container_id", "abc", n),
            names(rows),
            repeat("namespace", "default", n),
            repeat("pod_name", "pod-1", n),
            Column::new(
                "kepler_container_joules_total".into(),
                rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            ),
        ])
        .unwrap()
    }

    fn energy_builder() -> DatasetBuilder {
        DatasetBuilder::new(DatasetProfile::energy(), BucketWidth::default()).unwrap()
    }

    #[test]
    fn test_energy_build_sums_joules_per_bucket() {
        let left = k8s(&[("2025-08-01T00:00:30Z", "app", 2_000_000.0)]);
        let right = kepler(&[
            ("2025-08-01T00:00:10Z", "app", 30.0),
            ("2025-08-01T00:00:40Z", "app", 90.0),
            ("2025-08-01T00:00:40Z", "other", 600.0),
        ]);

        let (dataset, summary) = energy_builder().build_with_summary(left, right).unwrap();
        assert_eq!(dataset.height(), 1);
        assert_eq!(numbers(&dataset, "cpu_millicores").unwrap(), [Some(2.0)]);
        assert_eq!(numbers(&dataset, "memory_usage_mb").unwrap(), [Some(1.0)]);
        assert_eq!(numbers(&dataset, "logsfs_usage_percent").unwrap(), [Some(0.0)]);
        assert_eq!(numbers(&dataset, "container_power_watts").unwrap(), [Some(2.0)]);

        let stages: Vec<&str> = summary.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(stages, vec!["align", "prefilter", "join", "derive"]);
    }

    #[test]
    fn test_prefilter_drops_rows_missing_allow_listed_values() {
        let mut left = k8s(&[
            ("2025-08-01T00:00:00Z", "app", 1_000_000.0),
            ("2025-08-01T00:01:00Z", "app", 1_000_000.0),
        ]);
        left.with_column(Column::new(
            "memory_usage_bytes".into(),
            &[None, Some(1_048_576.0)],
        ))
        .unwrap();
        let right = kepler(&[
            ("2025-08-01T00:00:00Z", "app", 60.0),
            ("2025-08-01T00:01:00Z", "app", 60.0),
        ]);
        let dataset = energy_builder().build(left, right).unwrap();
        assert_eq!(dataset.height(), 1);
    }

    #[test]
    fn test_missing_allow_listed_column_fails() {
        let left = k8s(&[("2025-08-01T00:00:00Z", "app", 1.0)])
            .select(["_time", "container_name", "namespace", "pod_name"])
            .unwrap();
        let right = kepler(&[("2025-08-01T00:00:00Z", "app", 60.0)]);
        assert!(matches!(
            energy_builder().build(left, right),
            Err(DatasetError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_row_filter_contains() {
        let df = DataFrame::new(vec![Column::new(
            "vm_name".into(),
            &[Some("k8s-worker"), Some("db"), None],
        )])
        .unwrap();
        let filtered = RowFilter::contains("vm_name", "k8s").apply(df).unwrap();
        assert_eq!(filtered.height(), 1);
    }

    #[test]
    fn test_row_filter_rejects_numeric_column() {
        let df = DataFrame::new(vec![Column::new("vm_name".into(), &[1.0])]).unwrap();
        let err = RowFilter::contains("vm_name", "k8s").apply(df).unwrap_err();
        match err {
            DatasetError::WrongColumnKind {
                expected, actual, ..
            } => {
                assert_eq!(expected, "text");
                assert_eq!(actual, "numeric");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_row_filter_on_empty_frame_materializes_column() {
        let filtered = RowFilter::contains("vm_name", "k8s")
            .apply(DataFrame::empty())
            .unwrap();
        assert_eq!(filtered.height(), 0);
        assert!(has_column(&filtered, "vm_name"));
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let profile = DatasetProfile::energy().with_target("not_a_column");
        assert!(matches!(
            DatasetBuilder::new(profile, BucketWidth::default()),
            Err(DatasetError::InvalidProfile { .. })
        ));

        let profile = DatasetProfile::energy().with_features(vec!["container_power_watts".into()]);
        assert!(DatasetBuilder::new(profile, BucketWidth::default()).is_err());
    }
}
