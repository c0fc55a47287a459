//! Source normalization
//!
//! Turns a directory of raw long-format exports into one wide table per
//! sink. Every source kind is an instance of the same parameterized
//! [`SourceSpec`]; the presets returned by [`sinks`] cover the monitoring
//! sources the dataset profiles consume.
//!
//! Normalized tables are persisted to `<source_dir>/processed/<name>` so
//! that later stages can re-read them by convention.

mod discovery;
mod enrich;
mod pivot;

#[cfg(test)]
mod tests;

pub use discovery::discover_files;
pub use enrich::Enrichment;
pub use pivot::{pivot, read_long_file};

use crate::error::Result;
use crate::join::Aggregation;
use crate::models::{SourceKind, CSV_SUFFIX, PROCESSED_DIR, TIME_COLUMN};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::frame::{empty_frame, read_csv, write_csv};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// How one sink of a source is located, pivoted and post-processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Label used in logs and metrics
    pub name: String,
    pub file_prefix: String,
    pub file_suffix: String,
    /// Entity key columns; together with `_time` they form the row index
    pub pivot_keys: Vec<String>,
    /// How duplicate observations of one metric are combined
    pub aggregation: Aggregation,
    /// Turn non-numeric raw values into missing cells instead of failing
    pub coerce_numeric: bool,
    pub enrichments: Vec<Enrichment>,
    /// Drop rows with any missing cell, then exact duplicate rows
    pub drop_incomplete: bool,
    /// Prepended to the output file name when persisting
    pub output_prefix: String,
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            file_prefix: String::new(),
            file_suffix: CSV_SUFFIX.to_string(),
            pivot_keys: Vec::new(),
            aggregation: Aggregation::Mean,
            coerce_numeric: false,
            enrichments: Vec::new(),
            drop_incomplete: false,
            output_prefix: String::new(),
        }
    }
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, file_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_prefix: file_prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_pivot_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pivot_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn coerce_numeric(mut self) -> Self {
        self.coerce_numeric = true;
        self
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichments.push(enrichment);
        self
    }

    pub fn drop_incomplete(mut self) -> Self {
        self.drop_incomplete = true;
        self
    }

    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }

    /// `_time` followed by the pivot keys
    pub fn index_columns(&self) -> Vec<String> {
        std::iter::once(TIME_COLUMN.to_string())
            .chain(self.pivot_keys.iter().cloned())
            .collect()
    }

    /// Whether `file_name` belongs to this sink
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.file_prefix) && file_name.ends_with(&self.file_suffix)
    }

    pub fn output_file_name(&self, name: &str) -> String {
        format!("{}{}", self.output_prefix, name)
    }

    fn empty_frame(&self) -> DataFrame {
        empty_frame(TIME_COLUMN, &self.pivot_keys)
    }
}

/// Sink presets for a source kind. Every kind has one sink except
/// scaphandre, whose host and VM telemetry share a directory.
pub fn sinks(kind: SourceKind) -> Vec<SourceSpec> {
    match kind {
        SourceKind::Kepler => vec![SourceSpec::new("kepler", "kepler")
            .with_pivot_keys(["container_id", "container_name", "namespace", "pod_name"])],
        SourceKind::K8s => vec![SourceSpec::new("k8s", "k8s")
            .with_pivot_keys(["container_name", "namespace", "pod_name"])],
        SourceKind::Proxmox => vec![SourceSpec::new("proxmox", "proxmox")
            .with_pivot_keys(["inventory-server-id", "vm_id", "vm_name"])
            .coerce_numeric()
            .with_enrichment(Enrichment::DiskCapacity)],
        SourceKind::Pdu => vec![SourceSpec::new("pdu", "pdu")
            .with_pivot_keys(["inventory-server-id", "placement", "url"])],
        SourceKind::Scaphandre => vec![
            SourceSpec::new("scaphandre_host", "scaphandre_flux")
                .with_pivot_keys(["inventory-cluster-id", "inventory-rack-id", "url"])
                .drop_incomplete()
                .with_output_prefix("host_"),
            SourceSpec::new("scaphandre_vm", "scaphandre_neuronet")
                .with_pivot_keys(["inventory-cluster-id", "inventory-rack-id", "vm_id", "vm_name"])
                .drop_incomplete()
                .with_output_prefix("vm_"),
        ],
    }
}

/// The sink of `kind` named `name`
pub fn sink(kind: SourceKind, name: &str) -> Option<SourceSpec> {
    sinks(kind).into_iter().find(|s| s.name == name)
}

/// Pivot each file, concatenate the results and sort them by time.
///
/// Files are independent: there is no cross-file join. The sort is stable,
/// so rows sharing a timestamp keep file-then-row order. An empty file
/// list yields a table with only the index columns and no rows.
pub fn normalize_files(files: &[PathBuf], spec: &SourceSpec) -> Result<DataFrame> {
    if files.is_empty() {
        return Ok(spec.empty_frame());
    }

    let metrics = PipelineMetrics::new();
    let mut frames = Vec::with_capacity(files.len());
    let mut frames_height = 0;
    for path in files {
        let records = read_long_file(path, spec)?;
        let mut frame = pivot(&records, &spec.pivot_keys, spec.aggregation)?;
        for enrichment in &spec.enrichments {
            frame = enrichment.apply(frame)?;
        }
        metrics.inc_files_read(&spec.name);
        if frame.height() == 0 {
            warn!(source = %spec.name, file = %path.display(), "File produced no rows");
        } else {
            debug!(
                source = %spec.name,
                file = %path.display(),
                records = records.height(),
                rows = frame.height(),
                "File pivoted"
            );
        }
        frames_height += frame.height();
        frames.push(frame.lazy());
    }

    // columns keep first-seen order; a file lacking a metric gets nulls
    let mut lf = concat_lf_diagonal(frames, UnionArgs::default())?.sort(
        [TIME_COLUMN],
        SortMultipleOptions::default().with_maintain_order(true),
    );
    if spec.drop_incomplete {
        lf = lf
            .drop_nulls(None)
            .unique_stable(None, UniqueKeepStrategy::First);
    }
    let df = lf.collect()?;
    if spec.drop_incomplete {
        metrics.add_rows_dropped("normalize", frames_height - df.height());
    }
    Ok(df)
}

/// Normalize every file of `dir` matching `spec`
pub fn normalize(dir: &Path, spec: &SourceSpec) -> Result<DataFrame> {
    let files = discover_files(dir, &spec.file_prefix, &spec.file_suffix)?;
    StructuredLogger::new(spec.name.as_str()).log_files_discovered(&spec.name, dir, files.len());
    normalize_files(&files, spec)
}

/// A normalized sink and where it was persisted
#[derive(Debug, Clone)]
pub struct NormalizedSink {
    pub spec: SourceSpec,
    pub path: PathBuf,
    pub frame: DataFrame,
}

/// Location of a persisted intermediate
pub fn processed_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(PROCESSED_DIR).join(file_name)
}

/// Normalize every sink of `kind` found in `dir` and persist each one to
/// `<dir>/processed/<sink prefix><output_name>`.
///
/// `output_name` defaults to `<kind>_processed.csv`.
pub fn normalize_source(
    kind: SourceKind,
    dir: &Path,
    output_name: Option<&str>,
) -> Result<Vec<NormalizedSink>> {
    let metrics = PipelineMetrics::new();
    let default_name = kind.default_output_name();
    let name = output_name.unwrap_or(&default_name);

    let mut outputs = Vec::new();
    for spec in sinks(kind) {
        let started = Instant::now();
        let frame = normalize(dir, &spec)?;
        let path = processed_path(dir, &spec.output_file_name(name));
        write_csv(&path, &frame)?;

        metrics.observe_stage_latency("normalize", started.elapsed().as_secs_f64());
        StructuredLogger::new(kind.as_str()).log_source_normalized(
            &spec.name,
            frame.height(),
            frame.width(),
            &path,
        );
        outputs.push(NormalizedSink { spec, path, frame });
    }
    Ok(outputs)
}

/// Re-read a persisted intermediate, keeping the sink's pivot keys as text
pub fn read_processed(path: &Path, spec: &SourceSpec) -> Result<DataFrame> {
    read_csv(path, TIME_COLUMN, &spec.pivot_keys)
}
