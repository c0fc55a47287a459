//! Observability infrastructure for the dataset builder
//!
//! Provides:
//! - Prometheus metrics (stage latency, rows per stage, files read, rows dropped)
//! - Structured logging of pipeline milestones with tracing

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for stage latencies (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    stage_latency_seconds: HistogramVec,
    stage_rows: IntGaugeVec,
    files_read: IntCounterVec,
    rows_dropped: IntCounterVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            stage_latency_seconds: register_histogram_vec!(
                "dataset_builder_stage_latency_seconds",
                "Time spent in each pipeline stage",
                &["stage"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register stage_latency_seconds"),

            stage_rows: register_int_gauge_vec!(
                "dataset_builder_stage_rows",
                "Rows present after each pipeline stage",
                &["profile", "stage"]
            )
            .expect("Failed to register stage_rows"),

            files_read: register_int_counter_vec!(
                "dataset_builder_files_read_total",
                "Raw export files read per source",
                &["source"]
            )
            .expect("Failed to register files_read"),

            rows_dropped: register_int_counter_vec!(
                "dataset_builder_rows_dropped_total",
                "Rows removed for data-quality reasons per stage",
                &["stage"]
            )
            .expect("Failed to register rows_dropped"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn observe_stage_latency(&self, stage: &str, duration_secs: f64) {
        self.inner()
            .stage_latency_seconds
            .with_label_values(&[stage])
            .observe(duration_secs);
    }

    pub fn set_stage_rows(&self, profile: &str, stage: &str, rows: usize) {
        self.inner()
            .stage_rows
            .with_label_values(&[profile, stage])
            .set(rows as i64);
    }

    pub fn inc_files_read(&self, source: &str) {
        self.inner().files_read.with_label_values(&[source]).inc();
    }

    pub fn add_rows_dropped(&self, stage: &str, rows: usize) {
        if rows > 0 {
            self.inner()
                .rows_dropped
                .with_label_values(&[stage])
                .inc_by(rows as u64);
        }
    }
}

/// Encode the global registry in the Prometheus text exposition format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Structured logger for pipeline events
///
/// Every event carries an `event` field and the pipeline name so runs can
/// be filtered from JSON logs.
#[derive(Clone)]
pub struct StructuredLogger {
    pipeline: String,
}

impl StructuredLogger {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
        }
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn log_files_discovered(&self, source: &str, directory: &Path, files: usize) {
        if files == 0 {
            warn!(
                event = "files_discovered",
                pipeline = %self.pipeline,
                source = %source,
                directory = %directory.display(),
                files = files,
                "No raw export files found, source will be empty"
            );
        } else {
            info!(
                event = "files_discovered",
                pipeline = %self.pipeline,
                source = %source,
                directory = %directory.display(),
                files = files,
                "Discovered raw export files"
            );
        }
    }

    pub fn log_source_normalized(&self, source: &str, rows: usize, columns: usize, output: &Path) {
        info!(
            event = "source_normalized",
            pipeline = %self.pipeline,
            source = %source,
            rows = rows,
            columns = columns,
            output = %output.display(),
            "Normalized source written"
        );
    }

    pub fn log_stage(&self, stage: &str, rows_in: usize, rows_out: usize) {
        info!(
            event = "stage_completed",
            pipeline = %self.pipeline,
            stage = %stage,
            rows_in = rows_in,
            rows_out = rows_out,
            "Pipeline stage completed"
        );
    }

    pub fn log_dataset_written(&self, path: &Path, rows: usize, columns: usize) {
        if rows == 0 {
            warn!(
                event = "dataset_written",
                pipeline = %self.pipeline,
                path = %path.display(),
                rows = rows,
                columns = columns,
                "Dataset is empty, the sources share no timestamp and key"
            );
        } else {
            info!(
                event = "dataset_written",
                pipeline = %self.pipeline,
                path = %path.display(),
                rows = rows,
                columns = columns,
                "Dataset written"
            );
        }
    }

    pub fn log_split(&self, train_rows: usize, test_rows: usize, seed: u64) {
        info!(
            event = "dataset_split",
            pipeline = %self.pipeline,
            train_rows = train_rows,
            test_rows = test_rows,
            seed = seed,
            "Dataset split into train and test partitions"
        );
    }
}
