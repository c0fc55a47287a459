//! Multi-source telemetry dataset builder
//!
//! This crate provides the core functionality for:
//! - Normalizing long-format monitoring exports into wide tables
//! - Aligning timestamps of different sources to a common bucket
//! - Aggregating and inner-joining sources on time and entity keys
//! - Feature engineering for power regression datasets
//! - Train/test splitting and observability
//!
//! Every stage exchanges polars [`DataFrame`]s; [`frame`] holds the shared
//! column helpers and the CSV boundary.

pub mod align;
pub mod builder;
pub mod error;
pub mod features;
pub mod frame;
pub mod join;
pub mod models;
pub mod normalizer;
pub mod observability;
pub mod split;

pub use align::{floor_to_bucket, AlignedTable, BucketWidth, DEFAULT_BUCKET};
pub use builder::{DatasetBuilder, DatasetProfile, RowFilter, SideSpec};
pub use error::{DatasetError, Result};
pub use features::{Derivation, DeriveMode, FeatureEngineer, UnitConversion};
pub use frame::{read_csv, write_csv};
pub use join::{aggregate, inner_join, join_aligned, Aggregation, AggregationPolicy};
pub use models::*;
pub use normalizer::{normalize, normalize_source, NormalizedSink, SourceSpec};
pub use observability::{render_metrics, PipelineMetrics, StructuredLogger};
pub use split::{train_test_split, SplitOptions, TrainTestSplit};
pub use polars::prelude::DataFrame;
