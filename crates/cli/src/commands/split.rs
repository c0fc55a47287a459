//! `dsb split`: train/test split of a previously built dataset

use anyhow::{Context, Result};
use dataset_lib::{read_csv, DatasetProfile, SplitOptions, StructuredLogger, TIME_COLUMN};
use std::path::Path;

use super::build::write_split;
use crate::output::{print_info, print_json, print_success, print_table, OutputFormat};

/// Read `dataset`, split it with the profile's features and target and
/// write the four partitions into `out_dir`
pub fn run(
    profile: &DatasetProfile,
    dataset: &Path,
    out_dir: &Path,
    options: &SplitOptions,
    format: OutputFormat,
) -> Result<()> {
    let df = read_csv(dataset, TIME_COLUMN, &profile.entity_keys)
        .with_context(|| format!("Failed to read dataset {}", dataset.display()))?;
    let logger = StructuredLogger::new(profile.name.as_str());
    let rows = write_split(profile, &df, out_dir, options, &logger)?;

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            print_info(&format!(
                "Features: {} | target: {} | test size: {} | seed: {}",
                profile.features.join(", "),
                profile.target,
                options.test_size,
                options.seed
            ));
            print_table(&rows, OutputFormat::Table);
            print_success(&format!("Split written to {}", out_dir.display()));
        }
    }
    Ok(())
}
