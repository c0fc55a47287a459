//! `dsb build`: normalize two sources and build a dataset

use anyhow::{anyhow, Context, Result};
use dataset_lib::normalizer::{read_processed, sink};
use dataset_lib::{
    normalize_source, train_test_split, write_csv, BucketWidth, DataFrame, DatasetBuilder,
    DatasetProfile, SideSpec, SplitOptions, StructuredLogger,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::output::{
    color_rows, print_heading, print_json, print_success, print_table, print_warning, FileRow,
    OutputFormat, StageRow,
};

/// Inputs and outputs of one build
#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub left_dir: PathBuf,
    pub right_dir: PathBuf,
    pub output: PathBuf,
    pub bucket: BucketWidth,
    pub split_dir: Option<PathBuf>,
    pub split: SplitOptions,
}

#[derive(Debug, Serialize)]
struct BuildReport {
    profile: String,
    bucket: String,
    output: String,
    rows: usize,
    columns: usize,
    stages: Vec<StageRow>,
    split: Vec<FileRow>,
}

/// Normalize a side's source directory, then re-read the persisted
/// intermediate the side consumes
pub fn load_side(dir: &Path, side: &SideSpec) -> Result<DataFrame> {
    let outputs = normalize_source(side.source, dir, None).with_context(|| {
        format!("Failed to normalize {} exports in {}", side.source, dir.display())
    })?;
    let output = outputs
        .iter()
        .find(|o| o.spec.name == side.sink)
        .ok_or_else(|| anyhow!("source {} has no sink named {}", side.source, side.sink))?;
    let spec = sink(side.source, &side.sink)
        .ok_or_else(|| anyhow!("source {} has no sink named {}", side.source, side.sink))?;
    read_processed(&output.path, &spec)
        .with_context(|| format!("Failed to read {}", output.path.display()))
}

/// Build `profile` from the two source directories
pub fn run(profile: DatasetProfile, args: &BuildArgs, format: OutputFormat) -> Result<()> {
    let logger = StructuredLogger::new(profile.name.as_str());
    let left = load_side(&args.left_dir, &profile.left)?;
    let right = load_side(&args.right_dir, &profile.right)?;

    let builder = DatasetBuilder::new(profile, args.bucket)?;
    let (dataset, stages) = builder
        .build_with_summary(left, right)
        .with_context(|| format!("Failed to build the {} dataset", builder.profile().name))?;

    write_csv(&args.output, &dataset)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    logger.log_dataset_written(&args.output, dataset.height(), dataset.width());

    let mut split_rows = Vec::new();
    if let Some(dir) = &args.split_dir {
        if dataset.height() == 0 {
            print_warning("Dataset is empty, skipping the train/test split");
        } else {
            split_rows = write_split(builder.profile(), &dataset, dir, &args.split, &logger)?;
        }
    }

    let report = BuildReport {
        profile: builder.profile().name.clone(),
        bucket: args.bucket.to_string(),
        output: args.output.display().to_string(),
        rows: dataset.height(),
        columns: dataset.width(),
        stages: stages.iter().map(StageRow::from).collect(),
        split: split_rows,
    };
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

/// Split `dataset` into train and test files in `dir`
pub fn write_split(
    profile: &DatasetProfile,
    dataset: &DataFrame,
    dir: &Path,
    options: &SplitOptions,
    logger: &StructuredLogger,
) -> Result<Vec<FileRow>> {
    let split = train_test_split(dataset, &profile.features, &profile.target, options)
        .context("Failed to split the dataset")?;
    let paths = split
        .write(dir)
        .with_context(|| format!("Failed to write split files to {}", dir.display()))?;
    logger.log_split(split.train_rows(), split.test_rows(), options.seed);
    info!(directory = %dir.display(), "Split files written");

    let partitions = [&split.x_train, &split.x_test, &split.y_train, &split.y_test];
    Ok(paths
        .iter()
        .zip(partitions)
        .map(|(path, df)| FileRow {
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            rows: df.height(),
            columns: df.width(),
            path: path.display().to_string(),
        })
        .collect())
}

fn print_report(report: &BuildReport) {
    print_heading(&format!("Dataset {}", report.profile));
    println!("Bucket:                 {}", report.bucket);
    println!("Rows:                   {}", color_rows(report.rows));
    println!("Columns:                {}", report.columns);
    println!();
    print_table(&report.stages, OutputFormat::Table);
    if !report.split.is_empty() {
        println!();
        print_table(&report.split, OutputFormat::Table);
    }
    if report.rows == 0 {
        print_warning("The sources share no timestamp and key, the dataset is empty");
    }
    print_success(&format!("Dataset written to {}", report.output));
}
