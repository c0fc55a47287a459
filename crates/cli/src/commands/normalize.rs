//! `dsb normalize`: pivot raw exports of one source

use anyhow::{Context, Result};
use dataset_lib::{normalize_source, SourceKind};
use std::path::Path;

use crate::output::{color_rows, print_heading, print_table, print_warning, FileRow, OutputFormat};

/// Normalize every sink of `source` found in `dir`
pub fn run(
    source: SourceKind,
    dir: &Path,
    output: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let sinks = normalize_source(source, dir, output)
        .with_context(|| format!("Failed to normalize {} exports in {}", source, dir.display()))?;

    let rows: Vec<FileRow> = sinks
        .iter()
        .map(|sink| FileRow {
            name: sink.spec.name.clone(),
            rows: sink.frame.height(),
            columns: sink.frame.width(),
            path: sink.path.display().to_string(),
        })
        .collect();

    if let OutputFormat::Table = format {
        print_heading(&format!("Normalized {}", source));
        for sink in sinks.iter().filter(|s| s.frame.height() == 0) {
            print_warning(&format!(
                "{} has {} rows, check the exports in {}",
                sink.spec.name,
                color_rows(sink.frame.height()),
                dir.display()
            ));
        }
    }
    print_table(&rows, format);
    Ok(())
}
