//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use dataset_lib::StageSummary;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Row for the per-phase summary table
#[derive(Debug, Tabled, Serialize)]
pub struct StageRow {
    #[tabled(rename = "Stage")]
    pub stage: String,
    #[tabled(rename = "Rows")]
    pub rows: usize,
    #[tabled(rename = "Columns")]
    pub columns: usize,
}

impl From<&StageSummary> for StageRow {
    fn from(summary: &StageSummary) -> Self {
        Self {
            stage: summary.stage.clone(),
            rows: summary.rows,
            columns: summary.columns,
        }
    }
}

/// Row for a written file
#[derive(Debug, Tabled, Serialize)]
pub struct FileRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Rows")]
    pub rows: usize,
    #[tabled(rename = "Columns")]
    pub columns: usize,
    #[tabled(rename = "Path")]
    pub path: String,
}

/// Print a list of items as a table, or as pretty JSON
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a serializable report as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color a row count: red when empty
pub fn color_rows(rows: usize) -> String {
    if rows == 0 {
        rows.to_string().red().to_string()
    } else {
        rows.to_string().green().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_row_from_summary() {
        let summary = StageSummary {
            stage: "join".to_string(),
            rows: 4,
            columns: 7,
        };
        let row = StageRow::from(&summary);
        assert_eq!(row.stage, "join");
        assert_eq!(row.rows, 4);
        assert_eq!(row.columns, 7);
    }

    #[test]
    fn test_color_rows_keeps_number() {
        assert!(color_rows(0).contains('0'));
        assert!(color_rows(12).contains("12"));
    }
}
