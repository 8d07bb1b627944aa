//! Terminal output
//!
//! Results go to stdout; status messages go to stderr so that command
//! output stays pipeable.

use colored::*;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::error::CliResult;

/// How listing commands render their rows
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns
    #[default]
    Table,
    /// A pretty-printed JSON array
    Json,
    /// A YAML sequence
    Yaml,
}

/// Render `rows` to stdout. An empty table is reported on stderr instead.
pub fn print_output<T: Serialize + Tabled>(rows: Vec<T>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Table if rows.is_empty() => status("·".dimmed(), "nothing to list"),
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&rows)?),
    }
    Ok(())
}

fn status(marker: ColoredString, message: &str) {
    eprintln!("{} {}", marker, message);
}

pub fn print_success(message: &str) {
    status("✓".green(), message);
}

pub fn print_error(message: &str) {
    status("✗".red(), message);
}

pub fn print_warning(message: &str) {
    status("⚠".yellow(), message);
}

pub fn print_info(message: &str) {
    status("ℹ".blue(), message);
}

/// Color `-` lines red and `+` lines green.
pub fn colorize_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with('-') {
                line.red().to_string()
            } else if line.starts_with('+') {
                line.green().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
