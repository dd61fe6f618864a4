mod cli;
mod text;

pub use cli::print_cli_table;
pub use text::{print_text, render_text};

use crate::model::ScanReport;
use anyhow::Result;

/// Output format for scan reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain finding-by-finding listing
    Text,
    /// Human-readable tables with a summary
    Table,
    /// JSON format for programmatic use
    Json,
}

impl OutputFormat {
    /// Whether progress spinners may be drawn alongside this format.
    pub fn is_interactive(&self) -> bool {
        !matches!(self, OutputFormat::Json)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(OutputFormat::Text),
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "Unknown format: {}. Use 'text', 'table', or 'json'",
                s
            )),
        }
    }
}

pub fn print_result(report: &ScanReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print_text(report),
        OutputFormat::Table => print_cli_table(report),
        OutputFormat::Json => print_json(report),
    }
}

pub fn print_json(report: &ScanReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Format a report to a string for file output
pub fn format_result_to_string(report: &ScanReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(report)),
        // Tables are meant for terminals; files get JSON instead
        OutputFormat::Json | OutputFormat::Table => Ok(serde_json::to_string_pretty(report)?),
    }
}
