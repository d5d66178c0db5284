//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
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

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message to stderr, keeping stdout clean for JSON
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}

/// Format an optional tick, `-` when absent
pub fn format_tick(tick: Option<u32>) -> String {
    tick.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Format an error rate as a percentage
pub fn format_percent(rate: f64) -> String {
    format!("{:5.2}%", rate * 100.0)
}

/// Color the SLO flag
pub fn color_slo(violation: bool) -> String {
    if violation {
        "VIOLATED".red().bold().to_string()
    } else {
        "ok".green().to_string()
    }
}

/// Color confidence based on value
pub fn color_confidence(confidence: f64) -> String {
    let formatted = format!("{:.2}", confidence);
    if confidence >= 0.8 {
        formatted.green().to_string()
    } else if confidence >= 0.5 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Color a total reward: negative is red
pub fn color_reward(reward: f64) -> String {
    let formatted = format!("{:.2}", reward);
    if reward < 0.0 {
        formatted.red().to_string()
    } else {
        formatted.green().to_string()
    }
}
