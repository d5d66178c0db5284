//! Batch evaluation

use aiops_lib::runner::evaluate_with_progress;
use aiops_lib::{mttr_by_fault, EpisodeSummary, MttrGroup, SimConfig};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use tracing::info;

use crate::output::{print_info, print_json, print_success, print_table, OutputFormat};

/// Episodes between progress lines
const PROGRESS_EVERY: usize = 5;

/// Groups shown in the MTTR table
const MTTR_ROWS: usize = 10;

/// Everything written to the results file
#[derive(Serialize)]
struct EvalReport<'a> {
    generated_at: DateTime<Utc>,
    seed0: u64,
    episodes: usize,
    settings: &'a SimConfig,
    results: &'a [EpisodeSummary],
}

/// Row for the grouped MTTR table
#[derive(Tabled, Serialize)]
struct MttrRow {
    #[tabled(rename = "Fault")]
    fault_kind: String,
    #[tabled(rename = "Service")]
    fault_service: String,
    #[tabled(rename = "Episodes")]
    episodes: usize,
    #[tabled(rename = "Mean MTTR")]
    mean_mttr: String,
}

impl From<&MttrGroup> for MttrRow {
    fn from(group: &MttrGroup) -> Self {
        Self {
            fault_kind: group.fault_kind.to_string(),
            fault_service: group.fault_service.to_string(),
            episodes: group.episodes,
            mean_mttr: group
                .mean_mttr
                .map(|m| format!("{:.1}", m))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Write the report as pretty JSON, creating parent directories
fn write_report(path: &Path, report: &EvalReport<'_>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    let content = serde_json::to_string_pretty(report).context("Failed to serialize results")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write results to {}", path.display()))?;
    info!(event = "results_written", path = %path.display(), "Saved evaluation results");
    Ok(())
}

/// Run `episodes` episodes from `seed0`, save them, and summarize MTTR
pub fn run_eval(
    settings: &SimConfig,
    episodes: usize,
    seed0: u64,
    out: &Path,
    format: OutputFormat,
) -> Result<()> {
    let results = evaluate_with_progress(settings, seed0, episodes, |done, _| {
        if done % PROGRESS_EVERY == 0 || done == episodes {
            print_info(&format!("Finished {}/{} episodes...", done, episodes));
        }
    })
    .context("Evaluation failed")?;

    write_report(
        out,
        &EvalReport {
            generated_at: Utc::now(),
            seed0,
            episodes,
            settings,
            results: &results,
        },
    )?;

    let groups = mttr_by_fault(&results);
    match format {
        OutputFormat::Json => print_json(&groups)?,
        OutputFormat::Table => {
            println!("{}", "Mean MTTR by fault".bold());
            let rows: Vec<MttrRow> = groups.iter().take(MTTR_ROWS).map(MttrRow::from).collect();
            print_table(&rows, format);
            print_success(&format!("Saved: {}", out.display()));
        }
    }

    Ok(())
}
