//! Single-episode demo run

use aiops_lib::observability::render_metrics;
use aiops_lib::{AgentStep, EpisodeRun, EpisodeSummary, ServiceId, SimConfig, StepResult};
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use crate::output::{
    color_confidence, color_reward, color_slo, format_percent, format_tick, print_json,
    print_success, print_table, print_warning, OutputFormat,
};

/// Ticks between routine timeline lines
const TIMELINE_EVERY: u32 = 5;

/// Row for the action counts table
#[derive(Tabled, Serialize)]
struct ActionCountRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Count")]
    count: u32,
}

/// One rendered timeline tick
#[derive(Serialize)]
struct TimelineEntry {
    tick: u32,
    req_rate: f64,
    api_latency_ms: f64,
    api_error_rate: f64,
    slo_violation: bool,
    anomaly: bool,
    suspect: String,
    confidence: f64,
    action: String,
}

impl TimelineEntry {
    fn from_step(step: &AgentStep, result: &StepResult) -> Self {
        let tel = &result.telemetry;
        Self {
            tick: step.tick,
            req_rate: tel.req_rate,
            api_latency_ms: tel.latency(ServiceId::Api),
            api_error_rate: tel.errors(ServiceId::Api),
            slo_violation: tel.slo_violation,
            anomaly: step.detection.is_anomaly,
            suspect: step.rca.primary_service.to_string(),
            confidence: step.rca.confidence,
            action: step.decision.action.to_string(),
        }
    }
}

/// Periodic ticks plus every tick the agent treated as an incident
fn timeline(run: &EpisodeRun) -> Vec<TimelineEntry> {
    run.trace
        .iter()
        .filter(|(step, _)| step.tick % TIMELINE_EVERY == 0 || step.is_incident())
        .map(|(step, result)| TimelineEntry::from_step(step, result))
        .collect()
}

#[derive(Serialize)]
struct RunReport<'a> {
    summary: &'a EpisodeSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeline: Option<Vec<TimelineEntry>>,
}

/// Run one episode and print its report
pub fn run_episode(
    settings: &SimConfig,
    render: bool,
    show_metrics: bool,
    format: OutputFormat,
) -> Result<()> {
    info!(
        seed = settings.seed,
        steps = settings.steps,
        use_bandit = settings.use_bandit,
        "Running episode"
    );
    let run = aiops_lib::run_episode(settings).context("Episode failed")?;
    let summary = &run.summary;

    match format {
        OutputFormat::Json => {
            print_json(&RunReport {
                summary,
                timeline: render.then(|| timeline(&run)),
            })?;
        }
        OutputFormat::Table => {
            println!(
                "{} {} on {} at t={} for {} steps (sev={:.2})",
                "Injected fault:".bold(),
                summary.fault_kind,
                summary.fault_service.to_string().bold(),
                summary.fault_start_tick,
                summary.fault_duration,
                summary.fault_severity
            );

            if render {
                for entry in timeline(&run) {
                    println!(
                        "t={:03} req={:6.1} api_lat={:7.1}ms api_err={} slo={} RCA={}({}) act={}",
                        entry.tick,
                        entry.req_rate,
                        entry.api_latency_ms,
                        format_percent(entry.api_error_rate),
                        color_slo(entry.slo_violation),
                        entry.suspect,
                        color_confidence(entry.confidence),
                        entry.action
                    );
                }
            }

            println!();
            println!("{}", "Incident Report".bold());
            println!("{}", "=".repeat(50));
            println!(
                "First SLO violation at:  t={}",
                format_tick(summary.first_violation_tick)
            );
            println!("Recovered at:            t={}", format_tick(summary.recovery_tick));
            if let Some(mttr) = summary.mttr_proxy {
                println!("MTTR (proxy):            {} steps", mttr);
            }
            println!("Anomaly steps:           {}", summary.anomaly_steps);
            println!("SLO violation steps:     {}", summary.slo_steps);
            println!("Total reward:            {}", color_reward(summary.total_reward));
            println!();

            match (summary.first_violation_tick, summary.recovery_tick) {
                (None, _) => print_success("No SLO violation during the episode"),
                (Some(_), None) => print_warning("Incident did not recover before the episode ended"),
                (Some(_), Some(_)) => print_success("Recovered from the incident"),
            }
            println!();

            println!("{}", "Action counts".bold());
            let rows: Vec<ActionCountRow> = summary
                .action_counts
                .iter()
                .map(|c| ActionCountRow {
                    action: c.action.clone(),
                    count: c.count,
                })
                .collect();
            print_table(&rows, format);
        }
    }

    if show_metrics {
        let text = render_metrics().context("Failed to encode metrics")?;
        println!();
        print!("{}", text);
    }

    Ok(())
}
