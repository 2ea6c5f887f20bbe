//! Colored terminal output for sync results.

use calmirror_core::config::CalendarSourceConfig;
use calmirror_core::reconcile::{ApplyReport, Operation, Plan};
use calmirror_core::sync::CalendarReport;
use owo_colors::OwoColorize;

/// Plans longer than this are summarized unless verbose.
const COMPACT_THRESHOLD: usize = 10;

pub fn calendar_name(name: &str) -> String {
    format!("📅 {}", name)
}

pub fn calendar_config(cal: &CalendarSourceConfig) -> String {
    let mut lines = vec![calendar_name(&cal.calendar_name)];
    lines.push(format!("   {}", cal.url.dimmed()));
    lines.push(
        format!(
            "   {} days back, {} days forward, every {} min",
            cal.days_back, cal.days_forward, cal.sync_interval
        )
        .dimmed()
        .to_string(),
    );
    lines.join("\n")
}

fn operation(op: &Operation) -> String {
    let text = op.to_string();
    match op {
        Operation::CreateSeries { .. } | Operation::RestoreInstance { .. } => {
            text.green().to_string()
        }
        Operation::UpdateSeries { .. }
        | Operation::TagSeries { .. }
        | Operation::OverrideInstance { .. } => text.yellow().to_string(),
        Operation::CancelSeries { .. } | Operation::CancelInstance { .. } => {
            text.red().to_string()
        }
    }
}

pub fn plan(plan: &Plan, verbose: bool) -> String {
    if plan.is_empty() {
        return "   No changes".dimmed().to_string();
    }

    if verbose || plan.len() <= COMPACT_THRESHOLD {
        return plan
            .iter()
            .map(|op| format!("   {}", operation(op)))
            .collect::<Vec<_>>()
            .join("\n");
    }

    let series = plan.iter().filter(|op| !op.is_instance_op()).count();
    let instances = plan.len() - series;
    format!(
        "   {} series changes, {} instance changes (use -v to list them)",
        series, instances
    )
}

fn applied(report: &ApplyReport) -> String {
    let line = format!("   {}", report);
    if report.failed > 0 {
        line.red().to_string()
    } else {
        line
    }
}

pub fn calendar_report(report: &CalendarReport, verbose: bool) -> String {
    let mut lines = vec![format!(
        "   {} source events in window",
        report.source_events
    )
    .dimmed()
    .to_string()];

    match &report.applied {
        Some(_) if report.plan.is_empty() => lines.push("   No changes".dimmed().to_string()),
        Some(applied_report) => lines.push(applied(applied_report)),
        None => lines.push(plan(&report.plan, verbose)),
    }

    lines.join("\n")
}
