//! Persistence for minimization reports.

use crate::report::MinimizationReport;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while saving or loading reports.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Save a report as JSON.
pub fn save_report_json(report: &MinimizationReport, path: &Path) -> Result<(), SerializeError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

pub fn load_report_json(path: &Path) -> Result<MinimizationReport, SerializeError> {
    let file = File::open(path)?;
    let report = serde_json::from_reader(file)?;
    Ok(report)
}

/// Save a report as a markdown summary.
pub fn save_report_markdown(report: &MinimizationReport, path: &Path) -> Result<(), SerializeError> {
    let markdown = format_report_markdown(report);
    let mut file = File::create(path)?;
    file.write_all(markdown.as_bytes())?;
    Ok(())
}

/// Format a report as markdown.
pub fn format_report_markdown(report: &MinimizationReport) -> String {
    let mut md = String::new();

    match &report.test_method {
        Some(test) => md.push_str(&format!("# Minimized trace: {}\n\n", test)),
        None => md.push_str("# Minimized trace\n\n"),
    }
    md.push_str(&format!(
        "Reduced a {}-entry trace to {} steps in {} iterations with `{}`.\n\n",
        report.original_length, report.minimized_length, report.iterations, report.strategy
    ));

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- **Withheld sends:** {}\n", report.withheld_sends.len()));
    match report.critical_transition {
        Some(step) => md.push_str(&format!("- **Critical transition:** step {}\n", step)),
        None => md.push_str("- **Critical transition:** not searched\n"),
    }
    if let Some(step) = report.bug_step {
        md.push_str(&format!("- **Bug step:** {}\n", step));
    }
    md.push('\n');

    if !report.edit_trials.is_empty() {
        md.push_str("## Withhold Trials\n\n");
        md.push_str("| Sends | Reproduced |\n");
        md.push_str("|-------|------------|\n");
        for trial in &report.edit_trials {
            let (start, end) = trial.range;
            let sends = if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            };
            md.push_str(&format!("| {} | {} |\n", sends, if trial.reproduced { "yes" } else { "no" }));
        }
        md.push('\n');
    }

    md.push_str("## Steps\n\n");
    md.push_str("| # | Kind | Source | Target | Event | Note |\n");
    md.push_str("|---|------|--------|--------|-------|------|\n");
    for step in &report.steps {
        let event = step.event_name().unwrap_or("-");
        let note = if report.bug_step == Some(step.index) {
            "bug"
        } else if report.withheld_sends.contains(&step.index) {
            "withheld"
        } else {
            ""
        };
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            step.index, step.kind, step.source, step.target, event, note
        ));
    }
    md.push('\n');

    md
}
