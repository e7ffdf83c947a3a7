//! Minimization results and their console rendering.

use crate::editor::{EditTrial, TraceEditor};
use lockstep_core::TraceMetadata;
use lockstep_model::ProgramStep;
use serde::{Deserialize, Serialize};

/// Outcome of a minimization session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimizationReport {
    /// Description of the strategy that ran the session.
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_method: Option<String>,
    /// Entries in the input trace.
    pub original_length: usize,
    /// Steps in the best event tree.
    pub minimized_length: usize,
    /// Steps of the best tree whose sends are withheld.
    pub withheld_sends: Vec<usize>,
    pub critical_transition: Option<usize>,
    pub bug_step: Option<usize>,
    pub iterations: usize,
    pub edit_trials: Vec<EditTrial>,
    /// The best tree, in ordering order.
    pub steps: Vec<ProgramStep>,
}

impl MinimizationReport {
    pub(crate) fn from_editor(
        editor: &TraceEditor,
        strategy: String,
        metadata: &TraceMetadata,
        original_length: usize,
    ) -> Self {
        let best = editor.best();
        Self {
            strategy,
            test_method: metadata.test_method.clone(),
            original_length,
            minimized_length: best.map_or(0, |tree| tree.len()),
            withheld_sends: best.map_or_else(Vec::new, |tree| tree.withheld().iter().copied().collect()),
            critical_transition: editor.critical_transition(),
            bug_step: best.and_then(|tree| tree.bug_step()),
            iterations: editor.iterations(),
            edit_trials: editor.edit_trials().to_vec(),
            steps: best.map_or_else(Vec::new, |tree| tree.steps().to_vec()),
        }
    }

    /// Withhold trials that still reproduced the bug.
    pub fn accepted_edits(&self) -> usize {
        self.edit_trials.iter().filter(|trial| trial.reproduced).count()
    }
}

/// Format a minimization report for human consumption.
pub fn format_report(report: &MinimizationReport) -> String {
    let mut output = String::new();

    output.push_str("═══════════════════════════════════════════════════════════════════════\n");
    output.push_str("  lockstep Minimization Report\n");
    output.push_str("═══════════════════════════════════════════════════════════════════════\n\n");

    if let Some(test) = &report.test_method {
        output.push_str(&format!("Test:                   {}\n", test));
    }
    output.push_str(&format!("Strategy:               {}\n", report.strategy));
    output.push_str(&format!("Iterations:             {}\n", report.iterations));
    output.push_str(&format!("Original length:        {}\n", report.original_length));
    output.push_str(&format!("Minimized length:       {}\n", report.minimized_length));
    output.push_str(&format!("Withheld sends:         {}\n", report.withheld_sends.len()));
    match report.critical_transition {
        Some(step) => output.push_str(&format!("Critical transition:    step {}\n", step)),
        None => output.push_str("Critical transition:    not searched\n"),
    }
    if let Some(step) = report.bug_step {
        output.push_str(&format!("Bug step:               {}\n", step));
    }
    output.push('\n');

    if !report.edit_trials.is_empty() {
        output.push_str("─── Withhold Trials ───────────────────────────────────────────────────\n");
        for trial in &report.edit_trials {
            let (start, end) = trial.range;
            let verdict = if trial.reproduced { "kept bug" } else { "lost bug" };
            output.push_str(&format!("  sends {:>3}..={:<3}  {}\n", start, end, verdict));
        }
        output.push('\n');
    }

    if !report.steps.is_empty() {
        output.push_str("─── Minimized Trace ───────────────────────────────────────────────────\n");
        for step in &report.steps {
            output.push_str(&format!("  {}", step));
            if report.withheld_sends.contains(&step.index) {
                output.push_str("  [withheld]");
            }
            if report.bug_step == Some(step.index) {
                output.push_str("  ◄ bug");
            }
            output.push('\n');
        }
    }

    output
}
