//! Aggregated testing statistics.

use lockstep_core::{Configuration, IterationOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Statistics aggregated over one or more runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    /// Description of the strategy that produced the runs.
    pub strategy: String,
    /// Runs that found a bug.
    pub num_of_found_bugs: usize,
    /// Distinct bug messages.
    pub bug_reports: BTreeSet<String>,
    /// Runs under a fair strategy.
    pub explored_fair_schedules: usize,
    /// Runs under an unfair strategy.
    pub explored_unfair_schedules: usize,
    /// Sum of steps over fair runs.
    pub total_explored_fair_steps: usize,
    /// Shortest fair run.
    pub min_explored_fair_steps: Option<usize>,
    /// Longest fair run.
    pub max_explored_fair_steps: Option<usize>,
    /// Fair runs that hit the fair step bound.
    pub max_fair_steps_hit_in_fair_tests: usize,
    /// Fair runs that went past the unfair step bound.
    pub max_unfair_steps_hit_in_fair_tests: usize,
    /// Unfair runs that hit the unfair step bound.
    pub max_unfair_steps_hit_in_unfair_tests: usize,
}

impl TestReport {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            ..Default::default()
        }
    }

    /// Account for one finished run.
    pub fn record_run(&mut self, outcome: &IterationOutcome, fair: bool, reached_max: bool, config: &Configuration) {
        let steps = outcome.scheduled_steps;
        if fair {
            self.explored_fair_schedules += 1;
            self.total_explored_fair_steps += steps;
            self.min_explored_fair_steps = Some(self.min_explored_fair_steps.map_or(steps, |m| m.min(steps)));
            self.max_explored_fair_steps = Some(self.max_explored_fair_steps.map_or(steps, |m| m.max(steps)));
            if reached_max {
                self.max_fair_steps_hit_in_fair_tests += 1;
            }
            if config.max_unfair_scheduling_steps > 0 && steps >= config.max_unfair_scheduling_steps {
                self.max_unfair_steps_hit_in_fair_tests += 1;
            }
        } else {
            self.explored_unfair_schedules += 1;
            if reached_max {
                self.max_unfair_steps_hit_in_unfair_tests += 1;
            }
        }

        if let Some(bug) = &outcome.bug {
            self.num_of_found_bugs += 1;
            self.bug_reports.insert(bug.message.clone());
        }
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: &TestReport) {
        if self.strategy.is_empty() {
            self.strategy = other.strategy.clone();
        }
        self.num_of_found_bugs += other.num_of_found_bugs;
        self.bug_reports.extend(other.bug_reports.iter().cloned());
        self.explored_fair_schedules += other.explored_fair_schedules;
        self.explored_unfair_schedules += other.explored_unfair_schedules;
        self.total_explored_fair_steps += other.total_explored_fair_steps;
        self.min_explored_fair_steps = min_opt(self.min_explored_fair_steps, other.min_explored_fair_steps);
        self.max_explored_fair_steps = max_opt(self.max_explored_fair_steps, other.max_explored_fair_steps);
        self.max_fair_steps_hit_in_fair_tests += other.max_fair_steps_hit_in_fair_tests;
        self.max_unfair_steps_hit_in_fair_tests += other.max_unfair_steps_hit_in_fair_tests;
        self.max_unfair_steps_hit_in_unfair_tests += other.max_unfair_steps_hit_in_unfair_tests;
    }

    /// Mean steps of a fair run, if any ran.
    pub fn avg_explored_fair_steps(&self) -> Option<f64> {
        (self.explored_fair_schedules > 0)
            .then(|| self.total_explored_fair_steps as f64 / self.explored_fair_schedules as f64)
    }

    pub fn total_schedules(&self) -> usize {
        self.explored_fair_schedules + self.explored_unfair_schedules
    }
}

fn min_opt(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Format a test report for human consumption.
pub fn format_report(report: &TestReport) -> String {
    let mut output = String::new();

    output.push_str("═══════════════════════════════════════════════════════════════════════\n");
    output.push_str("  lockstep Test Report\n");
    output.push_str("═══════════════════════════════════════════════════════════════════════\n\n");

    output.push_str(&format!("Strategy:               {}\n", report.strategy));
    output.push_str(&format!("Explored schedules:     {}\n", report.total_schedules()));
    output.push_str(&format!("  fair:                 {}\n", report.explored_fair_schedules));
    output.push_str(&format!("  unfair:               {}\n", report.explored_unfair_schedules));
    output.push_str(&format!("Bugs found:             {}\n", report.num_of_found_bugs));
    output.push('\n');

    if let Some(avg) = report.avg_explored_fair_steps() {
        output.push_str("─── Fair Schedules ────────────────────────────────────────────────────\n");
        output.push_str(&format!("Average steps:          {:.2}\n", avg));
        output.push_str(&format!(
            "Min / max steps:        {} / {}\n",
            report.min_explored_fair_steps.unwrap_or(0),
            report.max_explored_fair_steps.unwrap_or(0)
        ));
        output.push_str(&format!(
            "Hit fair bound:         {}\n",
            report.max_fair_steps_hit_in_fair_tests
        ));
        output.push_str(&format!(
            "Hit unfair bound:       {}\n",
            report.max_unfair_steps_hit_in_fair_tests
        ));
        output.push('\n');
    }
    if report.explored_unfair_schedules > 0 {
        output.push_str("─── Unfair Schedules ──────────────────────────────────────────────────\n");
        output.push_str(&format!(
            "Hit unfair bound:       {}\n",
            report.max_unfair_steps_hit_in_unfair_tests
        ));
        output.push('\n');
    }

    if !report.bug_reports.is_empty() {
        output.push_str("─── Bugs ──────────────────────────────────────────────────────────────\n");
        for (i, bug) in report.bug_reports.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, bug));
        }
    }

    output
}
