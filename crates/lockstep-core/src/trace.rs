//! Schedule traces and the persisted trace-dump format.
//!
//! A [`ScheduleTrace`] is the flat decision log of one run: every
//! scheduling choice and every nondeterministic value, in order. It is all a
//! [`ReplayStrategy`](crate::replay::ReplayStrategy) needs to reproduce the
//! run exactly.
//!
//! # Dump format
//!
//! ```text
//! --fair-scheduling
//! --liveness-temperature-threshold:500
//! --test-method:PingPong
//! sched:0
//! sched:1
//! bool:true
//! int:3
//! ```
//!
//! Header lines start with `--`. Everything else is one decision entry per
//! line. With `--is-mintrace` the body is an event tree instead, one step
//! per line; this module only carries those lines through and leaves their
//! decoding to the program-model crate.

use crate::config::Configuration;
use crate::error::TraceParseError;
use crate::operation::OperationId;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStep {
    /// The strategy scheduled this operation.
    SchedulingChoice(OperationId),
    /// A nondeterministic boolean.
    BooleanChoice(bool),
    /// A boolean tagged with a fairness id.
    FairBooleanChoice(String, bool),
    /// A nondeterministic integer.
    IntegerChoice(u32),
}

impl fmt::Display for ScheduleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStep::SchedulingChoice(id) => write!(f, "sched:{}", id),
            ScheduleStep::BooleanChoice(value) => write!(f, "bool:{}", value),
            ScheduleStep::FairBooleanChoice(uid, value) => write!(f, "fair-bool:{}:{}", uid, value),
            ScheduleStep::IntegerChoice(value) => write!(f, "int:{}", value),
        }
    }
}

impl FromStr for ScheduleStep {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s.split_once(':').ok_or(())?;
        match kind {
            "sched" => rest
                .parse::<u64>()
                .map(|id| ScheduleStep::SchedulingChoice(OperationId(id)))
                .map_err(|_| ()),
            "bool" => rest.parse::<bool>().map(ScheduleStep::BooleanChoice).map_err(|_| ()),
            "int" => rest.parse::<u32>().map(ScheduleStep::IntegerChoice).map_err(|_| ()),
            "fair-bool" => {
                // The fairness id may itself contain ':'; the value is last.
                let (uid, value) = rest.rsplit_once(':').ok_or(())?;
                let value = value.parse::<bool>().map_err(|_| ())?;
                Ok(ScheduleStep::FairBooleanChoice(uid.to_string(), value))
            }
            _ => Err(()),
        }
    }
}

/// Ordered decision log of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTrace {
    steps: Vec<ScheduleStep>,
}

impl ScheduleTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scheduling_choice(&mut self, id: OperationId) {
        self.steps.push(ScheduleStep::SchedulingChoice(id));
    }

    pub fn push_boolean_choice(&mut self, value: bool) {
        self.steps.push(ScheduleStep::BooleanChoice(value));
    }

    pub fn push_fair_boolean_choice(&mut self, uid: impl Into<String>, value: bool) {
        self.steps.push(ScheduleStep::FairBooleanChoice(uid.into(), value));
    }

    pub fn push_integer_choice(&mut self, value: u32) {
        self.steps.push(ScheduleStep::IntegerChoice(value));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ScheduleStep> {
        self.steps.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduleStep> {
        self.steps.iter()
    }

    /// Number of scheduling (non-choice) entries.
    pub fn scheduling_choices(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, ScheduleStep::SchedulingChoice(_)))
            .count()
    }
}

impl From<Vec<ScheduleStep>> for ScheduleTrace {
    fn from(steps: Vec<ScheduleStep>) -> Self {
        Self { steps }
    }
}

/// Metadata carried in a dump's `--` header lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMetadata {
    /// `--fair-scheduling`
    pub fair_scheduling: bool,
    /// `--cycle-detection`
    pub cycle_detection: bool,
    /// `--liveness-temperature-threshold:<n>`
    pub liveness_temperature_threshold: Option<usize>,
    /// `--test-method:<name>`
    pub test_method: Option<String>,
    /// `--is-mintrace`
    pub is_mintrace: bool,
    /// `--bug-found`
    pub bug_found: bool,
    /// `--bug-step:<n>`
    pub bug_step: Option<usize>,
    /// `--liveness-monitor:<name>`, the monitor left hot by a liveness bug.
    pub liveness_monitor: Option<String>,
}

impl TraceMetadata {
    /// Metadata describing a run under `config`.
    pub fn from_config(config: &Configuration, fair: bool) -> Self {
        Self {
            fair_scheduling: fair,
            cycle_detection: config.enable_cycle_detection,
            liveness_temperature_threshold: Some(config.liveness_temperature_threshold),
            test_method: config.test_method_name.clone(),
            ..Default::default()
        }
    }

    /// Copy the settings recorded in the header onto `config`.
    pub fn apply_to(&self, config: &mut Configuration) {
        config.enable_cycle_detection = self.cycle_detection;
        if let Some(threshold) = self.liveness_temperature_threshold {
            config.liveness_temperature_threshold = threshold;
        }
        if let Some(name) = &self.test_method {
            config.test_method_name = Some(name.clone());
        }
    }

    fn header_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.fair_scheduling {
            lines.push("--fair-scheduling".to_string());
        }
        if self.cycle_detection {
            lines.push("--cycle-detection".to_string());
        }
        if let Some(threshold) = self.liveness_temperature_threshold {
            lines.push(format!("--liveness-temperature-threshold:{}", threshold));
        }
        if let Some(name) = &self.test_method {
            lines.push(format!("--test-method:{}", name));
        }
        if self.is_mintrace {
            lines.push("--is-mintrace".to_string());
        }
        if self.bug_found {
            lines.push("--bug-found".to_string());
        }
        if let Some(step) = self.bug_step {
            lines.push(format!("--bug-step:{}", step));
        }
        if let Some(monitor) = &self.liveness_monitor {
            lines.push(format!("--liveness-monitor:{}", monitor));
        }
        lines
    }

    fn apply_header(&mut self, line_no: usize, header: &str) -> Result<(), TraceParseError> {
        let (key, value) = match header.split_once(':') {
            Some((key, value)) => (key, Some(value)),
            None => (header, None),
        };
        let invalid = |value: &str| TraceParseError::InvalidHeader {
            line: line_no,
            key: key.to_string(),
            value: value.to_string(),
        };
        match (key, value) {
            ("fair-scheduling", None) => self.fair_scheduling = true,
            ("cycle-detection", None) => self.cycle_detection = true,
            ("is-mintrace", None) => self.is_mintrace = true,
            ("bug-found", None) => self.bug_found = true,
            ("liveness-temperature-threshold", Some(v)) => {
                self.liveness_temperature_threshold = Some(v.parse().map_err(|_| invalid(v))?);
            }
            ("bug-step", Some(v)) => {
                self.bug_step = Some(v.parse().map_err(|_| invalid(v))?);
            }
            ("test-method", Some(v)) => self.test_method = Some(v.to_string()),
            ("liveness-monitor", Some(v)) => self.liveness_monitor = Some(v.to_string()),
            _ => warn!("ignoring unknown trace header '--{}'", header),
        }
        Ok(())
    }
}

/// Body of a trace dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceBody {
    /// Flat decision log.
    Schedule(ScheduleTrace),
    /// Serialized event tree, one step per line.
    Mintrace(Vec<String>),
}

/// A parsed trace file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceDump {
    pub metadata: TraceMetadata,
    pub body: TraceBody,
}

impl TraceDump {
    pub fn schedule(metadata: TraceMetadata, trace: ScheduleTrace) -> Self {
        Self {
            metadata: TraceMetadata {
                is_mintrace: false,
                ..metadata
            },
            body: TraceBody::Schedule(trace),
        }
    }

    pub fn mintrace(metadata: TraceMetadata, lines: Vec<String>) -> Self {
        Self {
            metadata: TraceMetadata {
                is_mintrace: true,
                ..metadata
            },
            body: TraceBody::Mintrace(lines),
        }
    }

    /// Parse a dump from text.
    pub fn parse(text: &str) -> Result<Self, TraceParseError> {
        let mut metadata = TraceMetadata::default();
        let mut body = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            match line.strip_prefix("--") {
                Some(header) => metadata.apply_header(i + 1, header)?,
                None => body.push((i + 1, line)),
            }
        }

        let body = if metadata.is_mintrace {
            TraceBody::Mintrace(body.into_iter().map(|(_, l)| l.to_string()).collect())
        } else {
            let mut steps = Vec::with_capacity(body.len());
            for (line_no, line) in body {
                let step = line.parse::<ScheduleStep>().map_err(|_| TraceParseError::InvalidEntry {
                    line: line_no,
                    text: line.to_string(),
                })?;
                steps.push(step);
            }
            TraceBody::Schedule(ScheduleTrace::from(steps))
        };
        Ok(Self { metadata, body })
    }

    /// Render the dump as text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.metadata.header_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        match &self.body {
            TraceBody::Schedule(trace) => {
                for step in trace.iter() {
                    out.push_str(&step.to_string());
                    out.push('\n');
                }
            }
            TraceBody::Mintrace(lines) => {
                for line in lines {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Number of body entries.
    pub fn len(&self) -> usize {
        match &self.body {
            TraceBody::Schedule(trace) => trace.len(),
            TraceBody::Mintrace(lines) => lines.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load a trace dump from a file.
pub fn load_dump(path: &Path) -> Result<TraceDump, TraceParseError> {
    let text = fs::read_to_string(path)?;
    TraceDump::parse(&text)
}

/// Save a trace dump to a file.
pub fn save_dump(dump: &TraceDump, path: &Path) -> Result<(), std::io::Error> {
    fs::write(path, dump.render())
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_trace() -> ScheduleTrace {
        let mut trace = ScheduleTrace::new();
        trace.push_scheduling_choice(OperationId(0));
        trace.push_scheduling_choice(OperationId(1));
        trace.push_boolean_choice(true);
        trace.push_fair_boolean_choice("Timer:tick", false);
        trace.push_integer_choice(3);
        trace
    }

    #[test]
    fn step_text_forms() {
        assert_eq!(ScheduleStep::SchedulingChoice(OperationId(2)).to_string(), "sched:2");
        assert_eq!("bool:false".parse::<ScheduleStep>(), Ok(ScheduleStep::BooleanChoice(false)));
        assert_eq!(
            "fair-bool:a:b:true".parse::<ScheduleStep>(),
            Ok(ScheduleStep::FairBooleanChoice("a:b".into(), true))
        );
        assert!("sched:-1".parse::<ScheduleStep>().is_err());
        assert!("jump:3".parse::<ScheduleStep>().is_err());
    }

    #[test]
    fn dump_render_parse_preserves_schedule_and_headers() {
        let metadata = TraceMetadata {
            fair_scheduling: true,
            liveness_temperature_threshold: Some(250),
            test_method: Some("PingPong".into()),
            ..Default::default()
        };
        let dump = TraceDump::schedule(metadata, sample_trace());
        let text = dump.render();
        assert!(text.starts_with("--fair-scheduling\n--liveness-temperature-threshold:250\n"));

        let parsed = TraceDump::parse(&text).unwrap();
        assert_eq!(parsed, dump);
        assert_eq!(parsed.len(), 5);
    }

    #[test]
    fn mintrace_body_is_passed_through() {
        let text = "--is-mintrace\n--bug-found\n--bug-step:4\n{\"a\":1}\n\n{\"b\":2}\n";
        let dump = TraceDump::parse(text).unwrap();
        assert!(dump.metadata.is_mintrace);
        assert!(dump.metadata.bug_found);
        assert_eq!(dump.metadata.bug_step, Some(4));
        assert_eq!(
            dump.body,
            TraceBody::Mintrace(vec!["{\"a\":1}".into(), "{\"b\":2}".into()])
        );
    }

    #[test]
    fn liveness_monitor_header_round_trips() {
        let metadata = TraceMetadata {
            bug_found: true,
            bug_step: Some(2),
            liveness_monitor: Some("Progress".into()),
            ..Default::default()
        };
        let dump = TraceDump::mintrace(metadata, vec!["{}".into()]);
        let text = dump.render();
        assert!(text.contains("--liveness-monitor:Progress\n"));
        let parsed = TraceDump::parse(&text).unwrap();
        assert_eq!(parsed.metadata.liveness_monitor.as_deref(), Some("Progress"));
        assert_eq!(parsed, dump);
    }

    #[test]
    fn unknown_header_is_ignored() {
        let dump = TraceDump::parse("--some-future-flag\nsched:0\n").unwrap();
        assert_eq!(dump.len(), 1);
    }

    #[test]
    fn bad_entry_reports_line_number() {
        let err = TraceDump::parse("--fair-scheduling\nsched:0\nsched:zero\n").unwrap_err();
        match err {
            TraceParseError::InvalidEntry { line, text } => {
                assert_eq!(line, 3);
                assert_eq!(text, "sched:zero");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_header_value_is_rejected() {
        let err = TraceDump::parse("--liveness-temperature-threshold:lots\n").unwrap_err();
        assert!(matches!(err, TraceParseError::InvalidHeader { line: 1, .. }));
    }

    #[test]
    fn metadata_applies_to_config() {
        let mut config = Configuration::default();
        let metadata = TraceMetadata {
            cycle_detection: true,
            liveness_temperature_threshold: Some(42),
            test_method: Some("Raft".into()),
            ..Default::default()
        };
        metadata.apply_to(&mut config);
        assert!(config.enable_cycle_detection);
        assert_eq!(config.liveness_temperature_threshold, 42);
        assert_eq!(config.test_method_name.as_deref(), Some("Raft"));
        let back = TraceMetadata::from_config(&config, true);
        assert!(back.fair_scheduling);
        assert_eq!(back.liveness_temperature_threshold, Some(42));
    }

    #[test]
    fn save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bug.trace");
        let dump = TraceDump::schedule(TraceMetadata::default(), sample_trace());
        save_dump(&dump, &path).unwrap();
        assert_eq!(load_dump(&path).unwrap(), dump);
    }

    #[test]
    fn counts_scheduling_choices() {
        assert_eq!(sample_trace().scheduling_choices(), 2);
    }
}
