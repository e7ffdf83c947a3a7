//! Event trees: one run's steps in an index-addressed arena.
//!
//! Steps are stored in total-ordering order, so a step's index is its
//! position in the arena. Links between steps (`direct_child`,
//! `created_child`) are indices that always point forward. Withheld sends
//! are tracked as a separate index set rather than by editing the steps.
//!
//! # Mintrace format
//!
//! A tree persists as a mintrace: the usual `--` header block (with
//! `--is-mintrace`, plus `--bug-found`, `--bug-step:<n>` and, for liveness
//! bugs, `--liveness-monitor:<name>` for the run's result) followed by one
//! JSON object per step:
//!
//! ```text
//! --is-mintrace
//! --bug-found
//! --bug-step:3
//! {"step":{"index":0,"kind":"Start",...}}
//! {"step":{"index":1,"kind":"Send",...},"withheld":true}
//! ```

use crate::error::ModelError;
use crate::step::{ProgramStep, StepKind, StepSignature};
use lockstep_core::trace::{load_dump, save_dump};
use lockstep_core::{OperationId, TraceBody, TraceDump, TraceMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// The steps of one concrete run, plus its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTree {
    pub(crate) steps: Vec<ProgramStep>,
    pub(crate) withheld: BTreeSet<usize>,
    pub(crate) bug_found: bool,
    pub(crate) bug_step: Option<usize>,
    pub(crate) liveness_monitor: Option<String>,
}

impl Default for EventTree {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTree {
    /// A tree holding only the harness root.
    pub fn new() -> Self {
        let root = ProgramStep {
            index: 0,
            kind: StepKind::Start,
            source: OperationId::HARNESS,
            target: OperationId::HARNESS,
            event: None,
            direct_child: None,
            created_child: None,
            signature: StepSignature {
                event_name: None,
                event_index: 0,
                index: 0,
                source: OperationId::HARNESS,
                kind: StepKind::Start,
            },
        };
        Self {
            steps: vec![root],
            withheld: BTreeSet::new(),
            bug_found: false,
            bug_step: None,
            liveness_monitor: None,
        }
    }

    /// Build a tree from raw steps, validating it.
    pub fn from_steps(steps: Vec<ProgramStep>, withheld: BTreeSet<usize>) -> Result<Self, ModelError> {
        let tree = Self {
            steps,
            withheld,
            bug_found: false,
            bug_step: None,
            liveness_monitor: None,
        };
        tree.validate()?;
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn root(&self) -> &ProgramStep {
        &self.steps[0]
    }

    pub fn get(&self, index: usize) -> Option<&ProgramStep> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[ProgramStep] {
        &self.steps
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProgramStep> {
        self.steps.iter()
    }

    pub fn last_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn is_withheld(&self, index: usize) -> bool {
        self.withheld.contains(&index)
    }

    /// Indices of sends whose delivery was withheld.
    pub fn withheld(&self) -> &BTreeSet<usize> {
        &self.withheld
    }

    pub fn bug_found(&self) -> bool {
        self.bug_found
    }

    /// Step that triggered the bug, if the run found one.
    pub fn bug_step(&self) -> Option<usize> {
        self.bug_step
    }

    /// Monitor that stayed hot, for liveness bugs.
    pub fn liveness_monitor(&self) -> Option<&str> {
        self.liveness_monitor.as_deref()
    }

    /// Record the run's result on the tree.
    pub fn set_bug(&mut self, bug_step: Option<usize>) {
        self.bug_found = true;
        self.bug_step = bug_step;
    }

    /// Step kinds and endpoints in ordering order.
    ///
    /// Two runs of the same schedule produce equal shapes.
    pub fn shape(&self) -> Vec<(StepKind, OperationId, OperationId)> {
        self.steps.iter().map(|s| (s.kind, s.source, s.target)).collect()
    }

    /// Number of non-choice steps, i.e. steps that took a scheduling decision.
    pub fn scheduling_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.kind.is_choice()).count()
    }

    /// Check the structural invariants of the arena.
    pub fn validate(&self) -> Result<(), ModelError> {
        let root = self
            .steps
            .first()
            .ok_or_else(|| ModelError::Malformed("tree has no steps".into()))?;
        if root.kind != StepKind::Start || root.source != OperationId::HARNESS {
            return Err(ModelError::Malformed(format!(
                "root step must be the harness start, found {}",
                root
            )));
        }

        let len = self.steps.len();
        for (position, step) in self.steps.iter().enumerate() {
            if step.index != position {
                return Err(ModelError::Malformed(format!(
                    "step at position {} has index {}",
                    position, step.index
                )));
            }
            for (label, child) in [("direct", step.direct_child), ("created", step.created_child)] {
                if let Some(child) = child {
                    if child <= position || child >= len {
                        return Err(ModelError::Malformed(format!(
                            "step {} has dangling {} child {}",
                            position, label, child
                        )));
                    }
                }
            }
        }

        if let Some(&index) = self.withheld.iter().find(|&&i| i >= len || self.steps[i].kind != StepKind::Send) {
            return Err(ModelError::Malformed(format!("withheld step {} is not a send", index)));
        }
        if let Some(step) = self.bug_step.filter(|&s| s >= len) {
            return Err(ModelError::Malformed(format!(
                "bug step {} is past the last step {}",
                step,
                len - 1
            )));
        }
        Ok(())
    }

    // ── Mintrace ────────────────────────────────────────────────────────

    /// Serialize as a mintrace dump, carrying `metadata`'s other headers.
    pub fn to_mintrace(&self, metadata: TraceMetadata) -> Result<TraceDump, ModelError> {
        let metadata = TraceMetadata {
            bug_found: self.bug_found,
            bug_step: self.bug_step,
            liveness_monitor: self.liveness_monitor.clone(),
            ..metadata
        };
        let mut lines = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let line = MintraceLineRef {
                step,
                withheld: self.withheld.contains(&step.index),
            };
            lines.push(serde_json::to_string(&line)?);
        }
        Ok(TraceDump::mintrace(metadata, lines))
    }

    /// Decode and validate a mintrace dump.
    pub fn from_mintrace(dump: &TraceDump) -> Result<Self, ModelError> {
        let lines = match (&dump.body, dump.metadata.is_mintrace) {
            (TraceBody::Mintrace(lines), true) => lines,
            _ => return Err(ModelError::NotMintrace),
        };

        let mut steps = Vec::with_capacity(lines.len());
        let mut withheld = BTreeSet::new();
        for (i, line) in lines.iter().enumerate() {
            let decoded: MintraceLine =
                serde_json::from_str(line).map_err(|source| ModelError::InvalidStep { line: i + 1, source })?;
            if decoded.withheld {
                withheld.insert(decoded.step.index);
            }
            steps.push(decoded.step);
        }

        let tree = Self {
            steps,
            withheld,
            bug_found: dump.metadata.bug_found,
            bug_step: dump.metadata.bug_step,
            liveness_monitor: dump.metadata.liveness_monitor.clone(),
        };
        tree.validate()?;
        Ok(tree)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let dump = load_dump(path)?;
        Self::from_mintrace(&dump)
    }

    pub fn save(&self, metadata: TraceMetadata, path: &Path) -> Result<(), ModelError> {
        let dump = self.to_mintrace(metadata)?;
        save_dump(&dump, path)?;
        Ok(())
    }
}

impl fmt::Display for EventTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}", step)?;
            if self.withheld.contains(&step.index) {
                f.write_str(" [withheld]")?;
            }
            if self.bug_step == Some(step.index) {
                f.write_str(" [bug]")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct MintraceLineRef<'a> {
    step: &'a ProgramStep,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    withheld: bool,
}

#[derive(Deserialize)]
struct MintraceLine {
    step: ProgramStep,
    #[serde(default)]
    withheld: bool,
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
