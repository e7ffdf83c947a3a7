//! Program steps and their signatures.

use lockstep_core::{Choice, EventInfo, OperationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// What a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// First step of a started operation.
    Start,
    Create,
    Send,
    Receive,
    NondetBool(bool),
    NondetInt(u32),
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Start => "Start",
            StepKind::Create => "Create",
            StepKind::Send => "Send",
            StepKind::Receive => "Receive",
            StepKind::NondetBool(_) => "NondetBool",
            StepKind::NondetInt(_) => "NondetInt",
        }
    }

    /// Nondeterministic choices are consumed by the operation that asked;
    /// they never correspond to a scheduling decision.
    pub fn is_choice(&self) -> bool {
        matches!(self, StepKind::NondetBool(_) | StepKind::NondetInt(_))
    }

    pub fn from_choice(choice: Choice) -> Self {
        match choice {
            Choice::Boolean(value) => StepKind::NondetBool(value),
            Choice::Integer(value) => StepKind::NondetInt(value),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::NondetBool(value) => write!(f, "NondetBool({})", value),
            StepKind::NondetInt(value) => write!(f, "NondetInt({})", value),
            other => f.write_str(other.label()),
        }
    }
}

/// Identity of a step that survives across runs.
///
/// Two signatures are equal when they name the same event type and the same
/// occurrence of it: "the third `Ping` send" matches in every run that sends
/// at least three pings, whatever the total ordering index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSignature {
    /// Event type name, if the step carries an event.
    pub event_name: Option<String>,
    /// Occurrence of this (kind, event name) pair within the run, from 0.
    pub event_index: usize,
    /// Total ordering index of the step in the run that produced it.
    pub index: usize,
    pub source: OperationId,
    pub kind: StepKind,
}

impl PartialEq for StepSignature {
    fn eq(&self, other: &Self) -> bool {
        self.event_name == other.event_name && self.event_index == other.event_index
    }
}

impl Eq for StepSignature {}

impl Hash for StepSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.event_name.hash(state);
        self.event_index.hash(state);
    }
}

impl fmt::Display for StepSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.index, self.source, self.kind.label())
    }
}

/// One recorded step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStep {
    /// Total ordering index; unique and increasing within a run.
    pub index: usize,
    pub kind: StepKind,
    /// Operation that performed the step.
    pub source: OperationId,
    /// Operation acted upon (created, sent to, or `source` itself).
    pub target: OperationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventInfo>,
    /// Next step of the same operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_child: Option<usize>,
    /// Start step of a created operation, or the receive of a sent message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_child: Option<usize>,
    pub signature: StepSignature,
}

impl ProgramStep {
    pub fn event_name(&self) -> Option<&str> {
        self.event.as_ref().map(|e| e.name.as_str())
    }

    /// The choice recorded by a nondeterministic step.
    pub fn choice(&self) -> Option<Choice> {
        match self.kind {
            StepKind::NondetBool(value) => Some(Choice::Boolean(value)),
            StepKind::NondetInt(value) => Some(Choice::Integer(value)),
            _ => None,
        }
    }
}

impl fmt::Display for ProgramStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}→{}", self.index, self.kind, self.source, self.target)?;
        if let Some(event) = &self.event {
            write!(f, " {}", event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn signature(name: Option<&str>, event_index: usize, index: usize) -> StepSignature {
        StepSignature {
            event_name: name.map(str::to_string),
            event_index,
            index,
            source: OperationId(1),
            kind: StepKind::Send,
        }
    }

    #[test]
    fn signature_equality_ignores_position() {
        assert_eq!(signature(Some("Ping"), 2, 5), signature(Some("Ping"), 2, 11));
        assert_ne!(signature(Some("Ping"), 2, 5), signature(Some("Ping"), 3, 5));
        assert_ne!(signature(Some("Ping"), 0, 5), signature(Some("Pong"), 0, 5));

        let set: HashSet<StepSignature> = [signature(Some("Ping"), 0, 1), signature(Some("Ping"), 0, 9)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn signature_display() {
        assert_eq!(signature(Some("Ping"), 0, 7).to_string(), "7:1:Send");
    }

    #[test]
    fn kind_helpers() {
        assert!(StepKind::NondetInt(3).is_choice());
        assert!(!StepKind::Receive.is_choice());
        assert_eq!(StepKind::from_choice(Choice::Boolean(true)), StepKind::NondetBool(true));
        assert_eq!(StepKind::NondetBool(false).to_string(), "NondetBool(false)");
        assert_eq!(StepKind::Create.to_string(), "Create");
    }

    #[test]
    fn step_json_omits_empty_links() {
        let step = ProgramStep {
            index: 0,
            kind: StepKind::Start,
            source: OperationId(0),
            target: OperationId(0),
            event: None,
            direct_child: None,
            created_child: None,
            signature: StepSignature {
                event_name: None,
                event_index: 0,
                index: 0,
                source: OperationId(0),
                kind: StepKind::Start,
            },
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(!json.contains("direct_child"));
        let back: ProgramStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back, step);
    }
}
