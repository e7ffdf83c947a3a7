//! Schedulable operations and their declared next actions.
//!
//! A [`SchedulableOperation`] is a snapshot of one controlled concurrent
//! unit at a scheduling point. The scheduler builds a fresh snapshot list
//! for every decision and hands it to the strategy; strategies never hold
//! on to operation state between calls.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a controlled operation.
///
/// Id `0` is reserved for the test harness, which is always the first
/// registered operation of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl OperationId {
    /// The test-harness pseudo-operation.
    pub const HARNESS: OperationId = OperationId(0);

    /// Raw numeric value.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OperationId {
    fn from(value: u64) -> Self {
        OperationId(value)
    }
}

/// Kind of action an operation declares before yielding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// The operation is starting its first handler.
    Start,
    /// The operation is about to create another operation.
    Create,
    /// The operation is about to send a message.
    Send,
    /// The operation is about to dequeue a message.
    Receive,
    /// The operation has finished and is handing control back.
    Stop,
    /// Explicit yield with no externally visible effect.
    Yield,
    /// The operation waits for another operation to complete.
    Join,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationType::Start => "Start",
            OperationType::Create => "Create",
            OperationType::Send => "Send",
            OperationType::Receive => "Receive",
            OperationType::Stop => "Stop",
            OperationType::Yield => "Yield",
            OperationType::Join => "Join",
        };
        f.write_str(name)
    }
}

/// What the declared action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    /// Another operation (create, join).
    Operation,
    /// An operation's inbox (send, receive).
    Inbox,
}

/// The action an operation declared at its most recent scheduling point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    /// Kind of action.
    pub operation_type: OperationType,
    /// Kind of target.
    pub target_type: TargetType,
    /// Target operation id.
    pub target_id: OperationId,
    /// For a declared `Receive`, the step index of the send being matched.
    pub matching_send_index: Option<usize>,
}

impl NextAction {
    /// Declared action of a freshly registered operation.
    pub fn start(id: OperationId) -> Self {
        Self {
            operation_type: OperationType::Start,
            target_type: TargetType::Operation,
            target_id: id,
            matching_send_index: None,
        }
    }

    /// Construct an action without a matching send index.
    pub fn new(operation_type: OperationType, target_type: TargetType, target_id: OperationId) -> Self {
        Self {
            operation_type,
            target_type,
            target_id,
            matching_send_index: None,
        }
    }
}

/// Snapshot of one controlled operation at a scheduling point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulableOperation {
    /// Unique id within the run.
    pub id: OperationId,
    /// Human-readable name (used in livelock and bug messages).
    pub name: String,
    /// Whether the operation can be scheduled now.
    pub is_enabled: bool,
    /// Whether the operation has halted.
    pub is_completed: bool,
    /// Whether the operation is blocked waiting for a message.
    pub is_waiting_to_receive: bool,
    /// Action declared at the most recent scheduling point.
    pub next: NextAction,
    /// Number of scheduling points this operation has passed.
    pub operation_count: u64,
}

impl SchedulableOperation {
    /// A newly registered, enabled operation.
    pub fn new(id: OperationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_enabled: true,
            is_completed: false,
            is_waiting_to_receive: false,
            next: NextAction::start(id),
            operation_count: 0,
        }
    }
}

/// Ids of the enabled operations in `choices`, in the order given.
pub fn enabled_ids(choices: &[SchedulableOperation]) -> Vec<OperationId> {
    choices
        .iter()
        .filter(|op| op.is_enabled)
        .map(|op| op.id)
        .collect()
}
