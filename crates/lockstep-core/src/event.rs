//! Event metadata reported by the runtime.
//!
//! The runtime describes every message it creates, sends or dequeues with an
//! [`EventInfo`]. The payload itself never crosses into the engine; only a
//! structural hash of the fields the runtime considers semantically relevant.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Runtime-assigned identity of one message instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Metadata of one event (message) observed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Event type name, e.g. `"Ping"`.
    pub name: String,
    /// Links a send to the receive that dequeues it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Structural hash of the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<u64>,
}

impl EventInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message_id: None,
            payload_hash: None,
        }
    }

    pub fn with_message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    /// Attach a structural hash of `payload`.
    ///
    /// Callers pass a projection that excludes ids and timestamps, so two
    /// runs that perform "the same" send produce the same hash.
    pub fn with_payload<T: Hash + ?Sized>(mut self, payload: &T) -> Self {
        self.payload_hash = Some(payload_hash(payload));
        self
    }
}

impl fmt::Display for EventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(hash) = self.payload_hash {
            write!(f, "#{:016x}", hash)?;
        }
        Ok(())
    }
}

/// Stable structural hash used for payload comparison across runs.
pub fn payload_hash<T: Hash + ?Sized>(payload: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    payload.hash(&mut hasher);
    hasher.finish()
}

/// A nondeterministic value handed to the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    Boolean(bool),
    Integer(u32),
}

/// Whether a sent event reaches the target's inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Deliver,
    /// The event is dropped; the send still counts as a step.
    Withhold,
}

impl Delivery {
    #[inline]
    pub fn is_delivered(self) -> bool {
        matches!(self, Delivery::Deliver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Hash)]
    struct Ping {
        round: u32,
    }

    #[test]
    fn equal_payloads_hash_equal() {
        let a = EventInfo::new("Ping").with_payload(&Ping { round: 3 });
        let b = EventInfo::new("Ping")
            .with_message_id(MessageId(99))
            .with_payload(&Ping { round: 3 });
        assert_eq!(a.payload_hash, b.payload_hash);
        assert_ne!(a, b, "message id still distinguishes instances");
    }

    #[test]
    fn different_payloads_hash_differently() {
        let a = EventInfo::new("Ping").with_payload(&Ping { round: 1 });
        let b = EventInfo::new("Ping").with_payload(&Ping { round: 2 });
        assert_ne!(a.payload_hash, b.payload_hash);
    }

    #[test]
    fn display_includes_hash_when_present() {
        assert_eq!(EventInfo::new("Tick").to_string(), "Tick");
        let shown = EventInfo::new("Tick").with_payload("x").to_string();
        assert!(shown.starts_with("Tick#"));
    }

    #[test]
    fn optional_fields_skipped_in_json() {
        let json = serde_json::to_string(&EventInfo::new("Tick")).unwrap();
        assert_eq!(json, r#"{"name":"Tick"}"#);
        let back: EventInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventInfo::new("Tick"));
    }

    #[test]
    fn delivery_flag() {
        assert!(Delivery::Deliver.is_delivered());
        assert!(!Delivery::Withhold.is_delivered());
    }
}
