//! Message envelopes for inter-agent communication.

use crate::identity::AgentId;
use crate::time::now_millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of message being exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Task,
    Knowledge,
    Status,
    Request,
    Response,
}

/// Where a message is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Agent(AgentId),
    Broadcast,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Agent(id) => id.fmt(f),
            Recipient::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// A fire-and-forget message between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message ID
    pub id: String,

    /// Sending agent
    pub from: AgentId,

    /// Target agent or broadcast
    pub to: Recipient,

    pub kind: MessageKind,

    /// Message content
    pub content: serde_json::Value,

    /// Timestamp (Unix millis)
    pub timestamp: u64,

    /// Optional metadata
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl AgentMessage {
    pub fn new(from: AgentId, to: Recipient, kind: MessageKind, content: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from,
            to,
            kind,
            content,
            timestamp: now_millis(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The `type` field of an object payload, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.content.get("type").and_then(|v| v.as_str())
    }

    pub fn is_broadcast(&self) -> bool {
        self.to == Recipient::Broadcast
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_envelope() {
        let from = AgentId::new();
        let to = AgentId::new();
        let msg = AgentMessage::new(
            from,
            Recipient::Agent(to),
            MessageKind::Request,
            json!({"type": "review_request", "task": "t1"}),
        );

        assert_eq!(msg.from, from);
        assert_eq!(msg.to, Recipient::Agent(to));
        assert_eq!(msg.content_type(), Some("review_request"));
        assert!(!msg.is_broadcast());
        assert!(msg.timestamp > 0);
    }

    #[test]
    fn test_message_ids_unique() {
        let from = AgentId::new();
        let a = AgentMessage::new(from, Recipient::Broadcast, MessageKind::Status, json!("a"));
        let b = AgentMessage::new(from, Recipient::Broadcast, MessageKind::Status, json!("b"));
        assert_ne!(a.id, b.id);
        assert!(a.is_broadcast());
        assert_eq!(a.content_type(), None);
    }

    #[test]
    fn test_message_serialization() {
        let msg = AgentMessage::new(
            AgentId::new(),
            Recipient::Broadcast,
            MessageKind::Knowledge,
            json!({"fact": 1}),
        );
        let text = serde_json::to_string(&msg).unwrap();
        assert!(!text.contains("metadata"));
        let back: AgentMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }
}
