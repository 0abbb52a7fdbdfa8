//! Interswarm wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{MailMessage, MessageBody, MessageKind};

/// Routing metadata attached to an interswarm wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterswarmMetadata {
    /// Envelope id of the message being forwarded.
    pub original_message_id: Uuid,
    #[serde(default)]
    pub routing_info: serde_json::Value,
    /// Whether the sender is waiting on a synchronous response.
    pub expect_response: bool,
}

/// HTTP transport wrapper for a MAIL message crossing swarms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterswarmMessage {
    pub message_id: Uuid,
    pub source_swarm: String,
    pub target_swarm: String,
    pub timestamp: DateTime<Utc>,
    /// The wrapped message body; its shape carries the per-kind id field.
    pub payload: MessageBody,
    pub msg_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<InterswarmMetadata>,
}

impl InterswarmMessage {
    /// Wrap a message for transport to `target_swarm`.
    pub fn wrap(
        message: &MailMessage,
        source_swarm: impl Into<String>,
        target_swarm: impl Into<String>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            source_swarm: source_swarm.into(),
            target_swarm: target_swarm.into(),
            timestamp: Utc::now(),
            payload: message.message.clone(),
            msg_type: message.msg_type,
            auth_token,
            metadata: Some(InterswarmMetadata {
                original_message_id: message.id,
                routing_info: message
                    .message
                    .routing_info()
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({})),
                expect_response: true,
            }),
        }
    }

    /// Reconstruct the wrapped message.
    ///
    /// The wrapper's `msg_type` is authoritative; deserializing the untagged
    /// payload already performed the shape-based variant selection.
    pub fn unwrap_message(self) -> MailMessage {
        MailMessage {
            id: self.message_id,
            timestamp: self.timestamp,
            message: self.payload,
            msg_type: self.msg_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Address;

    #[test]
    fn test_wrap_preserves_kind_and_payload_shape() {
        let original = MailMessage::broadcast(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            vec![Address::agent("analyst@beta")],
            "subject",
            "body",
        );
        let wrapper = InterswarmMessage::wrap(&original, "alpha", "beta", None);
        assert_eq!(wrapper.msg_type, MessageKind::Broadcast);

        // Shape survives a JSON round trip and still infers the same kind.
        let json = serde_json::to_string(&wrapper).unwrap();
        let back: InterswarmMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.payload.infer_kind(), original.kind());

        let recovered = back.unwrap_message();
        assert_eq!(recovered.kind(), original.kind());
        assert_eq!(recovered.message.text(), "body");
    }

    #[test]
    fn test_kind_recovery_for_each_wire_shape() {
        let task_id = Uuid::new_v4();
        let cases = vec![
            MailMessage::request(
                task_id,
                Address::agent("supervisor"),
                Address::agent("analyst@beta"),
                "s",
                "b",
            ),
            MailMessage::broadcast(
                task_id,
                Address::agent("supervisor"),
                vec![Address::agent("analyst@beta")],
                "s",
                "b",
            ),
            MailMessage::interrupt(
                task_id,
                Address::agent("supervisor"),
                vec![Address::agent("analyst@beta")],
                "s",
                "b",
            ),
        ];

        for original in cases {
            let wrapper = InterswarmMessage::wrap(&original, "alpha", "beta", None);
            let json = serde_json::to_string(&wrapper.payload).unwrap();
            let payload: MessageBody = serde_json::from_str(&json).unwrap();
            assert_eq!(payload.infer_kind(), original.kind());
        }
    }

    #[test]
    fn test_metadata_records_original_id() {
        let original = MailMessage::request(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            Address::agent("analyst@beta"),
            "s",
            "b",
        );
        let wrapper = InterswarmMessage::wrap(&original, "alpha", "beta", Some("token".into()));
        let metadata = wrapper.metadata.unwrap();
        assert_eq!(metadata.original_message_id, original.id);
        assert!(metadata.expect_response);
    }
}
