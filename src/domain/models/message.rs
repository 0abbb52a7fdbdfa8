//! The MAIL message envelope and its wire shapes.
//!
//! A [`MailMessage`] wraps one of three body shapes: a direct body shared by
//! requests and responses (single recipient), a broadcast body, or an
//! interrupt body (both fan-out). The envelope `msg_type` is the source of
//! truth for the kind; the body shapes carry the per-kind id fields
//! (`request_id`, `broadcast_id`, `interrupt_id`) so that federated peers can
//! recover the kind from the payload alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::address::{Address, ALL_AGENTS};

/// The kind of a MAIL message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Response,
    Broadcast,
    Interrupt,
    /// Sentinel marking the terminal response of a task. Reuses the
    /// broadcast body shape.
    BroadcastComplete,
}

impl MessageKind {
    /// Queue priority for this kind. Lower values are dispatched first.
    pub const fn priority(self) -> u8 {
        match self {
            Self::Interrupt | Self::BroadcastComplete => 1,
            Self::Broadcast => 2,
            Self::Request | Self::Response => 3,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Response => write!(f, "response"),
            Self::Broadcast => write!(f, "broadcast"),
            Self::Interrupt => write!(f, "interrupt"),
            Self::BroadcastComplete => write!(f, "broadcast_complete"),
        }
    }
}

/// Body shared by requests and responses: exactly one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectBody {
    /// The task this message belongs to.
    pub task_id: Uuid,
    /// The unique identifier for this request/response.
    pub request_id: Uuid,
    pub sender: Address,
    pub recipient: Address,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_swarm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_swarm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_info: Option<serde_json::Value>,
}

/// Broadcast body: one or more recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastBody {
    pub task_id: Uuid,
    /// The unique identifier for this broadcast.
    pub broadcast_id: Uuid,
    pub sender: Address,
    pub recipients: Vec<Address>,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_swarm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_swarms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_info: Option<serde_json::Value>,
}

/// Interrupt body: one or more recipients, dispatched ahead of everything
/// except terminal responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptBody {
    pub task_id: Uuid,
    /// The unique identifier for this interrupt.
    pub interrupt_id: Uuid,
    pub sender: Address,
    pub recipients: Vec<Address>,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_swarm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_swarms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_info: Option<serde_json::Value>,
}

/// One of the three wire shapes a message body can take.
///
/// Deserialization is untagged: the per-kind id field (`broadcast_id`,
/// `interrupt_id`, `request_id` + `recipient`) selects the variant, which is
/// exactly the payload-shape derivation federated peers rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Broadcast(BroadcastBody),
    Interrupt(InterruptBody),
    Direct(DirectBody),
}

impl MessageBody {
    pub fn task_id(&self) -> Uuid {
        match self {
            Self::Broadcast(b) => b.task_id,
            Self::Interrupt(i) => i.task_id,
            Self::Direct(d) => d.task_id,
        }
    }

    pub fn sender(&self) -> &Address {
        match self {
            Self::Broadcast(b) => &b.sender,
            Self::Interrupt(i) => &i.sender,
            Self::Direct(d) => &d.sender,
        }
    }

    pub fn set_sender(&mut self, sender: Address) {
        match self {
            Self::Broadcast(b) => b.sender = sender,
            Self::Interrupt(i) => i.sender = sender,
            Self::Direct(d) => d.sender = sender,
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            Self::Broadcast(b) => &b.subject,
            Self::Interrupt(i) => &i.subject,
            Self::Direct(d) => &d.subject,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Broadcast(b) => &b.body,
            Self::Interrupt(i) => &i.body,
            Self::Direct(d) => &d.body,
        }
    }

    pub fn recipients(&self) -> Vec<&Address> {
        match self {
            Self::Broadcast(b) => b.recipients.iter().collect(),
            Self::Interrupt(i) => i.recipients.iter().collect(),
            Self::Direct(d) => vec![&d.recipient],
        }
    }

    pub fn sender_swarm(&self) -> Option<&str> {
        match self {
            Self::Broadcast(b) => b.sender_swarm.as_deref(),
            Self::Interrupt(i) => i.sender_swarm.as_deref(),
            Self::Direct(d) => d.sender_swarm.as_deref(),
        }
    }

    pub fn set_sender_swarm(&mut self, swarm: impl Into<String>) {
        let swarm = Some(swarm.into());
        match self {
            Self::Broadcast(b) => b.sender_swarm = swarm,
            Self::Interrupt(i) => i.sender_swarm = swarm,
            Self::Direct(d) => d.sender_swarm = swarm,
        }
    }

    pub fn routing_info(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Broadcast(b) => b.routing_info.as_ref(),
            Self::Interrupt(i) => i.routing_info.as_ref(),
            Self::Direct(d) => d.routing_info.as_ref(),
        }
    }

    /// Derive the message kind from the payload shape alone.
    ///
    /// A direct body resolves to `Request`: requests and responses share one
    /// wire shape, so peers that need the distinction must consult the
    /// envelope or wrapper `msg_type`. Federated responses travel through the
    /// dedicated response endpoint rather than this derivation.
    pub const fn infer_kind(&self) -> MessageKind {
        match self {
            Self::Broadcast(_) => MessageKind::Broadcast,
            Self::Interrupt(_) => MessageKind::Interrupt,
            Self::Direct(_) => MessageKind::Request,
        }
    }
}

/// A message using the MAIL protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// The unique identifier for the message.
    pub id: Uuid,
    /// When the message was created, UTC.
    pub timestamp: DateTime<Utc>,
    /// The message content.
    pub message: MessageBody,
    /// The type of the message.
    pub msg_type: MessageKind,
}

impl MailMessage {
    pub const fn kind(&self) -> MessageKind {
        self.msg_type
    }

    pub fn task_id(&self) -> Uuid {
        self.message.task_id()
    }

    fn envelope(message: MessageBody, msg_type: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            message,
            msg_type,
        }
    }

    /// Build a request envelope.
    pub fn request(
        task_id: Uuid,
        sender: Address,
        recipient: Address,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::envelope(
            MessageBody::Direct(DirectBody {
                task_id,
                request_id: Uuid::new_v4(),
                sender,
                recipient,
                subject: subject.into(),
                body: body.into(),
                sender_swarm: None,
                recipient_swarm: None,
                routing_info: None,
            }),
            MessageKind::Request,
        )
    }

    /// Build a response envelope.
    pub fn response(
        task_id: Uuid,
        sender: Address,
        recipient: Address,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::envelope(
            MessageBody::Direct(DirectBody {
                task_id,
                request_id: Uuid::new_v4(),
                sender,
                recipient,
                subject: subject.into(),
                body: body.into(),
                sender_swarm: None,
                recipient_swarm: None,
                routing_info: None,
            }),
            MessageKind::Response,
        )
    }

    /// Build a broadcast envelope.
    pub fn broadcast(
        task_id: Uuid,
        sender: Address,
        recipients: Vec<Address>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::envelope(
            MessageBody::Broadcast(BroadcastBody {
                task_id,
                broadcast_id: Uuid::new_v4(),
                sender,
                recipients,
                subject: subject.into(),
                body: body.into(),
                sender_swarm: None,
                recipient_swarms: None,
                routing_info: None,
            }),
            MessageKind::Broadcast,
        )
    }

    /// Build an interrupt envelope.
    pub fn interrupt(
        task_id: Uuid,
        sender: Address,
        recipients: Vec<Address>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::envelope(
            MessageBody::Interrupt(InterruptBody {
                task_id,
                interrupt_id: Uuid::new_v4(),
                sender,
                recipients,
                subject: subject.into(),
                body: body.into(),
                sender_swarm: None,
                recipient_swarms: None,
                routing_info: None,
            }),
            MessageKind::Interrupt,
        )
    }

    /// Build the terminal `broadcast_complete` envelope for a task.
    ///
    /// Sent from the entrypoint agent to `"all"`; the body carries the finish
    /// message that answers the original submitter.
    pub fn broadcast_complete(
        task_id: Uuid,
        sender: Address,
        subject: impl Into<String>,
        body: impl Into<String>,
        swarm_name: &str,
    ) -> Self {
        Self::envelope(
            MessageBody::Broadcast(BroadcastBody {
                task_id,
                broadcast_id: Uuid::new_v4(),
                sender,
                recipients: vec![Address::agent(ALL_AGENTS)],
                subject: subject.into(),
                body: body.into(),
                sender_swarm: Some(swarm_name.to_string()),
                recipient_swarms: Some(vec![swarm_name.to_string()]),
                routing_info: Some(serde_json::json!({})),
            }),
            MessageKind::BroadcastComplete,
        )
    }

    /// Build a system response to a message, addressed to the tenant user.
    ///
    /// Used for routing failures: the envelope records the user as recipient
    /// while the runtime delivers it back to the agent that caused it.
    pub fn system_response(
        original: &Self,
        swarm_name: &str,
        user_id: &str,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::envelope(
            MessageBody::Direct(DirectBody {
                task_id: original.task_id(),
                request_id: Uuid::new_v4(),
                sender: Address::system(swarm_name),
                recipient: Address::user(user_id),
                subject: subject.into(),
                body: body.into(),
                sender_swarm: Some(swarm_name.to_string()),
                recipient_swarm: Some(swarm_name.to_string()),
                routing_info: Some(serde_json::json!({})),
            }),
            MessageKind::Response,
        )
    }

    /// Build the terminal message drained into pending futures at shutdown.
    pub fn system_shutdown(task_id: Uuid, swarm_name: &str, reason: impl Into<String>) -> Self {
        Self::broadcast_complete(
            task_id,
            Address::system(swarm_name),
            "System Shutdown",
            reason,
            swarm_name,
        )
    }
}

/// Render a message as the XML `user` turn an agent consumes.
///
/// This rendering is part of the agent contract: agents are trained against
/// this exact element structure.
pub fn render_incoming(message: &MailMessage) -> String {
    let sender = message.message.sender();
    let recipients = message.message.recipients();
    let (to_kind, to_addr) = match recipients.as_slice() {
        [single] => (single.kind.to_string(), single.address.clone()),
        many => (
            "agent".to_string(),
            many.iter()
                .map(|a| a.address.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        ),
    };

    format!(
        "\n<incoming_message>\n<timestamp>{}</timestamp>\n<from type=\"{}\">{}</from>\n<to type=\"{}\">{}</to>\n<subject>{}</subject>\n<body>{}</body>\n</incoming_message>\n",
        message.timestamp.to_rfc3339(),
        sender.kind,
        sender.address,
        to_kind,
        to_addr,
        message.message.subject(),
        message.message.text(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_priorities() {
        assert_eq!(MessageKind::Interrupt.priority(), 1);
        assert_eq!(MessageKind::BroadcastComplete.priority(), 1);
        assert_eq!(MessageKind::Broadcast.priority(), 2);
        assert_eq!(MessageKind::Request.priority(), 3);
        assert_eq!(MessageKind::Response.priority(), 3);
    }

    #[test]
    fn test_body_shape_selects_variant() {
        let broadcast = MailMessage::broadcast(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            vec![Address::agent(ALL_AGENTS)],
            "subject",
            "body",
        );
        let json = serde_json::to_string(&broadcast).unwrap();
        let back: MailMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.message, MessageBody::Broadcast(_)));
        assert_eq!(back.message.infer_kind(), MessageKind::Broadcast);

        let interrupt = MailMessage::interrupt(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            vec![Address::agent("math")],
            "halt",
            "stop everything",
        );
        let json = serde_json::to_string(&interrupt).unwrap();
        let back: MailMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.message, MessageBody::Interrupt(_)));
        assert_eq!(back.message.infer_kind(), MessageKind::Interrupt);

        let request = MailMessage::request(
            Uuid::new_v4(),
            Address::user("user_1"),
            Address::agent("supervisor"),
            "New Message",
            "hi",
        );
        let json = serde_json::to_string(&request).unwrap();
        let back: MailMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.message, MessageBody::Direct(_)));
        assert_eq!(back.message.infer_kind(), MessageKind::Request);
    }

    #[test]
    fn test_broadcast_complete_targets_all() {
        let task_id = Uuid::new_v4();
        let msg = MailMessage::broadcast_complete(
            task_id,
            Address::agent("supervisor"),
            "Task complete",
            "done",
            "alpha",
        );
        assert_eq!(msg.kind(), MessageKind::BroadcastComplete);
        assert_eq!(msg.task_id(), task_id);
        let recipients = msg.message.recipients();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].address, ALL_AGENTS);
    }

    #[test]
    fn test_system_shutdown_subject() {
        let msg = MailMessage::system_shutdown(Uuid::new_v4(), "alpha", "shutdown requested");
        assert_eq!(msg.kind(), MessageKind::BroadcastComplete);
        assert_eq!(msg.message.subject(), "System Shutdown");
    }

    #[test]
    fn test_render_incoming_structure() {
        let msg = MailMessage::request(
            Uuid::new_v4(),
            Address::user("user_7"),
            Address::agent("supervisor"),
            "Greeting",
            "hello there",
        );
        let xml = render_incoming(&msg);
        assert!(xml.contains("<incoming_message>"));
        assert!(xml.contains("<from type=\"user\">user_7</from>"));
        assert!(xml.contains("<to type=\"agent\">supervisor</to>"));
        assert!(xml.contains("<subject>Greeting</subject>"));
        assert!(xml.contains("<body>hello there</body>"));
    }
}
