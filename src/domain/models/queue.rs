//! Priority queue for MAIL message dispatch.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::message::MailMessage;

/// Queue entry wrapper.
///
/// Ordering is defined solely by the `(priority, seq)` pair; the envelope is
/// never compared. Lower priority values are dequeued first, ties broken by
/// the monotonic sequence number (FIFO within a priority class).
#[derive(Debug, Clone)]
struct QueueEntry {
    priority: u8,
    seq: u64,
    message: MailMessage,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the lowest (priority, seq) first.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority message queue.
///
/// Messages are ordered by the priority class of their kind (interrupt and
/// broadcast_complete first, then broadcast, then request/response) and
/// within a class by submission order.
///
/// # Examples
///
/// ```
/// use mail::domain::models::{Address, MailMessage, MessageKind, MessageQueue};
/// use uuid::Uuid;
///
/// let task = Uuid::new_v4();
/// let mut queue = MessageQueue::new();
/// queue.push(MailMessage::request(
///     task,
///     Address::user("user_1"),
///     Address::agent("supervisor"),
///     "subject",
///     "body",
/// ));
/// queue.push(MailMessage::interrupt(
///     task,
///     Address::agent("supervisor"),
///     vec![Address::agent("math")],
///     "halt",
///     "stop",
/// ));
///
/// assert_eq!(queue.pop().unwrap().kind(), MessageKind::Interrupt);
/// assert_eq!(queue.pop().unwrap().kind(), MessageKind::Request);
/// ```
#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: BinaryHeap<QueueEntry>,
    seq: u64,
}

impl MessageQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Enqueue a message under the priority derived from its kind.
    ///
    /// Returns the `(priority, seq)` pair assigned to the entry.
    pub fn push(&mut self, message: MailMessage) -> (u8, u64) {
        let priority = message.kind().priority();
        self.seq += 1;
        let seq = self.seq;
        self.entries.push(QueueEntry {
            priority,
            seq,
            message,
        });
        (priority, seq)
    }

    /// Remove and return the next message to dispatch.
    pub fn pop(&mut self) -> Option<MailMessage> {
        self.entries.pop().map(|entry| entry.message)
    }

    /// Returns the number of queued messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no messages are queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last assigned sequence number.
    pub const fn last_seq(&self) -> u64 {
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Address, MessageKind};
    use uuid::Uuid;

    fn request(body: &str) -> MailMessage {
        MailMessage::request(
            Uuid::new_v4(),
            Address::user("user_1"),
            Address::agent("supervisor"),
            "subject",
            body,
        )
    }

    fn broadcast(body: &str) -> MailMessage {
        MailMessage::broadcast(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            vec![Address::agent("all")],
            "subject",
            body,
        )
    }

    fn interrupt(body: &str) -> MailMessage {
        MailMessage::interrupt(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            vec![Address::agent("math")],
            "subject",
            body,
        )
    }

    #[test]
    fn test_new_queue_is_empty() {
        let queue = MessageQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_priority_preemption() {
        // Submission order: request, broadcast, interrupt.
        // Dequeue order: interrupt, broadcast, request.
        let mut queue = MessageQueue::new();
        queue.push(request("r1"));
        queue.push(broadcast("b1"));
        queue.push(interrupt("i1"));

        assert_eq!(queue.pop().unwrap().kind(), MessageKind::Interrupt);
        assert_eq!(queue.pop().unwrap().kind(), MessageKind::Broadcast);
        assert_eq!(queue.pop().unwrap().kind(), MessageKind::Request);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_priority_class() {
        let mut queue = MessageQueue::new();
        queue.push(request("first"));
        queue.push(request("second"));
        queue.push(request("third"));

        assert_eq!(queue.pop().unwrap().message.text(), "first");
        assert_eq!(queue.pop().unwrap().message.text(), "second");
        assert_eq!(queue.pop().unwrap().message.text(), "third");
    }

    #[test]
    fn test_seq_strictly_increases() {
        let mut queue = MessageQueue::new();
        let (_, s1) = queue.push(request("a"));
        let (_, s2) = queue.push(broadcast("b"));
        let (_, s3) = queue.push(interrupt("c"));
        assert!(s1 < s2 && s2 < s3);
        assert_eq!(queue.last_seq(), s3);
    }

    #[test]
    fn test_broadcast_complete_shares_top_priority() {
        let mut queue = MessageQueue::new();
        queue.push(broadcast("b1"));
        queue.push(MailMessage::broadcast_complete(
            Uuid::new_v4(),
            Address::agent("supervisor"),
            "Task complete",
            "done",
            "alpha",
        ));
        queue.push(interrupt("i1"));

        // broadcast_complete and interrupt share priority 1; FIFO applies.
        assert_eq!(queue.pop().unwrap().kind(), MessageKind::BroadcastComplete);
        assert_eq!(queue.pop().unwrap().kind(), MessageKind::Interrupt);
        assert_eq!(queue.pop().unwrap().kind(), MessageKind::Broadcast);
    }

    #[test]
    fn test_interleaved_priorities() {
        let mut queue = MessageQueue::new();
        queue.push(request("r1"));
        queue.push(interrupt("i1"));
        queue.push(request("r2"));
        queue.push(broadcast("b1"));
        queue.push(interrupt("i2"));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|m| m.message.text().to_string())
            .collect();
        assert_eq!(order, vec!["i1", "i2", "b1", "r1", "r2"]);
    }
}
