//! Task telemetry buffering.
//!
//! Two buffers back the streaming API: an append-only history and a "fresh"
//! buffer holding events not yet drained by a consumer. A single-permit
//! notifier flags availability; consumers drain everything on wake, which
//! avoids busy-waiting without per-event channel traffic.

use std::sync::Mutex;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::models::{EventKind, TaskEvent};

/// Shared event buffer for one runtime.
#[derive(Debug, Default)]
pub struct EventStream {
    history: Mutex<Vec<TaskEvent>>,
    fresh: Mutex<Vec<TaskEvent>>,
    available: Notify,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and flag availability.
    pub fn publish(&self, event: TaskEvent) {
        self.fresh
            .lock()
            .expect("event buffer lock poisoned")
            .push(event);
        self.available.notify_one();
    }

    /// Convenience wrapper building the event in place.
    pub fn emit(&self, kind: EventKind, task_id: Uuid, description: impl Into<String>) {
        self.publish(TaskEvent::new(kind, task_id, description));
    }

    /// Drain all fresh events into the history, returning them.
    ///
    /// Draining clears the availability flag implicitly: the notifier holds
    /// at most one permit, consumed by the waiter that performs the drain.
    pub fn drain(&self) -> Vec<TaskEvent> {
        let drained = std::mem::take(&mut *self.fresh.lock().expect("event buffer lock poisoned"));
        if !drained.is_empty() {
            self.history
                .lock()
                .expect("event buffer lock poisoned")
                .extend(drained.iter().cloned());
        }
        drained
    }

    /// Wait until at least one fresh event has been published.
    pub async fn wait_available(&self) {
        self.available.notified().await;
    }

    /// All events recorded for a task, drained or not.
    pub fn events_for_task(&self, task_id: Uuid) -> Vec<TaskEvent> {
        let mut out: Vec<TaskEvent> = self
            .history
            .lock()
            .expect("event buffer lock poisoned")
            .iter()
            .filter(|event| event.task_id == task_id)
            .cloned()
            .collect();
        out.extend(
            self.fresh
                .lock()
                .expect("event buffer lock poisoned")
                .iter()
                .filter(|event| event.task_id == task_id)
                .cloned(),
        );
        out
    }
}
