// src/events.rs

//! Live update fan-out.
//!
//! An [`EventHub`] is built once by the process bootstrap and handed to the
//! engine; transports that push updates to clients subscribe to it.
//! Publishing never blocks and never fails: with no subscribers, or with a
//! lagging subscriber, events are dropped for that subscriber.

use tokio::sync::broadcast;
use tracing::trace;

use crate::model::{ApprovalId, ProjectId, TaskId};
use crate::types::{ApprovalStatus, TaskAction, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    TaskChanged {
        project_id: ProjectId,
        task_id: TaskId,
        action: TaskAction,
        from: Option<TaskStatus>,
        to: TaskStatus,
    },
    ApprovalChanged {
        approval_id: ApprovalId,
        task_id: TaskId,
        status: ApprovalStatus,
        current_node: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            trace!("no event subscribers; dropping event");
        }
    }
}
