//! Change notifications for the rendering layer.
//!
//! The editor publishes an [`EditorEvent`] after every state change. Events
//! are broadcast; a slow subscriber that falls behind sees a `Lagged` error
//! from its receiver and should re-read the state it cares about.

use crate::task::TaskStatus;
use nodeloom_core::{EdgeId, NodeId, TaskId, WorkflowId};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// A change to editor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    NodeAdded { node_id: NodeId },
    NodeRemoved {
        node_id: NodeId,
        removed_edges: Vec<EdgeId>,
    },
    NodeUpdated { node_id: NodeId },
    NodeMoved { node_id: NodeId },
    EdgeAdded { edge_id: EdgeId },
    EdgeRemoved { edge_id: EdgeId },
    /// The whole graph was replaced (undo, redo or load).
    GraphRestored,
    TaskStarted { task_id: TaskId, node_id: NodeId },
    TaskFinished {
        task_id: TaskId,
        node_id: NodeId,
        status: TaskStatus,
    },
    Saved { workflow_id: WorkflowId },
    SaveFailed { message: String },
}

/// Broadcast sender shared by the store and the editor.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EditorEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: EditorEvent) {
        let _ = self.sender.send(event);
    }

    /// Returns a receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
