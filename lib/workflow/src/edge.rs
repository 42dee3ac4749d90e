//! Edge types for workflow graphs.
//!
//! Edges connect a node's output slot to a named input slot on another node.
//! Every node has one output slot, `"output"`. Input slots are
//! [`TargetHandle`]s and depend on the target node's kind.

use crate::node::NodeKind;
use nodeloom_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// Name of the single output slot every node exposes.
pub const OUTPUT_HANDLE: &str = "output";

/// A named input slot on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetHandle {
    /// Model node system prompt.
    SystemPrompt,
    /// Model node user message.
    UserMessage,
    /// Model node images. Accepts any number of edges.
    Images,
    /// Model node output field; receives a value without running the node.
    Output,
    /// Text node content.
    Text,
}

impl TargetHandle {
    /// Returns the persisted handle name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SystemPrompt => "system_prompt",
            Self::UserMessage => "user_message",
            Self::Images => "images",
            Self::Output => "output",
            Self::Text => "text",
        }
    }

    /// Returns true if the slot holds one value and accepts at most one edge.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Self::Images)
    }

    /// Returns true if nodes of `kind` have this input slot.
    #[must_use]
    pub const fn accepted_by(&self, kind: NodeKind) -> bool {
        match kind {
            NodeKind::Model => matches!(
                self,
                Self::SystemPrompt | Self::UserMessage | Self::Images | Self::Output
            ),
            NodeKind::Text => matches!(self, Self::Text),
            NodeKind::Image => false,
        }
    }
}

impl fmt::Display for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetHandle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system_prompt" => Ok(Self::SystemPrompt),
            "user_message" => Ok(Self::UserMessage),
            "images" => Ok(Self::Images),
            "output" => Ok(Self::Output),
            "text" => Ok(Self::Text),
            other => Err(other.to_string()),
        }
    }
}

/// A request to connect two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeId,
    /// Source slot; `None` means the default output.
    pub source_handle: Option<String>,
    pub target: NodeId,
    pub target_handle: TargetHandle,
    /// Visual style hint for the renderer.
    pub edge_type: Option<String>,
}

impl Connection {
    /// Creates a connection from `source`'s output to `target`'s `handle`.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, target_handle: TargetHandle) -> Self {
        Self {
            source,
            source_handle: None,
            target,
            target_handle,
            edge_type: None,
        }
    }

    /// Sets an explicit source handle.
    #[must_use]
    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// Sets the visual style.
    #[must_use]
    pub fn with_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }
}

/// An edge in a workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    /// Source slot as persisted; `None` means the default output.
    pub source_handle: Option<String>,
    pub target: NodeId,
    pub target_handle: TargetHandle,
    /// Visual style hint for the renderer.
    pub edge_type: Option<String>,
    /// Rendering fields from the persisted record carried through untouched.
    pub extra: Map<String, JsonValue>,
}

impl Edge {
    /// Creates an edge with a fresh id from a connection request.
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self {
            id: EdgeId::generate(),
            source: connection.source,
            source_handle: connection.source_handle,
            target: connection.target,
            target_handle: connection.target_handle,
            edge_type: connection.edge_type,
            extra: Map::new(),
        }
    }

    /// Returns the source slot, applying the default.
    #[must_use]
    pub fn effective_source_handle(&self) -> &str {
        self.source_handle.as_deref().unwrap_or(OUTPUT_HANDLE)
    }

    /// Returns true if the edge starts or ends at `node_id`.
    #[must_use]
    pub fn touches(&self, node_id: &NodeId) -> bool {
        &self.source == node_id || &self.target == node_id
    }

    /// Returns true if both edges connect the same slots.
    #[must_use]
    pub fn same_connection(&self, other: &Self) -> bool {
        self.source == other.source
            && self.effective_source_handle() == other.effective_source_handle()
            && self.target == other.target
            && self.target_handle == other.target_handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_handles() {
        assert!(TargetHandle::SystemPrompt.is_scalar());
        assert!(TargetHandle::UserMessage.is_scalar());
        assert!(!TargetHandle::Images.is_scalar());
    }

    #[test]
    fn handles_per_kind() {
        assert!(TargetHandle::Images.accepted_by(NodeKind::Model));
        assert!(!TargetHandle::Text.accepted_by(NodeKind::Model));
        assert!(TargetHandle::Text.accepted_by(NodeKind::Text));
        assert!(!TargetHandle::Images.accepted_by(NodeKind::Image));
    }

    #[test]
    fn handle_names_round_trip() {
        for handle in [
            TargetHandle::SystemPrompt,
            TargetHandle::UserMessage,
            TargetHandle::Images,
            TargetHandle::Output,
            TargetHandle::Text,
        ] {
            assert_eq!(handle.as_str().parse::<TargetHandle>(), Ok(handle));
        }
        assert_eq!("prompt".parse::<TargetHandle>(), Err("prompt".to_string()));
    }

    #[test]
    fn default_source_handle_is_output() {
        let edge = Edge::from_connection(Connection::new(
            NodeId::new("a"),
            NodeId::new("b"),
            TargetHandle::UserMessage,
        ));
        assert_eq!(edge.effective_source_handle(), OUTPUT_HANDLE);
        assert!(edge.id.as_str().starts_with("edge-"));
    }

    #[test]
    fn same_connection_ignores_ids_and_explicit_default() {
        let a = Edge::from_connection(Connection::new(
            NodeId::new("a"),
            NodeId::new("b"),
            TargetHandle::Images,
        ));
        let b = Edge::from_connection(
            Connection::new(NodeId::new("a"), NodeId::new("b"), TargetHandle::Images)
                .with_source_handle("output"),
        );
        assert!(a.same_connection(&b));
        assert!(a.touches(&NodeId::new("b")));
        assert!(!a.touches(&NodeId::new("c")));
    }
}
