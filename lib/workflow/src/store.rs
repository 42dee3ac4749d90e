//! Canonical graph state.
//!
//! [`GraphStore`] owns the ordered node and edge lists for one editing
//! session. Order matters: the input resolver breaks ties by edge order and
//! image fan-in is concatenated in edge order.
//!
//! Every mutation either applies completely or returns a [`GraphError`] and
//! leaves the store untouched. Successful mutations bump [`GraphStore::revision`]
//! (which drives dirty tracking) and publish an [`EditorEvent`]. The store does
//! not record undo history itself; the editor decides which mutations are
//! checkpointed, and undo/redo restore through [`GraphStore::restore`].

use crate::edge::{Connection, Edge, OUTPUT_HANDLE, TargetHandle};
use crate::error::GraphError;
use crate::event::{EditorEvent, EventBus};
use crate::history::HistorySnapshot;
use crate::node::{Node, NodeKind, NodePatch, Position};
use nodeloom_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Currently selected nodes and edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
}

/// Canvas viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// A node removed from the graph together with the edges that went with it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub node: Node,
    pub edges: Vec<Edge>,
}

/// An edge that was discarded while loading a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEdge {
    pub edge_id: EdgeId,
    pub reason: GraphError,
}

/// Outcome of loading a persisted graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Edges that broke a graph invariant, in document order.
    pub dropped_edges: Vec<DroppedEdge>,
}

impl LoadReport {
    /// Returns true if the document loaded without repairs.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dropped_edges.is_empty()
    }
}

/// The single mutable source of truth for nodes and edges.
#[derive(Debug)]
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    selection: Selection,
    viewport: Viewport,
    revision: u64,
    events: EventBus,
}

impl GraphStore {
    /// Creates an empty store publishing to `events`.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            selection: Selection::default(),
            viewport: Viewport::default(),
            revision: 0,
            events,
        }
    }

    /// Monotonic counter bumped by every graph mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns all nodes in order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns all edges in order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == node_id)
    }

    /// Returns an edge by id.
    #[must_use]
    pub fn edge(&self, edge_id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.id == edge_id)
    }

    /// Returns the edges feeding `handle` on `target`, in edge order.
    pub fn incoming<'a>(
        &'a self,
        target: &'a NodeId,
        handle: TargetHandle,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |e| &e.target == target && e.target_handle == handle)
    }

    /// Returns the edges leaving `source_handle` on `source`, in edge order.
    pub fn outgoing<'a>(
        &'a self,
        source: &'a NodeId,
        source_handle: &'a str,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |e| &e.source == source && e.effective_source_handle() == source_handle)
    }

    fn node_mut(&mut self, node_id: &NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .iter_mut()
            .find(|n| &n.id == node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })
    }

    fn touch(&mut self, event: EditorEvent) {
        self.revision += 1;
        self.events.emit(event);
    }

    /// Adds a node of `kind` with the default payload, merged with `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::PayloadKindMismatch`] if `initial` is for another kind.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        position: Position,
        initial: Option<&NodePatch>,
    ) -> Result<NodeId, GraphError> {
        let mut node = Node::new(kind, position);
        if let Some(patch) = initial {
            node.data.apply(patch)?;
        }
        let node_id = node.id.clone();
        self.insert_node(node)?;
        Ok(node_id)
    }

    /// Inserts a fully formed node, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateNode`] if the id is taken.
    pub fn insert_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode { node_id: node.id });
        }
        let node_id = node.id.clone();
        self.nodes.push(node);
        self.touch(EditorEvent::NodeAdded { node_id });
        Ok(())
    }

    /// Removes a node and every edge that starts or ends at it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] if the node does not exist.
    pub fn remove_node(&mut self, node_id: &NodeId) -> Result<RemovedNode, GraphError> {
        let index = self
            .nodes
            .iter()
            .position(|n| &n.id == node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })?;

        let node = self.nodes.remove(index);
        let (edges, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|e| e.touches(node_id));
        self.edges = kept;
        self.prune_selection();

        self.touch(EditorEvent::NodeRemoved {
            node_id: node_id.clone(),
            removed_edges: edges.iter().map(|e| e.id.clone()).collect(),
        });
        Ok(RemovedNode { node, edges })
    }

    /// Merges a partial payload into a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] or [`GraphError::PayloadKindMismatch`].
    pub fn update_node_data(
        &mut self,
        node_id: &NodeId,
        patch: &NodePatch,
    ) -> Result<(), GraphError> {
        self.node_mut(node_id)?.data.apply(patch)?;
        self.touch(EditorEvent::NodeUpdated {
            node_id: node_id.clone(),
        });
        Ok(())
    }

    /// Moves a node on the canvas.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] if the node does not exist.
    pub fn move_node(&mut self, node_id: &NodeId, position: Position) -> Result<(), GraphError> {
        self.node_mut(node_id)?.position = position;
        self.touch(EditorEvent::NodeMoved {
            node_id: node_id.clone(),
        });
        Ok(())
    }

    /// Connects two nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either endpoint doesn't exist
    /// - The edge would be a self-loop
    /// - Either handle doesn't exist on its node
    /// - The target slot is scalar and already connected
    /// - The same connection already exists
    pub fn add_edge(&mut self, connection: Connection) -> Result<EdgeId, GraphError> {
        let edge = Edge::from_connection(connection);
        let edge_id = edge.id.clone();
        self.insert_edge(edge)?;
        Ok(edge_id)
    }

    /// Inserts a fully formed edge, keeping its id. Validated like [`Self::add_edge`].
    ///
    /// # Errors
    ///
    /// See [`Self::add_edge`]; additionally rejects a duplicate edge id.
    pub fn insert_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        check_edge(&self.nodes, &self.edges, &edge)?;
        let edge_id = edge.id.clone();
        self.edges.push(edge);
        self.touch(EditorEvent::EdgeAdded { edge_id });
        Ok(())
    }

    /// Removes an edge.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EdgeNotFound`] if the edge does not exist.
    pub fn remove_edge(&mut self, edge_id: &EdgeId) -> Result<Edge, GraphError> {
        let index = self
            .edges
            .iter()
            .position(|e| &e.id == edge_id)
            .ok_or_else(|| GraphError::EdgeNotFound {
                edge_id: edge_id.clone(),
            })?;
        let edge = self.edges.remove(index);
        self.prune_selection();
        self.touch(EditorEvent::EdgeRemoved {
            edge_id: edge_id.clone(),
        });
        Ok(edge)
    }

    /// Captures the current nodes and edges.
    #[must_use]
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot::new(self.nodes.clone(), self.edges.clone())
    }

    /// Replaces the graph with a snapshot without validation.
    ///
    /// Snapshots are only ever taken from this store, so they already hold.
    pub fn restore(&mut self, snapshot: &HistorySnapshot) {
        self.nodes = snapshot.nodes().to_vec();
        self.edges = snapshot.edges().to_vec();
        self.prune_selection();
        self.touch(EditorEvent::GraphRestored);
    }

    /// Replaces the graph with nodes and edges from a persisted document.
    ///
    /// Edges that violate a graph invariant are dropped in document order and
    /// reported; the first edge into a scalar slot is the one kept. Transient
    /// run state is cleared since no task survives a load.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidDocument`] if two nodes share an id. The
    /// store is unchanged in that case.
    pub fn load(&mut self, mut nodes: Vec<Node>, edges: Vec<Edge>) -> Result<LoadReport, GraphError> {
        let mut seen = HashSet::with_capacity(nodes.len());
        for node in &mut nodes {
            if !seen.insert(node.id.clone()) {
                return Err(GraphError::InvalidDocument {
                    reason: format!("duplicate node id {}", node.id),
                });
            }
            node.data.reset_transient();
        }

        let mut report = LoadReport::default();
        let mut kept = Vec::with_capacity(edges.len());
        for edge in edges {
            match check_edge(&nodes, &kept, &edge) {
                Ok(()) => kept.push(edge),
                Err(reason) => {
                    warn!(edge_id = %edge.id, error = %reason, "dropping invalid edge from document");
                    report.dropped_edges.push(DroppedEdge {
                        edge_id: edge.id,
                        reason,
                    });
                }
            }
        }

        self.nodes = nodes;
        self.edges = kept;
        self.selection = Selection::default();
        self.touch(EditorEvent::GraphRestored);
        Ok(report)
    }

    /// Returns the current selection.
    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Replaces the selection, ignoring ids that are not in the graph.
    ///
    /// Selection is view state and does not count as a graph mutation.
    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        self.prune_selection();
    }

    /// Returns the viewport.
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Sets the viewport. Like selection, this is view state only.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn prune_selection(&mut self) {
        let Self {
            nodes,
            edges,
            selection,
            ..
        } = self;
        selection.nodes.retain(|id| nodes.iter().any(|n| &n.id == id));
        selection.edges.retain(|id| edges.iter().any(|e| &e.id == id));
    }
}

/// Validates `edge` against the nodes and the edges already accepted.
fn check_edge(nodes: &[Node], edges: &[Edge], edge: &Edge) -> Result<(), GraphError> {
    let find = |id: &NodeId| {
        nodes
            .iter()
            .find(|n| &n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: id.clone(),
            })
    };
    find(&edge.source)?;
    let target = find(&edge.target)?;

    if edge.source == edge.target {
        return Err(GraphError::SelfLoop {
            node_id: edge.source.clone(),
        });
    }
    if edge.effective_source_handle() != OUTPUT_HANDLE {
        return Err(GraphError::InvalidSourceHandle {
            node_id: edge.source.clone(),
            handle: edge.effective_source_handle().to_string(),
        });
    }
    if !edge.target_handle.accepted_by(target.kind()) {
        return Err(GraphError::InvalidTargetHandle {
            node_id: edge.target.clone(),
            kind: target.kind(),
            handle: edge.target_handle.to_string(),
        });
    }
    if let Some(existing) = edges.iter().find(|e| e.id == edge.id) {
        return Err(GraphError::DuplicateEdge {
            existing: existing.id.clone(),
        });
    }
    if edge.target_handle.is_scalar()
        && let Some(existing) = edges
            .iter()
            .find(|e| e.target == edge.target && e.target_handle == edge.target_handle)
    {
        return Err(GraphError::InputOccupied {
            node_id: edge.target.clone(),
            handle: edge.target_handle,
            existing: existing.id.clone(),
        });
    }
    if let Some(existing) = edges.iter().find(|e| e.same_connection(edge)) {
        return Err(GraphError::DuplicateEdge {
            existing: existing.id.clone(),
        });
    }
    Ok(())
}
