//! Persisted workflow layout.
//!
//! This is the wire and storage format exchanged with the remote store:
//! - node: `{id, type, position: {x, y}, data}`
//! - edge: `{id, source, target, sourceHandle?, targetHandle?, type?}`
//!
//! Fields the engine does not model (renderer sizing, selection flags and so
//! on) are kept in `extra` and written back unchanged.

use crate::edge::{Edge, TargetHandle};
use crate::error::GraphError;
use crate::node::{Node, NodeData, NodeKind, Position};
use crate::store::DroppedEdge;
use chrono::{DateTime, Utc};
use nodeloom_core::{EdgeId, FolderId, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A persisted node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "empty_object")]
    pub data: JsonValue,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Map::new())
}

/// A persisted edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// A workflow as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    pub id: WorkflowId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub folder_id: Option<FolderId>,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields sent when creating a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkflow {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FolderId>,
}

/// A partial update of a workflow. Absent fields are left unchanged remotely.
///
/// `folder_id` and `thumbnail` are nullable remotely: `Some(None)` is sent as
/// JSON `null` and clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<Option<FolderId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<EdgeRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Option<String>>,
}

impl NodeRecord {
    /// Encodes a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidDocument`] if the payload cannot be encoded.
    pub fn from_node(node: &Node) -> Result<Self, GraphError> {
        let data = node.data.to_json().map_err(|e| GraphError::InvalidDocument {
            reason: format!("node {}: {e}", node.id),
        })?;
        Ok(Self {
            id: node.id.clone(),
            node_type: node.kind().as_str().to_string(),
            position: node.position,
            data,
            extra: node.extra.clone(),
        })
    }
}

impl TryFrom<NodeRecord> for Node {
    type Error = GraphError;

    fn try_from(record: NodeRecord) -> Result<Self, Self::Error> {
        let kind: NodeKind = record
            .node_type
            .parse()
            .map_err(|_| GraphError::InvalidDocument {
                reason: format!("node {}: unknown type '{}'", record.id, record.node_type),
            })?;
        let value = if record.data.is_null() {
            empty_object()
        } else {
            record.data
        };
        let data = NodeData::from_json(kind, value).map_err(|e| GraphError::InvalidDocument {
            reason: format!("node {}: {e}", record.id),
        })?;

        let mut node = Node::with_data(record.id, record.position, data);
        node.extra = record.extra;
        Ok(node)
    }
}

impl From<&Edge> for EdgeRecord {
    fn from(edge: &Edge) -> Self {
        Self {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_handle: edge.source_handle.clone(),
            target_handle: Some(edge.target_handle.as_str().to_string()),
            edge_type: edge.edge_type.clone(),
            extra: edge.extra.clone(),
        }
    }
}

impl TryFrom<EdgeRecord> for Edge {
    type Error = GraphError;

    fn try_from(record: EdgeRecord) -> Result<Self, Self::Error> {
        let handle = record.target_handle.as_deref().unwrap_or_default();
        let target_handle: TargetHandle =
            handle.parse().map_err(|handle| GraphError::InvalidDocument {
                reason: format!("edge {}: unknown target handle '{handle}'", record.id),
            })?;

        Ok(Self {
            id: record.id,
            source: record.source,
            source_handle: record.source_handle,
            target: record.target,
            target_handle,
            edge_type: record.edge_type,
            extra: record.extra,
        })
    }
}

/// Graph decoded from persisted records.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Edge records that could not be decoded at all.
    pub dropped_edges: Vec<DroppedEdge>,
}

/// Decodes node and edge records.
///
/// Undecodable edges are dropped and reported; graph-level validation of the
/// remaining edges happens when they are loaded into a store.
///
/// # Errors
///
/// Returns [`GraphError::InvalidDocument`] for any undecodable node.
pub fn decode_graph(
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
) -> Result<DecodedGraph, GraphError> {
    let nodes = nodes
        .into_iter()
        .map(Node::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let mut decoded = Vec::with_capacity(edges.len());
    let mut dropped_edges = Vec::new();
    for record in edges {
        let edge_id = record.id.clone();
        match Edge::try_from(record) {
            Ok(edge) => decoded.push(edge),
            Err(reason) => dropped_edges.push(DroppedEdge { edge_id, reason }),
        }
    }

    Ok(DecodedGraph {
        nodes,
        edges: decoded,
        dropped_edges,
    })
}

/// Encodes nodes and edges as persisted records.
///
/// # Errors
///
/// Returns [`GraphError::InvalidDocument`] if a payload cannot be encoded.
pub fn encode_graph(
    nodes: &[Node],
    edges: &[Edge],
) -> Result<(Vec<NodeRecord>, Vec<EdgeRecord>), GraphError> {
    let nodes = nodes
        .iter()
        .map(NodeRecord::from_node)
        .collect::<Result<Vec<_>, _>>()?;
    let edges = edges.iter().map(EdgeRecord::from).collect();
    Ok((nodes, edges))
}
