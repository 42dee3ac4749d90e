//! Effective input resolution for model nodes.
//!
//! For each input slot of a model node:
//! - No incoming edge: the node's own literal field is used.
//! - Scalar slot (`system_prompt`, `user_message`): the source node's output
//!   text. If several edges target the slot, the first one in edge order wins.
//!   Edge validation normally prevents that case.
//! - `images`: every connected source's images, concatenated in edge order.
//!
//! Resolution is a pure function of the nodes and edges passed in.

use crate::edge::{Edge, TargetHandle};
use crate::error::GraphError;
use crate::node::{ImageItem, Node, NodeData};
use nodeloom_core::NodeId;

/// The inputs a model node would run with right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInputs {
    pub system_prompt: String,
    pub user_message: String,
    pub images: Vec<ImageItem>,
}

impl ResolvedInputs {
    /// Returns the base64 payloads of the resolved images, skipping empty ones.
    #[must_use]
    pub fn image_payloads(&self) -> Vec<String> {
        self.images
            .iter()
            .filter(|image| !image.image_base64.is_empty())
            .map(|image| image.image_base64.clone())
            .collect()
    }
}

/// Resolves the effective inputs of a model node.
///
/// # Errors
///
/// Returns [`GraphError::NodeNotFound`] if the node is missing and
/// [`GraphError::NotAModelNode`] if it is not a model node.
pub fn resolve_inputs(
    node_id: &NodeId,
    nodes: &[Node],
    edges: &[Edge],
) -> Result<ResolvedInputs, GraphError> {
    let node = find(nodes, node_id).ok_or_else(|| GraphError::NodeNotFound {
        node_id: node_id.clone(),
    })?;
    let NodeData::Model(data) = &node.data else {
        return Err(GraphError::NotAModelNode {
            node_id: node_id.clone(),
            kind: node.kind(),
        });
    };

    let incoming = |handle: TargetHandle| {
        edges
            .iter()
            .filter(move |e| &e.target == node_id && e.target_handle == handle)
    };
    let scalar = |handle: TargetHandle, literal: &Option<String>| {
        match incoming(handle).next() {
            Some(edge) => find(nodes, &edge.source)
                .map(|source| source.data.output_text().to_string())
                .unwrap_or_default(),
            None => literal.clone().unwrap_or_default(),
        }
    };

    let mut image_edges = incoming(TargetHandle::Images).peekable();
    let images = if image_edges.peek().is_some() {
        image_edges
            .filter_map(|edge| find(nodes, &edge.source))
            .flat_map(|source| source.data.output_images().iter().cloned())
            .collect()
    } else {
        data.images.clone().unwrap_or_default()
    };

    Ok(ResolvedInputs {
        system_prompt: scalar(TargetHandle::SystemPrompt, &data.system_prompt),
        user_message: scalar(TargetHandle::UserMessage, &data.user_message),
        images,
    })
}

fn find<'a>(nodes: &'a [Node], node_id: &NodeId) -> Option<&'a Node> {
    nodes.iter().find(|n| &n.id == node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Connection;
    use crate::node::{ImageData, ModelData, NodeKind, Position, TextData};

    fn text(id: &str, value: &str) -> Node {
        Node::with_data(
            NodeId::new(id),
            Position::default(),
            NodeData::Text(TextData {
                text: value.to_string(),
                ..TextData::default()
            }),
        )
    }

    fn model(id: &str, data: ModelData) -> Node {
        Node::with_data(NodeId::new(id), Position::default(), NodeData::Model(data))
    }

    fn images(id: &str, names: &[&str]) -> Node {
        let images = names
            .iter()
            .map(|name| ImageItem {
                file_name: (*name).to_string(),
                image_base64: format!("b64-{name}"),
                ..ImageItem::default()
            })
            .collect();
        Node::with_data(
            NodeId::new(id),
            Position::default(),
            NodeData::Image(ImageData {
                images,
                ..ImageData::default()
            }),
        )
    }

    fn edge(source: &str, target: &str, handle: TargetHandle) -> Edge {
        Edge::from_connection(Connection::new(
            NodeId::new(source),
            NodeId::new(target),
            handle,
        ))
    }

    #[test]
    fn simple_chain_resolves_connected_text() {
        let nodes = vec![
            text("text-1", "sys"),
            text("text-2", "hello"),
            model("llm-1", ModelData::default()),
        ];
        let edges = vec![
            edge("text-1", "llm-1", TargetHandle::SystemPrompt),
            edge("text-2", "llm-1", TargetHandle::UserMessage),
        ];

        let resolved = resolve_inputs(&NodeId::new("llm-1"), &nodes, &edges).expect("resolve");
        assert_eq!(
            resolved,
            ResolvedInputs {
                system_prompt: "sys".to_string(),
                user_message: "hello".to_string(),
                images: Vec::new(),
            }
        );
    }

    #[test]
    fn unconnected_slots_fall_back_to_literals() {
        let literal_image = ImageItem {
            file_name: "own.png".to_string(),
            ..ImageItem::default()
        };
        let nodes = vec![model(
            "llm-1",
            ModelData {
                system_prompt: Some("be brief".to_string()),
                user_message: Some("describe".to_string()),
                images: Some(vec![literal_image.clone()]),
                ..ModelData::default()
            },
        )];

        let resolved = resolve_inputs(&NodeId::new("llm-1"), &nodes, &[]).expect("resolve");
        assert_eq!(resolved.system_prompt, "be brief");
        assert_eq!(resolved.user_message, "describe");
        assert_eq!(resolved.images, vec![literal_image]);
    }

    #[test]
    fn connection_overrides_literal() {
        let nodes = vec![
            text("text-1", "from edge"),
            model(
                "llm-1",
                ModelData {
                    user_message: Some("literal".to_string()),
                    ..ModelData::default()
                },
            ),
        ];
        let edges = vec![edge("text-1", "llm-1", TargetHandle::UserMessage)];

        let resolved = resolve_inputs(&NodeId::new("llm-1"), &nodes, &edges).expect("resolve");
        assert_eq!(resolved.user_message, "from edge");
    }

    #[test]
    fn model_source_uses_output_or_empty() {
        let nodes = vec![
            model(
                "llm-0",
                ModelData {
                    output: Some("upstream".to_string()),
                    ..ModelData::default()
                },
            ),
            model("llm-never", ModelData::default()),
            model("llm-1", ModelData::default()),
        ];
        let edges = vec![
            edge("llm-0", "llm-1", TargetHandle::SystemPrompt),
            edge("llm-never", "llm-1", TargetHandle::UserMessage),
        ];

        let resolved = resolve_inputs(&NodeId::new("llm-1"), &nodes, &edges).expect("resolve");
        assert_eq!(resolved.system_prompt, "upstream");
        assert_eq!(resolved.user_message, "");
    }

    #[test]
    fn image_source_on_scalar_slot_is_empty() {
        let nodes = vec![
            images("img-1", &["a"]),
            model(
                "llm-1",
                ModelData {
                    user_message: Some("literal".to_string()),
                    ..ModelData::default()
                },
            ),
        ];
        let edges = vec![edge("img-1", "llm-1", TargetHandle::UserMessage)];

        let resolved = resolve_inputs(&NodeId::new("llm-1"), &nodes, &edges).expect("resolve");
        assert_eq!(resolved.user_message, "");
    }

    #[test]
    fn first_edge_wins_on_scalar_slot() {
        let nodes = vec![
            text("text-1", "first"),
            text("text-2", "second"),
            model("llm-1", ModelData::default()),
        ];
        let edges = vec![
            edge("text-2", "llm-1", TargetHandle::SystemPrompt),
            edge("text-1", "llm-1", TargetHandle::SystemPrompt),
        ];

        let resolved = resolve_inputs(&NodeId::new("llm-1"), &nodes, &edges).expect("resolve");
        assert_eq!(resolved.system_prompt, "second");
    }

    #[test]
    fn images_fan_in_in_edge_order() {
        let nodes = vec![
            images("img-1", &["a", "b"]),
            images("img-2", &["c", "d"]),
            model(
                "llm-1",
                ModelData {
                    images: Some(vec![ImageItem::default()]),
                    ..ModelData::default()
                },
            ),
        ];
        let edges = vec![
            edge("img-2", "llm-1", TargetHandle::Images),
            edge("img-1", "llm-1", TargetHandle::Images),
        ];

        let resolved = resolve_inputs(&NodeId::new("llm-1"), &nodes, &edges).expect("resolve");
        let names: Vec<_> = resolved.images.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["c", "d", "a", "b"]);
        assert_eq!(resolved.image_payloads(), vec!["b64-c", "b64-d", "b64-a", "b64-b"]);
    }

    #[test]
    fn resolution_is_repeatable() {
        let nodes = vec![
            text("text-1", "sys"),
            images("img-1", &["a", "b"]),
            model("llm-1", ModelData::default()),
        ];
        let edges = vec![
            edge("text-1", "llm-1", TargetHandle::SystemPrompt),
            edge("img-1", "llm-1", TargetHandle::Images),
        ];
        let id = NodeId::new("llm-1");

        let first = resolve_inputs(&id, &nodes, &edges).expect("resolve");
        let second = resolve_inputs(&id, &nodes, &edges).expect("resolve");
        assert_eq!(first, second);
    }

    #[test]
    fn non_model_and_missing_nodes_are_errors() {
        let nodes = vec![text("text-1", "x")];
        assert_eq!(
            resolve_inputs(&NodeId::new("text-1"), &nodes, &[]),
            Err(GraphError::NotAModelNode {
                node_id: NodeId::new("text-1"),
                kind: NodeKind::Text,
            })
        );
        assert_eq!(
            resolve_inputs(&NodeId::new("ghost"), &nodes, &[]),
            Err(GraphError::NodeNotFound {
                node_id: NodeId::new("ghost")
            })
        );
    }
}
