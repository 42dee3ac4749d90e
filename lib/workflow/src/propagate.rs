//! One-shot output propagation.
//!
//! When a run finishes, its output is written into the literal input field of
//! every directly connected downstream node. Downstream nodes are not run;
//! running stays an explicit request.

use crate::edge::TargetHandle;
use crate::node::{ModelPatch, NodeData, NodePatch, TextPatch};
use crate::store::GraphStore;
use nodeloom_core::NodeId;
use tracing::debug;

/// Writes `value` into every input fed by `source_handle` on `source`.
///
/// Writes go through the store's update path without a history checkpoint.
/// Slots that cannot hold text (such as `images`) are skipped. Returns the ids
/// of the nodes that were updated, in edge order.
pub fn propagate(
    store: &mut GraphStore,
    source: &NodeId,
    source_handle: &str,
    value: &str,
) -> Vec<NodeId> {
    let targets: Vec<(NodeId, TargetHandle)> = store
        .outgoing(source, source_handle)
        .map(|edge| (edge.target.clone(), edge.target_handle))
        .collect();

    let mut updated = Vec::with_capacity(targets.len());
    for (target, handle) in targets {
        let Some(patch) = store
            .node(&target)
            .and_then(|node| input_patch(&node.data, handle, value))
        else {
            debug!(source = %source, target = %target, handle = %handle, "slot cannot take propagated text");
            continue;
        };
        match store.update_node_data(&target, &patch) {
            Ok(()) => updated.push(target),
            Err(error) => {
                debug!(target = %target, error = %error, "skipping propagation target");
            }
        }
    }
    updated
}

/// Builds the patch that writes `value` into the literal field behind
/// `handle`, or `None` if the slot cannot hold text for this kind.
fn input_patch(data: &NodeData, handle: TargetHandle, value: &str) -> Option<NodePatch> {
    let value = Some(value.to_string());
    let patch = match (data, handle) {
        (NodeData::Model(_), TargetHandle::SystemPrompt) => ModelPatch {
            system_prompt: Some(value),
            ..ModelPatch::default()
        }
        .into(),
        (NodeData::Model(_), TargetHandle::UserMessage) => ModelPatch {
            user_message: Some(value),
            ..ModelPatch::default()
        }
        .into(),
        (NodeData::Model(_), TargetHandle::Output) => ModelPatch {
            output: Some(value),
            ..ModelPatch::default()
        }
        .into(),
        (NodeData::Text(_), TargetHandle::Text) => TextPatch {
            text: value,
            ..TextPatch::default()
        }
        .into(),
        (NodeData::Model(_), TargetHandle::Images | TargetHandle::Text)
        | (NodeData::Text(_), _)
        | (NodeData::Image(_), _) => return None,
    };
    Some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{Connection, OUTPUT_HANDLE};
    use crate::event::EventBus;
    use crate::node::{NodeKind, Position};

    fn setup() -> (GraphStore, NodeId) {
        let mut store = GraphStore::new(EventBus::new());
        let source = store
            .add_node(NodeKind::Model, Position::default(), None)
            .expect("source");
        (store, source)
    }

    #[test]
    fn writes_into_target_literal_field_only() {
        let (mut store, a) = setup();
        let b = store
            .add_node(NodeKind::Model, Position::default(), None)
            .expect("b");
        let bystander = store
            .add_node(NodeKind::Text, Position::default(), None)
            .expect("bystander");
        store
            .add_edge(Connection::new(a.clone(), b.clone(), TargetHandle::SystemPrompt))
            .expect("edge");

        let before_a = store.node(&a).cloned();
        let before_bystander = store.node(&bystander).cloned();

        let updated = propagate(&mut store, &a, OUTPUT_HANDLE, "X");
        assert_eq!(updated, vec![b.clone()]);

        let b_data = store.node(&b).and_then(|n| n.model_data()).expect("model");
        assert_eq!(b_data.system_prompt.as_deref(), Some("X"));
        assert!(b_data.output.is_none());
        assert_eq!(store.node(&a).cloned(), before_a);
        assert_eq!(store.node(&bystander).cloned(), before_bystander);
    }

    #[test]
    fn fans_out_to_every_matching_edge() {
        let (mut store, a) = setup();
        let b = store
            .add_node(NodeKind::Model, Position::default(), None)
            .expect("b");
        let shown = store
            .add_node(NodeKind::Text, Position::default(), None)
            .expect("text");
        store
            .add_edge(Connection::new(a.clone(), b.clone(), TargetHandle::UserMessage))
            .expect("a -> b");
        store
            .add_edge(Connection::new(a.clone(), shown.clone(), TargetHandle::Text))
            .expect("a -> text");

        let updated = propagate(&mut store, &a, OUTPUT_HANDLE, "result");
        assert_eq!(updated, vec![b.clone(), shown.clone()]);
        assert_eq!(
            store.node(&shown).map(|n| n.data.output_text()),
            Some("result")
        );
    }

    #[test]
    fn image_slots_and_other_handles_are_skipped() {
        let (mut store, a) = setup();
        let b = store
            .add_node(NodeKind::Model, Position::default(), None)
            .expect("b");
        store
            .add_edge(Connection::new(a.clone(), b.clone(), TargetHandle::Images))
            .expect("edge");
        let revision = store.revision();

        assert!(propagate(&mut store, &a, OUTPUT_HANDLE, "X").is_empty());
        assert!(propagate(&mut store, &a, "other", "X").is_empty());
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn downstream_model_is_not_run() {
        let (mut store, a) = setup();
        let b = store
            .add_node(NodeKind::Model, Position::default(), None)
            .expect("b");
        store
            .add_edge(Connection::new(a.clone(), b.clone(), TargetHandle::UserMessage))
            .expect("edge");

        propagate(&mut store, &a, OUTPUT_HANDLE, "X");
        let b_data = store.node(&b).and_then(|n| n.model_data()).expect("model");
        assert!(!b_data.is_loading);
        assert!(b_data.output.is_none());
    }
}
