//! Snapshot-based undo and redo.
//!
//! A checkpoint captures the graph as it was *before* a user mutation. Undo
//! pops that snapshot and pushes the current graph onto the redo stack; redo
//! is the mirror. History is linear: a new checkpoint clears the redo stack.
//!
//! Structural mutations always checkpoint. Payload edits and drags are
//! coalesced: repeated edits of the same node and field within the coalesce
//! window collapse into the first edit's checkpoint. Writes made by finished
//! tasks are never checkpointed.

use crate::edge::Edge;
use crate::node::Node;
use nodeloom_core::NodeId;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// History configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of undo steps kept; the oldest are evicted first.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Window in milliseconds within which edits of the same field coalesce.
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
}

fn default_max_depth() -> usize {
    100
}

fn default_coalesce_window_ms() -> u64 {
    1000
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            coalesce_window_ms: default_coalesce_window_ms(),
        }
    }
}

/// An immutable copy of the graph at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl HistorySnapshot {
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Which part of a node an edit touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditField {
    Data,
    Position,
}

/// Identifies a run of edits that collapse into one undo step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoalesceKey {
    pub node_id: NodeId,
    pub field: EditField,
}

impl CoalesceKey {
    #[must_use]
    pub fn new(node_id: NodeId, field: EditField) -> Self {
        Self { node_id, field }
    }
}

/// Bounded undo and redo stacks.
#[derive(Debug)]
pub struct HistoryManager {
    undo_stack: VecDeque<HistorySnapshot>,
    redo_stack: Vec<HistorySnapshot>,
    config: HistoryConfig,
    last_edit: Option<(CoalesceKey, Instant)>,
}

impl HistoryManager {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            config,
            last_edit: None,
        }
    }

    /// Records the state before a discrete mutation.
    pub fn checkpoint(&mut self, snapshot: HistorySnapshot) {
        self.last_edit = None;
        self.push(snapshot);
    }

    /// Records the state before an edit unless it continues the previous edit.
    ///
    /// `capture` is only called when a checkpoint is actually taken. Returns
    /// true if a checkpoint was taken.
    pub fn checkpoint_coalesced(
        &mut self,
        key: CoalesceKey,
        now: Instant,
        capture: impl FnOnce() -> HistorySnapshot,
    ) -> bool {
        let window = Duration::from_millis(self.config.coalesce_window_ms);
        let continues = self.last_edit.as_ref().is_some_and(|(last_key, at)| {
            *last_key == key && now.saturating_duration_since(*at) <= window
        });
        self.last_edit = Some((key, now));

        if continues {
            return false;
        }
        self.push(capture());
        true
    }

    fn push(&mut self, snapshot: HistorySnapshot) {
        self.undo_stack.push_back(snapshot);
        self.redo_stack.clear();
        let max_depth = self.config.max_depth.max(1);
        while self.undo_stack.len() > max_depth {
            self.undo_stack.pop_front();
        }
    }

    /// Steps back one checkpoint.
    ///
    /// Returns the snapshot to restore, or `None` if there is nothing to undo.
    pub fn undo(&mut self, current: HistorySnapshot) -> Option<HistorySnapshot> {
        let previous = self.undo_stack.pop_back()?;
        self.redo_stack.push(current);
        self.last_edit = None;
        Some(previous)
    }

    /// Steps forward one undone checkpoint.
    ///
    /// Returns the snapshot to restore, or `None` if there is nothing to redo.
    pub fn redo(&mut self, current: HistorySnapshot) -> Option<HistorySnapshot> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push_back(current);
        self.last_edit = None;
        Some(next)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Drops all history, making the current state the baseline.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.last_edit = None;
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, Position};

    fn snapshot_with(count: usize) -> HistorySnapshot {
        let nodes = (0..count)
            .map(|_| Node::new(NodeKind::Text, Position::default()))
            .collect();
        HistorySnapshot::new(nodes, Vec::new())
    }

    #[test]
    fn undo_and_redo_swap_snapshots() {
        let mut history = HistoryManager::default();
        let s0 = snapshot_with(0);
        let s1 = snapshot_with(1);

        history.checkpoint(s0.clone());
        let restored = history.undo(s1.clone()).expect("undo");
        assert_eq!(restored, s0);
        assert!(history.can_redo());

        let restored = history.redo(s0).expect("redo");
        assert_eq!(restored, s1);
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn empty_stacks_are_no_ops() {
        let mut history = HistoryManager::default();
        assert!(history.undo(snapshot_with(0)).is_none());
        assert!(history.redo(snapshot_with(0)).is_none());
        assert_eq!(history.undo_depth(), 0);
        assert_eq!(history.redo_depth(), 0);
    }

    #[test]
    fn new_checkpoint_clears_redo() {
        let mut history = HistoryManager::default();
        history.checkpoint(snapshot_with(0));
        history.undo(snapshot_with(1)).expect("undo");
        assert!(history.can_redo());

        history.checkpoint(snapshot_with(0));
        assert!(!history.can_redo());
    }

    #[test]
    fn oldest_checkpoints_are_evicted() {
        let mut history = HistoryManager::new(HistoryConfig {
            max_depth: 3,
            ..HistoryConfig::default()
        });
        for count in 0..5 {
            history.checkpoint(snapshot_with(count));
        }
        assert_eq!(history.undo_depth(), 3);

        let mut current = snapshot_with(5);
        let mut seen = Vec::new();
        while let Some(previous) = history.undo(current.clone()) {
            seen.push(previous.nodes().len());
            current = previous;
        }
        assert_eq!(seen, vec![4, 3, 2]);
    }

    #[test]
    fn edits_of_same_field_coalesce_within_window() {
        let mut history = HistoryManager::default();
        let node = NodeId::new("text-1");
        let start = Instant::now();
        let key = || CoalesceKey::new(node.clone(), EditField::Data);

        assert!(history.checkpoint_coalesced(key(), start, || snapshot_with(0)));
        assert!(!history.checkpoint_coalesced(
            key(),
            start + Duration::from_millis(400),
            || panic!("should not capture")
        ));
        assert!(!history.checkpoint_coalesced(
            key(),
            start + Duration::from_millis(800),
            || panic!("should not capture")
        ));
        assert_eq!(history.undo_depth(), 1);

        assert!(history.checkpoint_coalesced(
            key(),
            start + Duration::from_millis(2500),
            || snapshot_with(1)
        ));
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn different_field_or_structural_change_breaks_coalescing() {
        let mut history = HistoryManager::default();
        let node = NodeId::new("text-1");
        let now = Instant::now();

        history.checkpoint_coalesced(
            CoalesceKey::new(node.clone(), EditField::Data),
            now,
            || snapshot_with(0),
        );
        assert!(history.checkpoint_coalesced(
            CoalesceKey::new(node.clone(), EditField::Position),
            now,
            || snapshot_with(0)
        ));

        history.checkpoint(snapshot_with(1));
        assert!(history.checkpoint_coalesced(
            CoalesceKey::new(node, EditField::Position),
            now,
            || snapshot_with(2)
        ));
        assert_eq!(history.undo_depth(), 4);
    }

    #[test]
    fn clear_resets_baseline() {
        let mut history = HistoryManager::default();
        history.checkpoint(snapshot_with(0));
        history.clear();
        assert!(!history.can_undo());
    }
}
