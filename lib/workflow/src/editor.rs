//! The editing session.
//!
//! [`Editor`] owns the graph store, undo history, task engine and persistence
//! coordinator for one open workflow, and is the only way the rendering layer
//! mutates them. All methods run on the caller's logical thread. The only
//! suspension points are waiting for a model completion and waiting for the
//! remote store.
//!
//! Run results are not applied by the tasks themselves. They queue up as
//! completions and are applied when the owner calls
//! [`Editor::next_completion`] or [`Editor::drain_completions`].

use crate::config::EditorConfig;
use crate::document::{WorkflowDocument, decode_graph};
use crate::edge::{Connection, Edge, OUTPUT_HANDLE};
use crate::error::{GraphError, LoadError, RunError, SaveError};
use crate::event::{EditorEvent, EventBus};
use crate::history::{CoalesceKey, EditField, HistoryManager, HistorySnapshot};
use crate::node::{ModelPatch, Node, NodeData, NodeKind, NodePatch, Position};
use crate::persistence::{PersistenceCoordinator, SaveState, WorkflowMetadata};
use crate::propagate::propagate;
use crate::remote::WorkflowStore;
use crate::resolve::{ResolvedInputs, resolve_inputs};
use crate::store::{GraphStore, LoadReport, RemovedNode, Selection, Viewport};
use crate::task::{Task, TaskCompletion, TaskEngine};
use nodeloom_ai::{InvocationRequest, ModelBackend};
use nodeloom_core::{EdgeId, FolderId, NodeId, TaskId, WorkflowId};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Error recorded when a run has nothing to send.
pub const USER_MESSAGE_REQUIRED: &str = "user message required";

/// How a mutation is recorded in history.
enum Checkpoint {
    Always,
    Coalesce(CoalesceKey),
}

/// One open workflow.
#[derive(Debug)]
pub struct Editor {
    store: GraphStore,
    history: HistoryManager,
    tasks: TaskEngine,
    persistence: PersistenceCoordinator,
    events: EventBus,
}

impl Editor {
    /// Creates an editor with an empty, never-saved workflow.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        workflows: Arc<dyn WorkflowStore>,
        config: EditorConfig,
    ) -> Self {
        let events = EventBus::new();
        Self {
            store: GraphStore::new(events.clone()),
            history: HistoryManager::new(config.history),
            tasks: TaskEngine::new(backend, config.max_concurrent_runs),
            persistence: PersistenceCoordinator::new(workflows, config.autosave),
            events,
        }
    }

    /// Returns a receiver for subsequent editor events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    // Queries

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        self.store.nodes()
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        self.store.edges()
    }

    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.store.node(node_id)
    }

    #[must_use]
    pub fn edge(&self, edge_id: &EdgeId) -> Option<&Edge> {
        self.store.edge(edge_id)
    }

    /// Every task ever started in this session, oldest first.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        self.tasks.tasks()
    }

    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.task(task_id)
    }

    #[must_use]
    pub fn running_task(&self, node_id: &NodeId) -> Option<TaskId> {
        self.tasks.running_task(node_id)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.persistence.is_dirty(self.store.revision())
    }

    #[must_use]
    pub fn save_state(&self) -> SaveState {
        self.persistence.save_state(self.store.revision())
    }

    #[must_use]
    pub fn last_save_error(&self) -> Option<&SaveError> {
        self.persistence.last_error()
    }

    #[must_use]
    pub fn metadata(&self) -> &WorkflowMetadata {
        self.persistence.metadata()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    #[must_use]
    pub fn selection(&self) -> &Selection {
        self.store.selection()
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.store.viewport()
    }

    /// Resolves the inputs a model node would run with right now.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] or [`GraphError::NotAModelNode`].
    pub fn resolve_inputs(&self, node_id: &NodeId) -> Result<ResolvedInputs, GraphError> {
        resolve_inputs(node_id, self.store.nodes(), self.store.edges())
    }

    // User mutations

    fn record<T>(
        &mut self,
        checkpoint: Checkpoint,
        mutate: impl FnOnce(&mut GraphStore) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let before = self.store.snapshot();
        let result = mutate(&mut self.store)?;
        let now = Instant::now();
        match checkpoint {
            Checkpoint::Always => self.history.checkpoint(before),
            Checkpoint::Coalesce(key) => {
                self.history.checkpoint_coalesced(key, now, move || before);
            }
        }
        self.persistence.note_change(now);
        Ok(result)
    }

    /// Adds a node with the default payload for `kind`, merged with `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::PayloadKindMismatch`] if `initial` is for another kind.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        position: Position,
        initial: Option<NodePatch>,
    ) -> Result<NodeId, GraphError> {
        self.record(Checkpoint::Always, |store| {
            store.add_node(kind, position, initial.as_ref())
        })
    }

    /// Removes a node and every edge touching it.
    ///
    /// A running task for the node keeps going; its result is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`].
    pub fn remove_node(&mut self, node_id: &NodeId) -> Result<RemovedNode, GraphError> {
        self.record(Checkpoint::Always, |store| store.remove_node(node_id))
    }

    /// Merges a partial payload into a node. Consecutive edits of the same
    /// node collapse into one undo step.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`] or [`GraphError::PayloadKindMismatch`].
    pub fn update_node_data(&mut self, node_id: &NodeId, patch: &NodePatch) -> Result<(), GraphError> {
        let key = CoalesceKey::new(node_id.clone(), EditField::Data);
        self.record(Checkpoint::Coalesce(key), |store| {
            store.update_node_data(node_id, patch)
        })
    }

    /// Moves a node. A drag collapses into one undo step.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NodeNotFound`].
    pub fn move_node(&mut self, node_id: &NodeId, position: Position) -> Result<(), GraphError> {
        let key = CoalesceKey::new(node_id.clone(), EditField::Position);
        self.record(Checkpoint::Coalesce(key), |store| {
            store.move_node(node_id, position)
        })
    }

    /// Connects two nodes.
    ///
    /// # Errors
    ///
    /// See [`GraphStore::add_edge`].
    pub fn add_edge(&mut self, connection: Connection) -> Result<EdgeId, GraphError> {
        self.record(Checkpoint::Always, |store| store.add_edge(connection))
    }

    /// Removes an edge.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EdgeNotFound`].
    pub fn remove_edge(&mut self, edge_id: &EdgeId) -> Result<Edge, GraphError> {
        self.record(Checkpoint::Always, |store| store.remove_edge(edge_id))
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.store.set_selection(selection);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.store.set_viewport(viewport);
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.persistence.rename(name, Instant::now());
    }

    /// Moves the workflow into a folder, or out of any folder with `None`.
    pub fn set_folder(&mut self, folder_id: Option<FolderId>) {
        self.persistence.set_folder(folder_id, Instant::now());
    }

    pub fn set_thumbnail(&mut self, thumbnail: Option<String>) {
        self.persistence.set_thumbnail(thumbnail, Instant::now());
    }

    // Runs

    /// Starts a run of a model node and returns its task id.
    ///
    /// Rejections happen before any state changes. Once a task exists, every
    /// failure is recorded on the task and the node instead of being
    /// returned; a blank resolved user message fails the task immediately
    /// without calling the model.
    ///
    /// # Errors
    ///
    /// - [`RunError::NodeNotFound`] if the node does not exist
    /// - [`RunError::NotRunnable`] if it is not a model node
    /// - [`RunError::AlreadyRunning`] if it has a running task
    /// - [`RunError::NoRuntime`] outside a Tokio runtime
    #[instrument(skip_all, fields(node_id = %node_id))]
    pub fn run_node(&mut self, node_id: &NodeId) -> Result<TaskId, RunError> {
        let node = self.store.node(node_id).ok_or_else(|| RunError::NodeNotFound {
            node_id: node_id.clone(),
        })?;
        let NodeData::Model(data) = &node.data else {
            return Err(RunError::NotRunnable {
                node_id: node_id.clone(),
                kind: node.kind(),
            });
        };
        let model = data.model.clone();
        let label = data
            .label
            .clone()
            .unwrap_or_else(|| format!("{model} on {node_id}"));

        self.tasks.ensure_runtime()?;
        let task_id = self.tasks.begin(node_id, label)?;
        self.write_run_state(node_id, ModelPatch::started());
        self.events.emit(EditorEvent::TaskStarted {
            task_id,
            node_id: node_id.clone(),
        });
        info!(task_id = %task_id, model = %model, "task started");

        let inputs = match self.resolve_inputs(node_id) {
            Ok(inputs) => inputs,
            Err(error) => {
                self.fail_task(&task_id, node_id, &error.to_string());
                return Ok(task_id);
            }
        };
        if inputs.user_message.trim().is_empty() {
            self.fail_task(&task_id, node_id, USER_MESSAGE_REQUIRED);
            return Ok(task_id);
        }

        let request = InvocationRequest::new(model, inputs.user_message.clone())
            .with_system_prompt(inputs.system_prompt.clone())
            .with_images(inputs.image_payloads());
        if let Err(error) = self.tasks.dispatch(task_id, node_id.clone(), request) {
            self.fail_task(&task_id, node_id, &error.to_string());
        }
        Ok(task_id)
    }

    /// Writes run state onto a model node without a history checkpoint.
    fn write_run_state(&mut self, node_id: &NodeId, patch: ModelPatch) {
        if let Err(error) = self.store.update_node_data(node_id, &patch.into()) {
            debug!(node_id = %node_id, error = %error, "run state not written");
        }
    }

    fn fail_task(&mut self, task_id: &TaskId, node_id: &NodeId, message: &str) {
        let Some(task) = self.tasks.finish(task_id, Some(message.to_string())) else {
            return;
        };
        let status = task.status;
        warn!(task_id = %task_id, node_id = %node_id, error = message, "task failed");
        self.write_run_state(node_id, ModelPatch::failed(message));
        self.events.emit(EditorEvent::TaskFinished {
            task_id: *task_id,
            node_id: node_id.clone(),
            status,
        });
    }

    /// Applies one finished invocation to the graph.
    ///
    /// Returns false if the result was discarded because the node is gone or
    /// the task had already finished.
    pub fn apply_completion(&mut self, completion: TaskCompletion) -> bool {
        let TaskCompletion {
            task_id,
            node_id,
            outcome,
        } = completion;

        let error = outcome.as_ref().err().map(ToString::to_string);
        let Some(task) = self.tasks.finish(&task_id, error) else {
            debug!(task_id = %task_id, "completion for finished task ignored");
            return false;
        };
        let status = task.status;
        self.events.emit(EditorEvent::TaskFinished {
            task_id,
            node_id: node_id.clone(),
            status,
        });

        let live = self
            .store
            .node(&node_id)
            .is_some_and(|node| node.kind() == NodeKind::Model);
        if !live {
            debug!(task_id = %task_id, node_id = %node_id, "node removed while running; result discarded");
            return false;
        }

        match outcome {
            Ok(output) => {
                self.write_run_state(&node_id, ModelPatch::succeeded(output.clone()));
                let updated = propagate(&mut self.store, &node_id, OUTPUT_HANDLE, &output);
                info!(task_id = %task_id, node_id = %node_id, propagated = updated.len(), "task completed");
            }
            Err(error) => {
                warn!(task_id = %task_id, node_id = %node_id, error = %error, "task failed");
                self.write_run_state(&node_id, ModelPatch::failed(error.to_string()));
            }
        }
        self.persistence.note_change(Instant::now());
        true
    }

    /// Waits for the next run to finish and applies it.
    ///
    /// Returns the finished task's id, or `None` if nothing is running.
    pub async fn next_completion(&mut self) -> Option<TaskId> {
        let completion = self.tasks.next_completion().await?;
        let task_id = completion.task_id;
        self.apply_completion(completion);
        Some(task_id)
    }

    /// Applies every completion that is already available, without waiting.
    pub fn drain_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Some(completion) = self.tasks.try_next_completion() {
            self.apply_completion(completion);
            applied += 1;
        }
        applied
    }

    /// Waits until no run is in flight.
    pub async fn wait_idle(&mut self) {
        while self.next_completion().await.is_some() {}
    }

    // History

    /// Restores the graph before the last user mutation. No-op when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.undo(self.store.snapshot()) else {
            return false;
        };
        self.restore(&previous);
        true
    }

    /// Reapplies the last undone mutation. No-op when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.redo(self.store.snapshot()) else {
            return false;
        };
        self.restore(&next);
        true
    }

    fn restore(&mut self, snapshot: &HistorySnapshot) {
        self.store.restore(snapshot);
        self.reconcile_loading();
        self.persistence.note_change(Instant::now());
    }

    /// Makes `is_loading` match the running tasks after the graph was replaced.
    fn reconcile_loading(&mut self) {
        let stale: Vec<(NodeId, bool)> = self
            .store
            .nodes()
            .iter()
            .filter_map(|node| {
                let data = node.model_data()?;
                let running = self.tasks.is_running(&node.id);
                (data.is_loading != running).then(|| (node.id.clone(), running))
            })
            .collect();

        for (node_id, running) in stale {
            let patch = ModelPatch {
                is_loading: Some(running),
                ..ModelPatch::default()
            };
            self.write_run_state(&node_id, patch);
        }
    }

    // Persistence

    /// Saves the graph and metadata to the remote store.
    ///
    /// # Errors
    ///
    /// Returns a [`SaveError`]; the editor stays dirty and keeps its state.
    #[instrument(skip(self))]
    pub async fn save(&mut self) -> Result<WorkflowId, SaveError> {
        let revision = self.store.revision();
        let result = self
            .persistence
            .save(self.store.nodes(), self.store.edges(), revision, Instant::now())
            .await;
        match &result {
            Ok(workflow_id) => self.events.emit(EditorEvent::Saved {
                workflow_id: workflow_id.clone(),
            }),
            Err(error) => self.events.emit(EditorEvent::SaveFailed {
                message: error.to_string(),
            }),
        }
        result
    }

    /// Saves if autosave is enabled and the debounce period has passed.
    pub async fn autosave_if_due(&mut self) -> Option<Result<WorkflowId, SaveError>> {
        if !self.persistence.autosave_due(self.store.revision(), Instant::now()) {
            return None;
        }
        debug!("autosaving workflow");
        Some(self.save().await)
    }

    /// Fetches a workflow and replaces the current graph with it.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Remote`] if the fetch fails and
    /// [`LoadError::Document`] if the document is not a valid graph. The
    /// current graph is unchanged in both cases.
    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn open(&mut self, workflow_id: &WorkflowId) -> Result<LoadReport, LoadError> {
        let document = self.persistence.store().get_workflow(workflow_id).await?;
        Ok(self.load_document(document)?)
    }

    /// Replaces the current graph with a fetched document.
    ///
    /// Invalid edges are dropped and reported, and leave the editor dirty so
    /// the repaired graph is saved. History starts over.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidDocument`] for an undecodable node or a
    /// duplicate node id.
    pub fn load_document(&mut self, document: WorkflowDocument) -> Result<LoadReport, GraphError> {
        let metadata = WorkflowMetadata::from_document(&document);
        let decoded = decode_graph(document.nodes, document.edges)?;
        for dropped in &decoded.dropped_edges {
            warn!(edge_id = %dropped.edge_id, error = %dropped.reason, "dropping undecodable edge from document");
        }

        let loaded = self.store.load(decoded.nodes, decoded.edges)?;
        let mut report = LoadReport {
            dropped_edges: decoded.dropped_edges,
        };
        report.dropped_edges.extend(loaded.dropped_edges);

        self.history.clear();
        self.reconcile_loading();
        self.persistence
            .mark_loaded(metadata, self.store.revision(), report.is_clean());
        info!(
            nodes = self.store.nodes().len(),
            edges = self.store.edges().len(),
            repaired = report.dropped_edges.len(),
            "workflow loaded"
        );
        Ok(report)
    }
}
