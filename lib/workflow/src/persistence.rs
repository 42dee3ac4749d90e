//! Save and sync of the in-memory graph.
//!
//! The in-memory graph is the source of truth. The coordinator remembers
//! which graph revision was last persisted; the editor is dirty whenever the
//! store's revision or the workflow metadata moved past what was saved. Only a
//! successful save clears that, and a failed save never touches local state.

use crate::document::{WorkflowDocument, WorkflowUpdate, encode_graph};
use crate::edge::Edge;
use crate::error::SaveError;
use crate::node::Node;
use crate::remote::WorkflowStore;
use chrono::{DateTime, Utc};
use nodeloom_core::{FolderId, WorkflowId};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const UNTITLED: &str = "Untitled workflow";

/// Autosave configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AutosaveConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Quiet period after the last change before an autosave is attempted.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    2000
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// What the save indicator should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Saved,
    Unsaved,
    /// Unsaved, and the last save attempt failed.
    Failed,
}

/// Document-level fields that live next to the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowMetadata {
    /// Remote id; `None` until the first successful save.
    pub id: Option<WorkflowId>,
    pub name: String,
    pub folder_id: Option<FolderId>,
    pub thumbnail: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for WorkflowMetadata {
    fn default() -> Self {
        Self {
            id: None,
            name: UNTITLED.to_string(),
            folder_id: None,
            thumbnail: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl WorkflowMetadata {
    /// Takes the metadata of a fetched document.
    #[must_use]
    pub fn from_document(document: &WorkflowDocument) -> Self {
        Self {
            id: Some(document.id.clone()),
            name: document.name.clone(),
            folder_id: document.folder_id.clone(),
            thumbnail: document.thumbnail.clone(),
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }

    /// Adopts the server-assigned id and timestamps.
    fn reconcile(&mut self, document: &WorkflowDocument) {
        self.id = Some(document.id.clone());
        if document.created_at.is_some() {
            self.created_at = document.created_at;
        }
        if document.updated_at.is_some() {
            self.updated_at = document.updated_at;
        }
    }
}

/// Tracks unsaved changes and performs saves.
pub struct PersistenceCoordinator {
    store: Arc<dyn WorkflowStore>,
    autosave: AutosaveConfig,
    metadata: WorkflowMetadata,
    meta_revision: u64,
    saved_meta_revision: u64,
    /// Graph revision last persisted; `None` forces dirty until the next save.
    saved_graph_revision: Option<u64>,
    last_error: Option<SaveError>,
    last_change: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl std::fmt::Debug for PersistenceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCoordinator")
            .field("metadata", &self.metadata)
            .field("saved_graph_revision", &self.saved_graph_revision)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl PersistenceCoordinator {
    /// Creates a coordinator for a new, never-saved workflow.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>, autosave: AutosaveConfig) -> Self {
        Self {
            store,
            autosave,
            metadata: WorkflowMetadata::default(),
            meta_revision: 0,
            saved_meta_revision: 0,
            saved_graph_revision: Some(0),
            last_error: None,
            last_change: None,
            last_attempt: None,
        }
    }

    /// Returns the store this coordinator saves to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    #[must_use]
    pub fn metadata(&self) -> &WorkflowMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn workflow_id(&self) -> Option<&WorkflowId> {
        self.metadata.id.as_ref()
    }

    /// Returns true if there are changes since the last successful save.
    #[must_use]
    pub fn is_dirty(&self, graph_revision: u64) -> bool {
        self.saved_graph_revision != Some(graph_revision)
            || self.meta_revision != self.saved_meta_revision
    }

    #[must_use]
    pub fn save_state(&self, graph_revision: u64) -> SaveState {
        if !self.is_dirty(graph_revision) {
            SaveState::Saved
        } else if self.last_error.is_some() {
            SaveState::Failed
        } else {
            SaveState::Unsaved
        }
    }

    /// The error of the last save attempt, cleared by a successful save.
    #[must_use]
    pub fn last_error(&self) -> Option<&SaveError> {
        self.last_error.as_ref()
    }

    /// Records that the graph changed at `now`, for autosave debouncing.
    pub fn note_change(&mut self, now: Instant) {
        self.last_change = Some(now);
    }

    pub fn rename(&mut self, name: impl Into<String>, now: Instant) {
        self.metadata.name = name.into();
        self.touch_metadata(now);
    }

    pub fn set_folder(&mut self, folder_id: Option<FolderId>, now: Instant) {
        self.metadata.folder_id = folder_id;
        self.touch_metadata(now);
    }

    pub fn set_thumbnail(&mut self, thumbnail: Option<String>, now: Instant) {
        self.metadata.thumbnail = thumbnail;
        self.touch_metadata(now);
    }

    fn touch_metadata(&mut self, now: Instant) {
        self.meta_revision += 1;
        self.note_change(now);
    }

    /// Resets tracking after a document was loaded into the graph.
    ///
    /// `clean` is false when the load repaired the document, which keeps the
    /// editor dirty so the repair gets persisted.
    pub fn mark_loaded(&mut self, metadata: WorkflowMetadata, graph_revision: u64, clean: bool) {
        self.metadata = metadata;
        self.saved_meta_revision = self.meta_revision;
        self.saved_graph_revision = clean.then_some(graph_revision);
        self.last_error = None;
        self.last_change = None;
        self.last_attempt = None;
    }

    /// Returns true if an autosave should be attempted now.
    ///
    /// Requires autosave to be enabled, unsaved changes, a quiet debounce
    /// period since the last change, and a debounce period since the last
    /// attempt so a failing store is not hammered.
    #[must_use]
    pub fn autosave_due(&self, graph_revision: u64, now: Instant) -> bool {
        if !self.autosave.enabled || !self.is_dirty(graph_revision) {
            return false;
        }
        let debounce = Duration::from_millis(self.autosave.debounce_ms);
        let elapsed = |at: Option<Instant>| {
            at.is_none_or(|at| now.saturating_duration_since(at) >= debounce)
        };
        elapsed(self.last_change) && elapsed(self.last_attempt)
    }

    /// Persists the given graph state.
    ///
    /// A workflow that has never been saved is created first and adopts the
    /// server-assigned id. On success the graph revision is recorded as saved
    /// and the id and timestamps are reconciled from the response. On failure
    /// the error is recorded and the editor stays dirty.
    ///
    /// # Errors
    ///
    /// Returns a [`SaveError`] if encoding or any remote call fails.
    pub async fn save(
        &mut self,
        nodes: &[Node],
        edges: &[Edge],
        graph_revision: u64,
        now: Instant,
    ) -> Result<WorkflowId, SaveError> {
        self.last_attempt = Some(now);
        let meta_revision = self.meta_revision;

        match self.persist(nodes, edges).await {
            Ok(document) => {
                self.metadata.reconcile(&document);
                self.saved_graph_revision = Some(graph_revision);
                self.saved_meta_revision = meta_revision;
                self.last_error = None;
                info!(workflow_id = %document.id, graph_revision, "workflow saved");
                Ok(document.id)
            }
            Err(error) => {
                warn!(error = %error, "workflow save failed; changes kept locally");
                self.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    async fn persist(&mut self, nodes: &[Node], edges: &[Edge]) -> Result<WorkflowDocument, SaveError> {
        let (nodes, edges) = encode_graph(nodes, edges)?;

        let workflow_id = match &self.metadata.id {
            Some(id) => id.clone(),
            None => {
                let created = self
                    .store
                    .create_workflow(&self.metadata.name, self.metadata.folder_id.as_ref())
                    .await?;
                // Adopt the id right away so a failed update does not create
                // a second remote workflow on retry.
                self.metadata.reconcile(&created);
                created.id
            }
        };

        let update = WorkflowUpdate {
            name: Some(self.metadata.name.clone()),
            folder_id: Some(self.metadata.folder_id.clone()),
            nodes: Some(nodes),
            edges: Some(edges),
            thumbnail: Some(self.metadata.thumbnail.clone()),
        };
        Ok(self.store.update_workflow(&workflow_id, &update).await?)
    }
}
