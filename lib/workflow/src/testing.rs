//! Test doubles for the model backend and the workflow store.

use crate::document::{WorkflowDocument, WorkflowUpdate};
use crate::error::StoreError;
use crate::remote::WorkflowStore;
use async_trait::async_trait;
use chrono::Utc;
use nodeloom_ai::{InvocationRequest, LlmError, ModelBackend};
use nodeloom_core::{FolderId, WorkflowId};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Backend that answers from a script and records every request.
///
/// Scripted replies are used in order; once they run out every call gets the
/// fallback. A gated backend holds each call until the test adds a permit.
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Result<String, LlmError>,
    calls: Mutex<Vec<InvocationRequest>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedBackend {
    pub(crate) fn replying(output: &str) -> Self {
        Self::with_fallback(Ok(output.to_string()))
    }

    pub(crate) fn failing(error: LlmError) -> Self {
        Self::with_fallback(Err(error))
    }

    /// A backend whose calls block until a permit is added to the gate.
    pub(crate) fn gated(output: &str) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut backend = Self::replying(output);
        backend.gate = Some(gate.clone());
        (backend, gate)
    }

    fn with_fallback(fallback: Result<String, LlmError>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Queues a reply ahead of the fallback.
    pub(crate) fn then(self, reply: Result<String, LlmError>) -> Self {
        self.replies.lock().expect("replies lock").push_back(reply);
        self
    }

    /// Requests received so far, in call order.
    pub(crate) fn calls(&self) -> Vec<InvocationRequest> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn invoke(&self, request: &InvocationRequest) -> Result<String, LlmError> {
        self.calls.lock().expect("calls lock").push(request.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        let scripted = self.replies.lock().expect("replies lock").pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Backend whose every call panics.
pub(crate) struct PanickingBackend;

#[async_trait]
impl ModelBackend for PanickingBackend {
    async fn invoke(&self, _request: &InvocationRequest) -> Result<String, LlmError> {
        panic!("backend exploded");
    }
}

/// Workflow store kept in memory. Clones share the same state.
#[derive(Clone, Default)]
pub(crate) struct InMemoryWorkflowStore {
    documents: Arc<Mutex<HashMap<WorkflowId, WorkflowDocument>>>,
    failure: Arc<Mutex<Option<StoreError>>>,
    creates: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
}

impl InMemoryWorkflowStore {
    /// Makes every call fail with `error` until reset with `None`.
    pub(crate) fn fail_with(&self, error: Option<StoreError>) {
        *self.failure.lock().expect("failure lock") = error;
    }

    pub(crate) fn insert(&self, document: WorkflowDocument) {
        self.documents
            .lock()
            .expect("documents lock")
            .insert(document.id.clone(), document);
    }

    pub(crate) fn document(&self, workflow_id: &WorkflowId) -> Option<WorkflowDocument> {
        self.documents
            .lock()
            .expect("documents lock")
            .get(workflow_id)
            .cloned()
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub(crate) fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.failure.lock().expect("failure lock").clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_workflow(
        &self,
        name: &str,
        folder_id: Option<&FolderId>,
    ) -> Result<WorkflowDocument, StoreError> {
        self.check()?;
        let count = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let document = WorkflowDocument {
            id: WorkflowId::new(format!("wf-{count}")),
            name: name.to_string(),
            folder_id: folder_id.cloned(),
            nodes: Vec::new(),
            edges: Vec::new(),
            thumbnail: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.insert(document.clone());
        Ok(document)
    }

    async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<WorkflowDocument, StoreError> {
        self.check()?;
        self.document(workflow_id).ok_or_else(|| StoreError::NotFound {
            workflow_id: workflow_id.clone(),
        })
    }

    async fn update_workflow(
        &self,
        workflow_id: &WorkflowId,
        update: &WorkflowUpdate,
    ) -> Result<WorkflowDocument, StoreError> {
        self.check()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.lock().expect("documents lock");
        let document = documents
            .get_mut(workflow_id)
            .ok_or_else(|| StoreError::NotFound {
                workflow_id: workflow_id.clone(),
            })?;

        if let Some(name) = &update.name {
            document.name.clone_from(name);
        }
        if let Some(folder_id) = &update.folder_id {
            document.folder_id.clone_from(folder_id);
        }
        if let Some(nodes) = &update.nodes {
            document.nodes.clone_from(nodes);
        }
        if let Some(edges) = &update.edges {
            document.edges.clone_from(edges);
        }
        if let Some(thumbnail) = &update.thumbnail {
            document.thumbnail.clone_from(thumbnail);
        }
        document.updated_at = Some(Utc::now());
        Ok(document.clone())
    }

    async fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<(), StoreError> {
        self.check()?;
        self.documents
            .lock()
            .expect("documents lock")
            .remove(workflow_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                workflow_id: workflow_id.clone(),
            })
    }
}
