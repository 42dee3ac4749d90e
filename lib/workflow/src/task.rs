//! Asynchronous node runs.
//!
//! A [`Task`] records one run attempt of a model node:
//! `running -> completed | failed`, exactly once. Task records are an
//! append-only audit list; they are not part of the graph.
//!
//! [`TaskEngine`] enforces at most one running task per node and performs the
//! model invocation on the Tokio runtime. Invocations never touch the graph.
//! Their results come back as [`TaskCompletion`] messages on a channel that
//! the owner drains on its own logical thread, where the outcome is applied.
//!
//! With a concurrency limit, invocations wait in a FIFO queue and are admitted
//! in the order they were requested.

use chrono::{DateTime, Utc};
use nodeloom_ai::{InvocationRequest, LlmError, ModelBackend};
use nodeloom_core::{NodeId, TaskId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, warn};

use crate::error::RunError;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Returns true if the task has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Record of one run attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    /// The node that was run.
    pub node_id: NodeId,
    /// Human readable label for task lists.
    pub label: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Task {
    /// Creates a running task.
    #[must_use]
    pub fn new(node_id: NodeId, label: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            node_id,
            label: label.into(),
            status: TaskStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Marks the task as completed. Returns false if it had already finished.
    pub fn complete(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Marks the task as failed. Returns false if it had already finished.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
        true
    }
}

/// Result of a model invocation, delivered back to the task's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub node_id: NodeId,
    pub outcome: Result<String, LlmError>,
}

struct Job {
    request: InvocationRequest,
    reply: Reply,
}

/// Sends a job's completion exactly once.
///
/// A reply dropped unsent (the job was lost with its runtime, or its
/// invocation was cancelled) reports the run as aborted, so a node is never
/// left running without a completion on the way.
struct Reply {
    task_id: TaskId,
    node_id: NodeId,
    completions: mpsc::UnboundedSender<TaskCompletion>,
    sent: bool,
}

impl Reply {
    fn send(mut self, outcome: Result<String, LlmError>) {
        self.sent = true;
        self.deliver(outcome);
    }

    fn deliver(&self, outcome: Result<String, LlmError>) {
        // The owner may have gone away; its completions no longer matter then.
        let _ = self.completions.send(TaskCompletion {
            task_id: self.task_id,
            node_id: self.node_id.clone(),
            outcome,
        });
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if !self.sent {
            warn!(task_id = %self.task_id, node_id = %self.node_id, "run dropped before completing");
            self.deliver(Err(LlmError::Aborted {
                reason: "run dropped before completing".to_string(),
            }));
        }
    }
}

/// Tracks tasks and runs model invocations.
pub struct TaskEngine {
    backend: Arc<dyn ModelBackend>,
    tasks: Vec<Task>,
    running: HashMap<NodeId, TaskId>,
    completion_tx: mpsc::UnboundedSender<TaskCompletion>,
    completion_rx: mpsc::UnboundedReceiver<TaskCompletion>,
    limit: Option<usize>,
    queue: Option<mpsc::UnboundedSender<Job>>,
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("tasks", &self.tasks.len())
            .field("running", &self.running.len())
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl TaskEngine {
    /// Creates an engine. `max_concurrent` bounds in-flight invocations.
    #[must_use]
    pub fn new(backend: Arc<dyn ModelBackend>, max_concurrent: Option<usize>) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            tasks: Vec::new(),
            running: HashMap::new(),
            completion_tx,
            completion_rx,
            limit: max_concurrent.map(|n| n.max(1)),
            queue: None,
        }
    }

    /// Returns every task in creation order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == task_id)
    }

    /// Returns the running task for a node, if any.
    #[must_use]
    pub fn running_task(&self, node_id: &NodeId) -> Option<TaskId> {
        self.running.get(node_id).copied()
    }

    #[must_use]
    pub fn is_running(&self, node_id: &NodeId) -> bool {
        self.running.contains_key(node_id)
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Fails with [`RunError::NoRuntime`] outside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::NoRuntime`] if no runtime is available.
    pub fn ensure_runtime(&self) -> Result<Handle, RunError> {
        Handle::try_current().map_err(|_| RunError::NoRuntime)
    }

    /// Creates a running task for a node.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::AlreadyRunning`] if the node has a running task.
    pub fn begin(&mut self, node_id: &NodeId, label: impl Into<String>) -> Result<TaskId, RunError> {
        if let Some(task_id) = self.running_task(node_id) {
            return Err(RunError::AlreadyRunning {
                node_id: node_id.clone(),
                task_id,
            });
        }
        let task = Task::new(node_id.clone(), label);
        let task_id = task.id;
        self.tasks.push(task);
        self.running.insert(node_id.clone(), task_id);
        Ok(task_id)
    }

    /// Finishes a task. `error` of `None` means success.
    ///
    /// Returns the finished task, or `None` if the task is unknown or had
    /// already finished.
    pub fn finish(&mut self, task_id: &TaskId, error: Option<String>) -> Option<&Task> {
        let task = self.tasks.iter_mut().find(|t| &t.id == task_id)?;
        let changed = match error {
            None => task.complete(),
            Some(message) => task.fail(message),
        };
        if !changed {
            return None;
        }
        if self.running.get(&task.node_id) == Some(task_id) {
            self.running.remove(&task.node_id);
        }
        Some(&*task)
    }

    /// Starts the model invocation for a running task.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::NoRuntime`] outside a Tokio runtime.
    pub fn dispatch(
        &mut self,
        task_id: TaskId,
        node_id: NodeId,
        request: InvocationRequest,
    ) -> Result<(), RunError> {
        let handle = self.ensure_runtime()?;
        let job = Job {
            request,
            reply: Reply {
                task_id,
                node_id,
                completions: self.completion_tx.clone(),
                sent: false,
            },
        };

        let Some(limit) = self.limit else {
            handle.spawn(invoke(self.backend.clone(), job, None));
            return Ok(());
        };

        // The admission loop lives as long as its runtime; start a new one
        // if the previous runtime went away.
        if self.queue.as_ref().is_none_or(mpsc::UnboundedSender::is_closed) {
            let (queue_tx, queue_rx) = mpsc::unbounded_channel();
            handle.spawn(admit(
                queue_rx,
                Arc::new(Semaphore::new(limit)),
                self.backend.clone(),
            ));
            // Replacing the sender frees the old queue; jobs still in it
            // report themselves aborted.
            self.queue = Some(queue_tx);
        }

        if let Some(queue) = &self.queue {
            // A failed send drops the job, which fails the task.
            let _ = queue.send(job);
        }
        Ok(())
    }

    /// Returns a completion if one is ready, without waiting.
    pub fn try_next_completion(&mut self) -> Option<TaskCompletion> {
        self.completion_rx.try_recv().ok()
    }

    /// Waits for the next completion.
    ///
    /// Returns `None` immediately if no task is running.
    pub async fn next_completion(&mut self) -> Option<TaskCompletion> {
        if self.running.is_empty() {
            return self.try_next_completion();
        }
        self.completion_rx.recv().await
    }
}

/// Admits queued jobs one permit at a time, in arrival order.
async fn admit(
    mut queue: mpsc::UnboundedReceiver<Job>,
    permits: Arc<Semaphore>,
    backend: Arc<dyn ModelBackend>,
) {
    while let Some(job) = queue.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        tokio::spawn(invoke(backend.clone(), job, Some(permit)));
    }
}

async fn invoke(backend: Arc<dyn ModelBackend>, job: Job, permit: Option<OwnedSemaphorePermit>) {
    let Job { request, reply } = job;
    let (task_id, node_id) = (reply.task_id, reply.node_id.clone());
    debug!(task_id = %task_id, node_id = %node_id, model = %request.model, "invoking model");

    // The call runs in its own task so a panicking backend still yields a
    // completion and frees the node.
    let call = tokio::spawn(async move { backend.invoke(&request).await });
    let outcome = match call.await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(task_id = %task_id, node_id = %node_id, error = %err, "model invocation aborted");
            Err(LlmError::Aborted {
                reason: if err.is_panic() {
                    "backend panicked".to_string()
                } else {
                    "cancelled".to_string()
                },
            })
        }
    };
    drop(permit);
    reply.send(outcome);
}
