//! Workflow graph engine for nodeloom.
//!
//! A workflow is a directed graph of typed nodes (text prompts, image
//! collections, model invocations). This crate keeps that graph in memory
//! and provides:
//!
//! - **Graph Store**: ordered nodes and edges with validated, atomic mutations
//! - **Input Resolution**: the effective inputs of a model node given the topology
//! - **Tasks**: asynchronous model runs, at most one per node
//! - **Propagation**: one-shot writes of a run's output into downstream inputs
//! - **History**: snapshot undo/redo with coalesced edits
//! - **Persistence**: dirty tracking and saves to the remote workflow store
//!
//! [`Editor`] ties these together for one open workflow.

pub mod config;
pub mod document;
pub mod edge;
pub mod editor;
pub mod error;
pub mod event;
pub mod history;
pub mod node;
pub mod persistence;
pub mod propagate;
pub mod remote;
pub mod resolve;
pub mod store;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EditorConfig;
pub use document::{EdgeRecord, NodeRecord, WorkflowDocument, WorkflowUpdate};
pub use edge::{Connection, Edge, OUTPUT_HANDLE, TargetHandle};
pub use editor::Editor;
pub use error::{ErrorKind, GraphError, LoadError, RunError, SaveError, StoreError};
pub use event::EditorEvent;
pub use history::HistoryConfig;
pub use node::{ImageItem, Node, NodeData, NodeKind, NodePatch, Position};
pub use persistence::{AutosaveConfig, SaveState, WorkflowMetadata};
pub use remote::{HttpWorkflowStore, RemoteStoreConfig, WorkflowStore};
pub use resolve::{ResolvedInputs, resolve_inputs};
pub use store::{LoadReport, Selection, Viewport};
pub use task::{Task, TaskStatus};
