//! Core domain types and utilities for nodeloom.
//!
//! This crate provides the identifiers and error handling shared by the
//! workflow engine, the model invocation client, and the command line driver.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{EdgeId, FolderId, NodeId, ParseIdError, TaskId, WorkflowId};
