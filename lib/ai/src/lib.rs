//! Model invocation primitives for nodeloom.
//!
//! The workflow engine treats a language model as an opaque async function:
//! `invoke(model, system_prompt, user_message, images) -> text | error`.
//! This crate defines that boundary:
//!
//! - [`ModelBackend`]: the trait the engine calls
//! - [`InvocationRequest`] / [`InvocationResponse`]: the endpoint's wire shapes
//! - [`HttpModelBackend`]: a reqwest client for the remote invocation endpoint

pub mod backend;
pub mod error;
pub mod http;
pub mod model;

pub use backend::{InvocationRequest, InvocationResponse, ModelBackend};
pub use error::LlmError;
pub use http::{HttpModelBackend, ModelEndpointConfig};
pub use model::ModelId;
