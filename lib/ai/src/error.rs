//! Error types for the model invocation boundary.

use std::fmt;

/// Errors from model invocation.
///
/// The engine treats every variant the same way: the run fails and the
/// message is shown on the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Transport failure or a non-success HTTP status.
    RequestFailed { reason: String },
    /// The endpoint answered with `success: false`.
    Rejected { reason: String },
    /// The response body could not be decoded.
    ResponseParseFailed { reason: String },
    /// Timeout waiting for response.
    Timeout,
    /// The endpoint reported success without any output.
    EmptyOutput,
    /// Invalid configuration.
    InvalidConfig { reason: String },
    /// The invocation stopped before producing a result (it panicked or its
    /// runtime shut down).
    Aborted { reason: String },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { reason } => write!(f, "model request failed: {reason}"),
            // Rejections carry the endpoint's own message, shown verbatim.
            Self::Rejected { reason } => f.write_str(reason),
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse model response: {reason}")
            }
            Self::Timeout => write!(f, "model request timed out"),
            Self::EmptyOutput => write!(f, "model returned no output"),
            Self::InvalidConfig { reason } => {
                write!(f, "invalid model endpoint configuration: {reason}")
            }
            Self::Aborted { reason } => write!(f, "model invocation aborted: {reason}"),
        }
    }
}

impl std::error::Error for LlmError {}
