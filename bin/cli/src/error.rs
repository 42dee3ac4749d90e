//! Error type for command execution.
//!
//! Library errors are wrapped here and propagated as a rootcause
//! [`Report`](rootcause::Report) up to `main`.

use nodeloom_ai::LlmError;
use nodeloom_workflow::{GraphError, LoadError, RunError, SaveError, StoreError};
use std::fmt;

/// Errors from running a command.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// A client could not be set up.
    Model(LlmError),
    Store(StoreError),
    Load(LoadError),
    Graph(GraphError),
    Run(RunError),
    Save(SaveError),
    /// Output could not be written.
    Output { details: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "configuration error: {details}"),
            Self::Model(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::Load(e) => write!(f, "{e}"),
            Self::Graph(e) => write!(f, "{e}"),
            Self::Run(e) => write!(f, "{e}"),
            Self::Save(e) => write!(f, "{e}"),
            Self::Output { details } => write!(f, "failed to write output: {details}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<config::ConfigError> for CliError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config {
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output {
            details: err.to_string(),
        }
    }
}

impl From<LlmError> for CliError {
    fn from(err: LlmError) -> Self {
        Self::Model(err)
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<LoadError> for CliError {
    fn from(err: LoadError) -> Self {
        Self::Load(err)
    }
}

impl From<GraphError> for CliError {
    fn from(err: GraphError) -> Self {
        Self::Graph(err)
    }
}

impl From<RunError> for CliError {
    fn from(err: RunError) -> Self {
        Self::Run(err)
    }
}

impl From<SaveError> for CliError {
    fn from(err: SaveError) -> Self {
        Self::Save(err)
    }
}
