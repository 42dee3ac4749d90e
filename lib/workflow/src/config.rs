//! Editor configuration.

use crate::history::HistoryConfig;
use crate::persistence::AutosaveConfig;
use serde::Deserialize;

/// Settings for one editing session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditorConfig {
    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub autosave: AutosaveConfig,

    /// Upper bound on model invocations in flight. Unbounded when unset;
    /// queued runs are admitted in request order.
    #[serde(default)]
    pub max_concurrent_runs: Option<usize>,
}
