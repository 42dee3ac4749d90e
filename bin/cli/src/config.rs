//! Command line configuration.
//!
//! Loaded via the `config` crate from environment variables prefixed with
//! `NODELOOM`, using `__` to separate nested keys:
//!
//! ```text
//! NODELOOM__STORE__BASE_URL=http://localhost:3000
//! NODELOOM__STORE__API_TOKEN=...
//! NODELOOM__MODEL__URL=http://localhost:3000/api/llm
//! NODELOOM__EDITOR__MAX_CONCURRENT_RUNS=2
//! ```

use nodeloom_ai::ModelEndpointConfig;
use nodeloom_workflow::{EditorConfig, RemoteStoreConfig};
use serde::Deserialize;

/// Configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct CliConfig {
    /// Remote workflow store.
    pub store: RemoteStoreConfig,

    /// Model invocation endpoint.
    pub model: ModelEndpointConfig,

    /// Editing session settings.
    #[serde(default)]
    pub editor: EditorConfig,
}

impl CliConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let source = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("NODELOOM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(source)
    }

    /// Deserializes an already built configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_config(source: config::Config) -> Result<Self, config::ConfigError> {
        source.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder()
            .set_override("store.base_url", "http://localhost:3000")
            .expect("override")
            .set_override("model.url", "http://localhost:3000/api/llm")
            .expect("override")
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = CliConfig::from_config(builder().build().expect("build")).expect("config");
        assert_eq!(config.store.base_url, "http://localhost:3000");
        assert_eq!(config.store.timeout_seconds, 30);
        assert_eq!(config.model.timeout_seconds, 60);
        assert_eq!(config.editor.history.max_depth, 100);
        assert!(config.editor.max_concurrent_runs.is_none());
    }

    #[test]
    fn nested_editor_settings_apply() {
        let source = builder()
            .set_override("editor.max_concurrent_runs", 2)
            .expect("override")
            .set_override("editor.autosave.enabled", false)
            .expect("override")
            .build()
            .expect("build");
        let config = CliConfig::from_config(source).expect("config");
        assert_eq!(config.editor.max_concurrent_runs, Some(2));
        assert!(!config.editor.autosave.enabled);
    }

    #[test]
    fn missing_store_is_an_error() {
        let source = config::Config::builder()
            .set_override("model.url", "http://localhost:3000/api/llm")
            .expect("override")
            .build()
            .expect("build");
        assert!(CliConfig::from_config(source).is_err());
    }
}
