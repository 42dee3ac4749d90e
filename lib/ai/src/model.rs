//! Supported model identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A model the invocation endpoint can run.
///
/// Known models get their own variant. Any other identifier found in a
/// persisted document is kept verbatim in [`ModelId::Other`] so that loading
/// and saving never rewrites it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelId {
    /// Fast multimodal model; the default for new nodes.
    #[default]
    Gemini25Flash,
    /// Higher quality multimodal model.
    Gemini25Pro,
    /// Lightweight variant of the flash model.
    Gemini25FlashLite,
    /// Previous generation flash model.
    Gemini20Flash,
    /// An identifier this build does not recognize.
    Other(String),
}

impl ModelId {
    /// Every model with a dedicated variant, in display order.
    pub const KNOWN: [Self; 4] = [
        Self::Gemini25Flash,
        Self::Gemini25Pro,
        Self::Gemini25FlashLite,
        Self::Gemini20Flash,
    ];

    /// Returns the wire identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Gemini25Flash => "gemini-2.5-flash",
            Self::Gemini25Pro => "gemini-2.5-pro",
            Self::Gemini25FlashLite => "gemini-2.5-flash-lite",
            Self::Gemini20Flash => "gemini-2.0-flash",
            Self::Other(id) => id,
        }
    }

    /// Returns true if this identifier has a dedicated variant.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|known| known.as_str() == id)
            .unwrap_or(Self::Other(id))
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self::from(id.to_string())
    }
}

impl From<ModelId> for String {
    fn from(model: ModelId) -> Self {
        match model {
            ModelId::Other(id) => id,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
