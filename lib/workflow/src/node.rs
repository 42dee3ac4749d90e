//! Workflow node types and payloads.
//!
//! Nodes are the building blocks of workflows. Each node has:
//! - A unique ID within the workflow
//! - A position owned by the rendering layer (the engine never reads it)
//! - A payload whose shape is fixed by the node's kind
//!
//! Payloads are a closed sum type, so every site that reads node data matches
//! exhaustively on [`NodeData`].

use crate::error::GraphError;
use nodeloom_ai::ModelId;
use nodeloom_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// The kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A literal text value.
    #[serde(rename = "text")]
    Text,
    /// An ordered collection of images.
    #[serde(rename = "image")]
    Image,
    /// A language model invocation.
    #[serde(rename = "llm")]
    Model,
}

impl NodeKind {
    /// Returns the persisted `type` string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Model => "llm",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | "text-literal" => Ok(Self::Text),
            "image" | "image-collection" => Ok(Self::Image),
            "llm" | "model-invocation" => Ok(Self::Model),
            other => Err(GraphError::UnknownNodeKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// A 2D canvas position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One image in a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageItem {
    pub image_url: String,
    pub image_base64: String,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// How an image collection node displays its images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Single,
    All,
}

/// Payload of a text node.
///
/// Each payload keeps unknown `data` keys in `extra`; patches never touch them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextData {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    /// Renderer fields inside `data` that the engine carries through as is.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Payload of an image collection node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    #[serde(default)]
    pub images: Vec<ImageItem>,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    /// Renderer fields inside `data` that the engine carries through as is.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ImageData {
    /// Keeps `current_index` pointing at an existing image.
    fn clamp_index(&mut self) {
        self.current_index = self.current_index.min(self.images.len().saturating_sub(1));
    }
}

/// Payload of a model invocation node.
///
/// `is_loading` and `error` are never both set. Both unset means idle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelData {
    #[serde(default)]
    pub model: ModelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    /// Renderer fields inside `data` that the engine carries through as is.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// A node's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Text(TextData),
    Image(ImageData),
    Model(ModelData),
}

impl NodeData {
    /// Returns the default payload for a kind.
    #[must_use]
    pub fn default_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Text => Self::Text(TextData::default()),
            NodeKind::Image => Self::Image(ImageData::default()),
            NodeKind::Model => Self::Model(ModelData::default()),
        }
    }

    /// Returns the kind this payload belongs to.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Text(_) => NodeKind::Text,
            Self::Image(_) => NodeKind::Image,
            Self::Model(_) => NodeKind::Model,
        }
    }

    /// Returns the display label, if one was set.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Text(data) => data.label.as_deref(),
            Self::Image(data) => data.label.as_deref(),
            Self::Model(data) => data.label.as_deref(),
        }
    }

    /// Returns the value this node offers on its output slot as text.
    ///
    /// Image collections have no text value and yield an empty string.
    #[must_use]
    pub fn output_text(&self) -> &str {
        match self {
            Self::Text(data) => &data.text,
            Self::Model(data) => data.output.as_deref().unwrap_or_default(),
            Self::Image(_) => "",
        }
    }

    /// Returns the images this node offers on its output slot.
    #[must_use]
    pub fn output_images(&self) -> &[ImageItem] {
        match self {
            Self::Image(data) => &data.images,
            Self::Text(_) | Self::Model(_) => &[],
        }
    }

    /// Encodes the payload as the persisted `data` object.
    ///
    /// # Errors
    ///
    /// Returns a serde error if the payload cannot be encoded.
    pub fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            Self::Text(data) => serde_json::to_value(data),
            Self::Image(data) => serde_json::to_value(data),
            Self::Model(data) => serde_json::to_value(data),
        }
    }

    /// Decodes a persisted `data` object for the given kind.
    ///
    /// # Errors
    ///
    /// Returns a serde error if the object does not match the kind's shape.
    pub fn from_json(kind: NodeKind, value: JsonValue) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            NodeKind::Text => Self::Text(serde_json::from_value(value)?),
            NodeKind::Image => {
                let mut data: ImageData = serde_json::from_value(value)?;
                data.clamp_index();
                Self::Image(data)
            }
            NodeKind::Model => Self::Model(serde_json::from_value(value)?),
        })
    }

    /// Merges a partial payload into this one.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::PayloadKindMismatch`] if the patch is for another
    /// kind. The payload is unchanged in that case.
    pub fn apply(&mut self, patch: &NodePatch) -> Result<(), GraphError> {
        match (self, patch) {
            (Self::Text(data), NodePatch::Text(patch)) => patch.apply(data),
            (Self::Image(data), NodePatch::Image(patch)) => patch.apply(data),
            (Self::Model(data), NodePatch::Model(patch)) => patch.apply(data),
            (data, patch) => {
                return Err(GraphError::PayloadKindMismatch {
                    expected: data.kind(),
                    actual: patch.kind(),
                });
            }
        }
        Ok(())
    }

    /// Clears state that only makes sense while a task is in flight.
    pub(crate) fn reset_transient(&mut self) {
        if let Self::Model(data) = self {
            data.is_loading = false;
        }
    }
}

/// Partial update of a text payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextPatch {
    pub text: Option<String>,
    pub label: Option<Option<String>>,
    pub is_locked: Option<bool>,
}

impl TextPatch {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    fn apply(&self, data: &mut TextData) {
        if let Some(text) = &self.text {
            data.text.clone_from(text);
        }
        if let Some(label) = &self.label {
            data.label.clone_from(label);
        }
        if let Some(locked) = self.is_locked {
            data.is_locked = locked;
        }
    }
}

/// Partial update of an image collection payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagePatch {
    pub images: Option<Vec<ImageItem>>,
    pub current_index: Option<usize>,
    pub view_mode: Option<ViewMode>,
    pub label: Option<Option<String>>,
    pub is_locked: Option<bool>,
}

impl ImagePatch {
    #[must_use]
    pub fn images(images: Vec<ImageItem>) -> Self {
        Self {
            images: Some(images),
            ..Self::default()
        }
    }

    fn apply(&self, data: &mut ImageData) {
        if let Some(images) = &self.images {
            data.images.clone_from(images);
        }
        if let Some(index) = self.current_index {
            data.current_index = index;
        }
        if let Some(mode) = self.view_mode {
            data.view_mode = mode;
        }
        if let Some(label) = &self.label {
            data.label.clone_from(label);
        }
        if let Some(locked) = self.is_locked {
            data.is_locked = locked;
        }
        data.clamp_index();
    }
}

/// Partial update of a model invocation payload.
///
/// Setting `is_loading` to true clears any error; setting an error clears
/// `is_loading`. When a patch does both, the error wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelPatch {
    pub model: Option<ModelId>,
    pub system_prompt: Option<Option<String>>,
    pub user_message: Option<Option<String>>,
    pub images: Option<Option<Vec<ImageItem>>>,
    pub output: Option<Option<String>>,
    pub is_loading: Option<bool>,
    pub error: Option<Option<String>>,
    pub label: Option<Option<String>>,
    pub is_locked: Option<bool>,
}

impl ModelPatch {
    #[must_use]
    pub fn model(model: ModelId) -> Self {
        Self {
            model: Some(model),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(Some(prompt.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn user_message(message: impl Into<String>) -> Self {
        Self {
            user_message: Some(Some(message.into())),
            ..Self::default()
        }
    }

    /// Marks the node as running.
    pub(crate) fn started() -> Self {
        Self {
            is_loading: Some(true),
            error: Some(None),
            ..Self::default()
        }
    }

    /// Records a successful run.
    pub(crate) fn succeeded(output: impl Into<String>) -> Self {
        Self {
            output: Some(Some(output.into())),
            is_loading: Some(false),
            error: Some(None),
            ..Self::default()
        }
    }

    /// Records a failed run. The previous output is kept.
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            is_loading: Some(false),
            error: Some(Some(message.into())),
            ..Self::default()
        }
    }

    fn apply(&self, data: &mut ModelData) {
        if let Some(model) = &self.model {
            data.model = model.clone();
        }
        if let Some(prompt) = &self.system_prompt {
            data.system_prompt.clone_from(prompt);
        }
        if let Some(message) = &self.user_message {
            data.user_message.clone_from(message);
        }
        if let Some(images) = &self.images {
            data.images.clone_from(images);
        }
        if let Some(output) = &self.output {
            data.output.clone_from(output);
        }
        if let Some(loading) = self.is_loading {
            data.is_loading = loading;
            if loading {
                data.error = None;
            }
        }
        if let Some(error) = &self.error {
            data.error.clone_from(error);
            if data.error.is_some() {
                data.is_loading = false;
            }
        }
        if let Some(label) = &self.label {
            data.label.clone_from(label);
        }
        if let Some(locked) = self.is_locked {
            data.is_locked = locked;
        }
    }
}

/// A partial payload for one node kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodePatch {
    Text(TextPatch),
    Image(ImagePatch),
    Model(ModelPatch),
}

impl NodePatch {
    /// Returns the kind this patch applies to.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Text(_) => NodeKind::Text,
            Self::Image(_) => NodeKind::Image,
            Self::Model(_) => NodeKind::Model,
        }
    }
}

impl From<TextPatch> for NodePatch {
    fn from(patch: TextPatch) -> Self {
        Self::Text(patch)
    }
}

impl From<ImagePatch> for NodePatch {
    fn from(patch: ImagePatch) -> Self {
        Self::Image(patch)
    }
}

impl From<ModelPatch> for NodePatch {
    fn from(patch: ModelPatch) -> Self {
        Self::Model(patch)
    }
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique identifier for this node within the graph.
    pub id: NodeId,
    /// Canvas position.
    pub position: Position,
    /// Kind-specific payload.
    pub data: NodeData,
    /// Rendering fields from the persisted record that the engine carries
    /// through untouched (size, selection flags and the like).
    pub extra: Map<String, JsonValue>,
}

impl Node {
    /// Creates a node of the given kind with a default payload and fresh id.
    #[must_use]
    pub fn new(kind: NodeKind, position: Position) -> Self {
        Self::with_data(
            NodeId::generate_with_prefix(kind.as_str()),
            position,
            NodeData::default_for(kind),
        )
    }

    /// Creates a node with an explicit id and payload.
    #[must_use]
    pub fn with_data(id: NodeId, position: Position, data: NodeData) -> Self {
        Self {
            id,
            position,
            data,
            extra: Map::new(),
        }
    }

    /// Returns the node's kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    /// Returns the model payload if this is a model node.
    #[must_use]
    pub fn model_data(&self) -> Option<&ModelData> {
        match &self.data {
            NodeData::Model(data) => Some(data),
            NodeData::Text(_) | NodeData::Image(_) => None,
        }
    }
}
