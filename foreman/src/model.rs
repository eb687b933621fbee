//! The language-model boundary.
//!
//! Concrete providers live outside the engine; the graph only needs the
//! [`LanguageModel`] trait. A [`ModelSet`] pairs the cloud routing-class
//! model with a local summarization-class model so that privacy-sensitive
//! workers can keep their context on the machine.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::message::Message;

/// Response from a model generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated assistant message.
    pub message: Message,
}

impl ModelResponse {
    /// Create a new model response.
    #[must_use]
    pub const fn new(message: Message) -> Self {
        Self { message }
    }
}

/// Options for model generation requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Tool definitions offered to the model, in function-calling format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    /// JSON schema the response must conform to (structured output).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    /// Temperature for sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    /// Create new default generate options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set available tools for function calling.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Require the response to conform to a JSON schema.
    #[must_use]
    pub fn with_response_format(mut self, schema: Value) -> Self {
        self.response_format = Some(schema);
        self
    }

    /// Set temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Set max tokens.
    #[must_use]
    pub const fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

/// Stream of response text fragments, reserved for future token streaming.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<String, EngineError>> + Send>>;

/// The core trait for language model implementations.
///
/// Providers are injected at construction so tests can script responses;
/// the engine never reads API keys or endpoints from the environment.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Get the model identifier (e.g. `"gpt-4o"`, `"llama3.2"`).
    fn model_id(&self) -> &str;

    /// Generate a response for the given messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails or the response cannot
    /// be parsed.
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> Result<ModelResponse, EngineError>;

    /// Check if the model supports tool/function calling.
    fn supports_tool_calling(&self) -> bool {
        true
    }
}

/// A shared, type-erased language model.
pub type SharedModel = Arc<dyn LanguageModel>;

/// Which of the configured models a worker invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBinding {
    /// The cloud routing-class model.
    Routing,
    /// The local summarization-class model, for privacy-sensitive workers.
    Local,
}

/// The pair of models the engine runs against.
#[derive(Clone)]
pub struct ModelSet {
    routing: SharedModel,
    local: SharedModel,
}

impl ModelSet {
    /// Create a model set from a routing and a local model.
    #[must_use]
    pub fn new(routing: SharedModel, local: SharedModel) -> Self {
        Self { routing, local }
    }

    /// Create a model set that uses one model for both bindings.
    #[must_use]
    pub fn uniform(model: SharedModel) -> Self {
        Self {
            routing: Arc::clone(&model),
            local: model,
        }
    }

    /// Resolve a binding to its model.
    #[must_use]
    pub fn resolve(&self, binding: ModelBinding) -> &SharedModel {
        match binding {
            ModelBinding::Routing => &self.routing,
            ModelBinding::Local => &self.local,
        }
    }

    /// The routing-class model.
    #[must_use]
    pub fn routing(&self) -> &SharedModel {
        &self.routing
    }
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSet")
            .field("routing", &self.routing.model_id())
            .field("local", &self.local.model_id())
            .finish()
    }
}
