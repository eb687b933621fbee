//! Tool trait, registry and sensitivity classification.
//!
//! Tools are the only way workers touch the world. Each registered tool
//! carries a [`Sensitivity`]: `safe` and `moderate` invocations execute
//! inline during a worker step, while `sensitive` invocations are deferred
//! into a [`crate::state::PendingAction`] and wait for human approval.
//! Unknown tool names classify as sensitive (default-deny).

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::shell::CommandClassifier;

/// Definition of a tool for LLM function calling.
///
/// Serializes to the function-calling wire format:
/// `{"type": "function", "function": {"name", "description", "parameters"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool (snake_case).
    pub name: String,
    /// Description of what the tool does, for the model.
    pub description: String,
    /// JSON schema for the tool's parameters.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

impl Serialize for ToolDefinition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut function = serde_json::Map::new();
        function.insert("name".to_owned(), Value::String(self.name.clone()));
        function.insert(
            "description".to_owned(),
            Value::String(self.description.clone()),
        );
        function.insert("parameters".to_owned(), self.parameters.clone());

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry("function", &function)?;
        map.end()
    }
}

/// The core trait for all tools that workers can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static name of the tool.
    const NAME: &'static str;

    /// Arguments type for the tool.
    type Args: for<'de> Deserialize<'de> + Send;

    /// Output type of the tool.
    type Output: Serialize + Send;

    /// Error type for tool execution.
    type Error: Into<ToolError> + Send;

    /// Get the name of the tool.
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// Get the JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error>;

    /// Get the tool definition for LLM function calling.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }

    /// Call the tool with JSON arguments and return JSON output.
    async fn call_json(&self, args: Value) -> Result<Value, ToolError>
    where
        Self::Output: 'static,
    {
        // Providers differ on whether arguments arrive as a string or object.
        let typed_args: Self::Args = match &args {
            Value::String(s) => {
                serde_json::from_str(s).map_err(|e| ToolError::InvalidArguments(e.to_string()))?
            }
            _ => serde_json::from_value(args)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?,
        };

        let result = self.call(typed_args).await.map_err(Into::into)?;
        serde_json::to_value(result).map_err(|e| ToolError::Execution(e.to_string()))
    }
}

/// A boxed dynamic tool that can be stored in collections.
pub type BoxedTool = Box<dyn DynTool>;

/// Object-safe version of the [`Tool`] trait for dynamic dispatch.
#[async_trait]
pub trait DynTool: Send + Sync {
    /// Get the name of the tool.
    fn name(&self) -> &str;

    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Call the tool with JSON arguments.
    async fn call_json(&self, args: Value) -> Result<Value, ToolError>;
}

#[async_trait]
impl<T: Tool + 'static> DynTool for T
where
    T::Output: 'static,
{
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn definition(&self) -> ToolDefinition {
        Tool::definition(self)
    }

    async fn call_json(&self, args: Value) -> Result<Value, ToolError> {
        Tool::call_json(self, args).await
    }
}

/// How risky a tool invocation is, and therefore whether it executes inline
/// or pauses for human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Read-only inspection of state; executes inline.
    Safe,
    /// Mutates nothing the user would miss; executes inline.
    Moderate,
    /// Mutating or high-risk; requires human approval before execution.
    Sensitive,
}

impl Sensitivity {
    /// Check whether this level requires human approval.
    #[must_use]
    pub const fn requires_approval(&self) -> bool {
        matches!(self, Self::Sensitive)
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Safe => "safe",
            Self::Moderate => "moderate",
            Self::Sensitive => "sensitive",
        };
        f.write_str(s)
    }
}

/// How a tool's sensitivity is determined at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SensitivityPolicy {
    /// Same level for every invocation.
    Fixed(Sensitivity),
    /// Delegate to the shell command classifier over `args.command`.
    Command,
}

/// A collection of tools available to one worker, with the sensitivity map
/// used to split inline execution from HITL deferral.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, BoxedTool>,
    policies: HashMap<String, SensitivityPolicy>,
    classifier: CommandClassifier,
}

impl ToolRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with a fixed sensitivity.
    pub fn add<T: Tool + 'static>(&mut self, tool: T, sensitivity: Sensitivity)
    where
        T::Output: 'static,
    {
        let name = Tool::name(&tool).to_owned();
        self.tools.insert(name.clone(), Box::new(tool));
        self.policies
            .insert(name, SensitivityPolicy::Fixed(sensitivity));
    }

    /// Register a shell tool whose sensitivity is decided per command by the
    /// [`CommandClassifier`].
    pub fn add_command_tool<T: Tool + 'static>(&mut self, tool: T)
    where
        T::Output: 'static,
    {
        let name = Tool::name(&tool).to_owned();
        self.tools.insert(name.clone(), Box::new(tool));
        self.policies.insert(name, SensitivityPolicy::Command);
    }

    /// Get a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.get(name)
    }

    /// Check if the registry contains a tool with the given name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All tool definitions, serialized to the function-calling format.
    #[must_use]
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .values()
            .filter_map(|t| serde_json::to_value(t.definition()).ok())
            .collect()
    }

    /// Classify one invocation.
    ///
    /// Unknown tools are sensitive (default-deny). Shell invocations run
    /// through the command classifier, which may reject the command outright
    /// with [`ToolError::Blocked`].
    pub fn classify(&self, name: &str, args: &Value) -> Result<Sensitivity, ToolError> {
        match self.policies.get(name) {
            Some(SensitivityPolicy::Fixed(level)) => Ok(*level),
            Some(SensitivityPolicy::Command) => {
                let command = args
                    .get("command")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ToolError::InvalidArguments("missing 'command' argument".to_owned())
                    })?;
                self.classifier.classify(command)
            }
            None => Ok(Sensitivity::Sensitive),
        }
    }

    /// Invoke a tool by name with JSON arguments.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_owned()))?;
        tool.call_json(args).await
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Derive the short human-legible sentence shown on an approval card.
///
/// Purely presentational; the stored tool name and arguments stay
/// authoritative.
#[must_use]
pub fn describe_action(tool_name: &str, args: &Value) -> String {
    let str_arg = |key: &str| args.get(key).and_then(Value::as_str).unwrap_or("?");
    match tool_name {
        "write_file" => format!("Write to file: {}", str_arg("path")),
        "delete_file" => format!("Delete file: {}", str_arg("path")),
        "create_directory" => format!("Create directory: {}", str_arg("path")),
        "execute_command" => format!("Execute shell command: {}", str_arg("command")),
        _ => format!(
            "Run {tool_name} with arguments: {}",
            serde_json::to_string(args).unwrap_or_else(|_| args.to_string())
        ),
    }
}
