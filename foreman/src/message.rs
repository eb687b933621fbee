//! Message types for the conversation transcript.
//!
//! The transcript is the authoritative input to both the supervisor and the
//! workers, following chat completion API conventions: assistant messages may
//! carry tool calls, and every tool call id must be answered by exactly one
//! tool-result message before the next model invocation on that thread.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message providing instructions.
    System,
    /// User message.
    User,
    /// Assistant (model) message, possibly carrying tool calls.
    Assistant,
    /// Tool-result message answering a tool call.
    Tool,
}

impl MessageRole {
    /// Get the string representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool call made by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for the tool call. Generated when the provider
    /// omitted one, so that a matching tool-result can always be attached.
    pub id: String,
    /// Name of the tool.
    pub name: String,
    /// Arguments to pass to the tool.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a tool call with a freshly generated id.
    #[must_use]
    pub fn with_generated_id(name: impl Into<String>, arguments: Value) -> Self {
        Self::new(generate_call_id(), name, arguments)
    }

    /// Parse arguments as a typed value.
    ///
    /// Handles both string-encoded and structured JSON arguments, as
    /// providers differ on which they emit.
    pub fn parse_arguments<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        match &self.arguments {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        }
    }
}

/// Generate a fresh tool-call id.
#[must_use]
pub fn generate_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// A message in the conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id. The transcript reducer replaces on equal ids
    /// instead of appending, so re-delivery is idempotent.
    pub id: String,
    /// Role of the message sender.
    pub role: MessageRole,
    /// Text content of the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls made by the model (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// The tool call this message answers (tool-result messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: MessageRole, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, Some(content.into()))
    }

    /// Create a new user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, Some(content.into()))
    }

    /// Create a new assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, Some(content.into()))
    }

    /// Create a new assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_with_tool_calls(
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        let mut msg = Self::new(MessageRole::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// Create a new tool-result message answering `tool_call_id`.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageRole::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Get the text content, empty if absent.
    #[must_use]
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Check if this message carries tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Check if this is a tool-result message.
    #[must_use]
    pub const fn is_tool_result(&self) -> bool {
        matches!(self.role, MessageRole::Tool)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_roles() {
        assert_eq!(Message::system("s").role, MessageRole::System);
        assert_eq!(Message::user("u").role, MessageRole::User);
        assert_eq!(Message::assistant("a").role, MessageRole::Assistant);
        assert_eq!(Message::tool_result("c1", "r").role, MessageRole::Tool);
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = Message::tool_result("call_42", "done");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_42"));
        assert!(msg.is_tool_result());
    }

    #[test]
    fn assistant_with_tool_calls_has_tool_calls() {
        let tc = ToolCall::new("c1", "read_file", serde_json::json!({"path": "/tmp/a"}));
        let msg = Message::assistant_with_tool_calls(None, vec![tc]);
        assert!(msg.has_tool_calls());
        assert!(msg.content.is_none());
    }

    #[test]
    fn empty_tool_calls_is_not_has_tool_calls() {
        let msg = Message::assistant_with_tool_calls(Some("hi".into()), vec![]);
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(Message::user("a").id, Message::user("a").id);
    }

    #[test]
    fn generated_call_ids_have_prefix() {
        let id = generate_call_id();
        assert!(id.starts_with("call_"));
        assert_ne!(id, generate_call_id());
    }

    #[test]
    fn parse_arguments_handles_string_and_object() {
        #[derive(Deserialize)]
        struct Args {
            path: String,
        }

        let structured = ToolCall::new("c1", "t", serde_json::json!({"path": "/a"}));
        assert_eq!(structured.parse_arguments::<Args>().unwrap().path, "/a");

        let stringly = ToolCall::new("c2", "t", Value::String(r#"{"path":"/b"}"#.into()));
        assert_eq!(stringly.parse_arguments::<Args>().unwrap().path, "/b");
    }

    #[test]
    fn serde_roundtrip() {
        let msg = Message::assistant_with_tool_calls(
            Some("thinking".into()),
            vec![ToolCall::new("c1", "list_directory", serde_json::json!({"path": "/"}))],
        );
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
