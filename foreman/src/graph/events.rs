//! Events emitted by [`super::AgentGraph::stream`].

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::PendingAction;

/// One named tool invocation, as surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallInfo {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub args: Value,
}

/// Semantic events emitted during a graph run.
///
/// These are the UI's only window into a run: no sub-token output, just the
/// milestones a chat surface renders (routing, tool activity, the approval
/// pause, completion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum AgentEvent {
    /// A worker node was entered.
    WorkerStarted {
        /// The worker's name.
        worker: String,
    },

    /// The supervisor chose a non-END next node.
    Routing {
        /// The chosen node.
        next: String,
    },

    /// The assistant message contained tool calls.
    ToolCall {
        /// All calls in the message, in order.
        tools: Vec<ToolCallInfo>,
    },

    /// A tool-result message was appended after execution.
    ToolResult {
        /// The textual result.
        result: String,
    },

    /// The graph paused at human approval.
    ApprovalRequired {
        /// The deferred action awaiting a decision.
        action: PendingAction,
    },

    /// END was reached with a final response.
    Complete {
        /// The user-visible answer.
        response: String,
    },

    /// An error was caught in the top-level stream body.
    Error {
        /// Sanitized description.
        message: String,
    },

    /// Reserved for future token streaming.
    Token {
        /// The token text.
        token: String,
    },
}

/// Type alias for the boxed stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;
