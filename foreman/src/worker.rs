//! Worker step execution.
//!
//! A worker is static configuration: a name, a description for the
//! supervisor's prompt, a system prompt, a tool registry and a model
//! binding. One step invokes the bound model over the transcript and then
//! walks the returned tool calls in order: safe and moderate calls execute
//! inline, the first sensitive call becomes the thread's
//! [`PendingAction`] with an `"[Awaiting user approval]"` placeholder, and
//! every call after it receives a queued placeholder so the id-matching
//! invariant holds.

use serde_json::Value;
use tracing::{debug, warn};

use crate::graph::events::{AgentEvent, ToolCallInfo};
use crate::message::{Message, ToolCall, generate_call_id};
use crate::model::{GenerateOptions, ModelBinding, ModelSet};
use crate::state::{CounterUpdate, GraphState, PendingAction, StateUpdate};
use crate::tool::{ToolRegistry, describe_action};

/// Placeholder answering the deferred sensitive call.
pub const AWAITING_APPROVAL_PLACEHOLDER: &str = "[Awaiting user approval]";

/// Placeholder answering calls queued behind the deferred one. The model
/// re-issues them on its next step if still needed; the engine never does.
pub const QUEUED_PLACEHOLDER: &str = "[Queued — previous action awaiting approval]";

/// Character budget for each argument and result in a task summary.
const SUMMARY_SNIPPET_LEN: usize = 40;

/// One capability-scoped tool executor.
pub struct Worker {
    name: String,
    description: String,
    system_prompt: String,
    registry: ToolRegistry,
    binding: ModelBinding,
}

/// Result of one worker step: the state delta plus the events it produced.
#[derive(Debug)]
pub struct WorkerStep {
    /// Channel writes for this step.
    pub update: StateUpdate,
    /// `tool_call`/`tool_result` events, in emission order.
    pub events: Vec<AgentEvent>,
}

impl Worker {
    /// Create a worker from its static configuration.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        registry: ToolRegistry,
        binding: ModelBinding,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            registry,
            binding,
        }
    }

    /// The worker's node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The worker's description, used in the supervisor's prompt.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The worker's tool registry.
    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one worker step over the current state.
    pub async fn step(&self, state: &GraphState, models: &ModelSet) -> WorkerStep {
        let base = StateUpdate::new().worker_iteration_count(CounterUpdate::Increment);

        let mut input = Vec::with_capacity(state.messages.len() + 1);
        input.push(Message::system(&self.system_prompt));
        input.extend(state.messages.iter().cloned());
        let options = GenerateOptions::new().with_tools(self.registry.definitions());

        let model = models.resolve(self.binding);
        let mut assistant = match model.generate(input, options).await {
            Ok(response) => response.message,
            Err(e) => {
                warn!(worker = %self.name, error = %e, "worker model call failed");
                // The error channel forces the supervisor to terminate.
                return WorkerStep {
                    update: base
                        .error(Some(format!("model call failed: {e}")))
                        .task_complete(true),
                    events: Vec::new(),
                };
            }
        };

        ensure_call_ids(&mut assistant);

        let Some(tool_calls) = assistant.tool_calls.clone().filter(|c| !c.is_empty()) else {
            debug!(worker = %self.name, "no tool calls, step complete");
            return WorkerStep {
                update: base
                    .message(assistant)
                    .task_complete(true)
                    .task_summary(format!("[{}] Processed request", self.name)),
                events: Vec::new(),
            };
        };

        self.process_tool_calls(base, assistant, &tool_calls).await
    }

    /// Walk the tool calls of one assistant message in order.
    async fn process_tool_calls(
        &self,
        base: StateUpdate,
        assistant: Message,
        tool_calls: &[ToolCall],
    ) -> WorkerStep {
        let mut events = vec![AgentEvent::ToolCall {
            tools: tool_calls
                .iter()
                .map(|tc| ToolCallInfo {
                    name: tc.name.clone(),
                    args: tc.arguments.clone(),
                })
                .collect(),
        }];

        let mut update = base.message(assistant);
        let mut pending: Option<PendingAction> = None;
        let mut summary_parts = Vec::with_capacity(tool_calls.len());

        for tc in tool_calls {
            // Once a sensitive call is deferred, nothing later in this
            // message executes; every remaining call gets a placeholder so
            // each call id still resolves to exactly one tool-result.
            if pending.is_some() {
                update = update.message(Message::tool_result(&tc.id, QUEUED_PLACEHOLDER));
                summary_parts.push(format!("{}(queued)", tc.name));
                continue;
            }

            match self.registry.classify(&tc.name, &tc.arguments) {
                Ok(level) if level.requires_approval() => {
                    debug!(worker = %self.name, tool = %tc.name, "deferring sensitive call");
                    pending = Some(PendingAction {
                        id: tc.id.clone(),
                        worker_name: self.name.clone(),
                        tool_name: tc.name.clone(),
                        tool_args: tc.arguments.clone(),
                        description: describe_action(&tc.name, &tc.arguments),
                    });
                    update =
                        update.message(Message::tool_result(&tc.id, AWAITING_APPROVAL_PLACEHOLDER));
                    summary_parts.push(format!(
                        "{}({}) awaiting approval",
                        tc.name,
                        summarize_args(&tc.arguments)
                    ));
                }
                Ok(_) => {
                    let result = self.invoke(&tc.name, tc.arguments.clone()).await;
                    events.push(AgentEvent::ToolResult {
                        result: result.clone(),
                    });
                    summary_parts.push(format!(
                        "{}({}) → {}",
                        tc.name,
                        summarize_args(&tc.arguments),
                        truncate_chars(&result, SUMMARY_SNIPPET_LEN)
                    ));
                    update = update.message(Message::tool_result(&tc.id, result));
                }
                Err(e) => {
                    // Blocked patterns and malformed arguments surface as
                    // error tool-results, not as crashes.
                    let result = format!("Error: {e}");
                    events.push(AgentEvent::ToolResult {
                        result: result.clone(),
                    });
                    summary_parts.push(format!("{}: {result}", tc.name));
                    update = update.message(Message::tool_result(&tc.id, result));
                }
            }
        }

        update = update
            .task_complete(false)
            .task_summary(format!("[{}] {}", self.name, summary_parts.join("; ")));

        if let Some(action) = pending {
            update = update
                .pending_action(Some(action))
                .awaiting_approval(true);
        }

        WorkerStep { update, events }
    }

    /// Invoke one tool, rendering the outcome as tool-result text.
    async fn invoke(&self, name: &str, args: Value) -> String {
        match self.registry.call(name, args).await {
            Ok(value) => value_to_text(&value),
            Err(e) => {
                warn!(worker = %self.name, tool = %name, error = %e, "tool invocation failed");
                format!("Error: {e}")
            }
        }
    }

    /// Execute a stored pending action after approval, returning the
    /// tool-result that replaces the `"[Awaiting user approval]"`
    /// placeholder (same `tool_call_id`).
    pub async fn execute_pending(&self, action: &PendingAction) -> Message {
        debug!(worker = %self.name, tool = %action.tool_name, "executing approved action");
        let text = self.invoke(&action.tool_name, action.tool_args.clone()).await;
        Message::tool_result(&action.id, text)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("binding", &self.binding)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Backfill ids on tool calls whose provider omitted them.
fn ensure_call_ids(message: &mut Message) {
    if let Some(calls) = &mut message.tool_calls {
        for tc in calls {
            if tc.id.is_empty() {
                tc.id = generate_call_id();
            }
        }
    }
}

/// Render a tool's JSON output as tool-result text.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Compress tool arguments to their first two entries for a task summary.
fn summarize_args(args: &Value) -> String {
    match args {
        Value::Object(map) => map
            .iter()
            .take(2)
            .map(|(k, v)| format!("{k}={}", truncate_chars(&value_to_text(v), SUMMARY_SNIPPET_LEN)))
            .collect::<Vec<_>>()
            .join(", "),
        other => truncate_chars(&value_to_text(other), SUMMARY_SNIPPET_LEN),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_owned()
    } else {
        let prefix: String = text.chars().take(max).collect();
        format!("{prefix}…")
    }
}
