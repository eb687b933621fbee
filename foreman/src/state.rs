//! Graph state: typed channels and their reducers.
//!
//! The graph's state is a record of named channels. Nodes never mutate the
//! state directly; they return a [`StateUpdate`] in which every channel is
//! optional, and [`GraphState::apply`] folds the update in channel by
//! channel. The default reducer is replace; `messages` appends with id-based
//! replacement, and the two counters support an increment update so nodes
//! can bump them without reading the current value first.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// The END sentinel used in serialized routing decisions.
pub const END_SENTINEL: &str = "__end__";

/// A routing target: a named node or the END of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Route {
    /// Terminate the run.
    End,
    /// Continue at the named node.
    Node(String),
}

impl Route {
    /// Create a route to a named node.
    #[must_use]
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    /// Check whether this route terminates the run.
    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// The node name, if this routes to a node.
    #[must_use]
    pub fn node_name(&self) -> Option<&str> {
        match self {
            Self::Node(name) => Some(name),
            Self::End => None,
        }
    }
}

impl From<String> for Route {
    fn from(s: String) -> Self {
        if s == END_SENTINEL {
            Self::End
        } else {
            Self::Node(s)
        }
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        match route {
            Route::End => END_SENTINEL.to_owned(),
            Route::Node(name) => name,
        }
    }
}

/// The single deferred sensitive tool invocation awaiting human approval.
///
/// Sensitivity is `Sensitive` by construction; only sensitive calls are ever
/// deferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Id of the originating tool call. The eventual tool-result must carry
    /// the same id so the placeholder can be replaced.
    pub id: String,
    /// Name of the worker that owns the deferred call.
    pub worker_name: String,
    /// Name of the tool to invoke on approval.
    pub tool_name: String,
    /// Arguments stored verbatim from the original call.
    pub tool_args: Value,
    /// Short human-legible sentence for the approval UI. Purely
    /// presentational; `tool_name`/`tool_args` are authoritative.
    pub description: String,
}

/// Update to a counter channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterUpdate {
    /// Bump the counter by one.
    Increment,
    /// Replace the counter.
    Set(u32),
}

/// The full graph state for one thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    /// Full conversation transcript.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Worker currently holding the floor, including across a HITL pause.
    #[serde(default)]
    pub current_worker: Option<String>,
    /// The supervisor's routing decision, consumed by the outgoing edge.
    #[serde(default)]
    pub next: Option<Route>,
    /// The single deferred sensitive tool invocation, if any.
    #[serde(default)]
    pub pending_action: Option<PendingAction>,
    /// True iff the graph is paused at the human-approval node.
    #[serde(default)]
    pub awaiting_approval: bool,
    /// Terminal user-visible answer, set by the supervisor on FINISH.
    #[serde(default)]
    pub final_response: Option<String>,
    /// Set by any node to force the supervisor to terminate.
    #[serde(default)]
    pub error: Option<String>,
    /// Total supervisor passes this turn.
    #[serde(default)]
    pub iteration_count: u32,
    /// Self-loops of the active worker; reset on supervisor entry.
    #[serde(default)]
    pub worker_iteration_count: u32,
    /// Worker signal: no more tool calls from me this step.
    #[serde(default)]
    pub task_complete: bool,
    /// Compressed trace of the worker's last invocation.
    #[serde(default)]
    pub task_summary: Option<String>,
}

impl GraphState {
    /// Fold a [`StateUpdate`] into this state, channel by channel.
    pub fn apply(&mut self, update: StateUpdate) {
        for msg in update.messages {
            self.merge_message(msg);
        }
        if let Some(v) = update.current_worker {
            self.current_worker = v;
        }
        if let Some(v) = update.next {
            self.next = v;
        }
        if let Some(v) = update.pending_action {
            self.pending_action = v;
        }
        if let Some(v) = update.awaiting_approval {
            self.awaiting_approval = v;
        }
        if let Some(v) = update.final_response {
            self.final_response = v;
        }
        if let Some(v) = update.error {
            self.error = v;
        }
        if let Some(v) = update.iteration_count {
            Self::apply_counter(&mut self.iteration_count, v);
        }
        if let Some(v) = update.worker_iteration_count {
            Self::apply_counter(&mut self.worker_iteration_count, v);
        }
        if let Some(v) = update.task_complete {
            self.task_complete = v;
        }
        // `next ?? current`: an absent update keeps the previous summary.
        if let Some(v) = update.task_summary {
            self.task_summary = Some(v);
        }
    }

    const fn apply_counter(counter: &mut u32, update: CounterUpdate) {
        match update {
            CounterUpdate::Increment => *counter += 1,
            CounterUpdate::Set(n) => *counter = n,
        }
    }

    /// Append a message, replacing in place when it resolves an existing
    /// placeholder (same `tool_call_id`) or re-delivers an existing id.
    fn merge_message(&mut self, msg: Message) {
        if msg.is_tool_result() {
            if let Some(call_id) = msg.tool_call_id.as_deref() {
                if let Some(existing) = self.messages.iter_mut().find(|m| {
                    m.is_tool_result() && m.tool_call_id.as_deref() == Some(call_id)
                }) {
                    *existing = msg;
                    return;
                }
            }
        }
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == msg.id) {
            *existing = msg;
            return;
        }
        self.messages.push(msg);
    }

    /// Messages excluding system messages, in transcript order.
    #[must_use]
    pub fn non_system_messages(&self) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.role != crate::message::MessageRole::System)
            .collect()
    }
}

/// A partial state produced by one node invocation.
///
/// Absent channels leave the previous value untouched. Built with the
/// builder methods so call sites read as a list of channel writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Messages to append (or replace by id).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    /// Write to `current_worker`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_worker: Option<Option<String>>,
    /// Write to `next`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Option<Route>>,
    /// Write to `pending_action`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<Option<PendingAction>>,
    /// Write to `awaiting_approval`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting_approval: Option<bool>,
    /// Write to `final_response`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<Option<String>>,
    /// Write to `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Option<String>>,
    /// Write to `iteration_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_count: Option<CounterUpdate>,
    /// Write to `worker_iteration_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_iteration_count: Option<CounterUpdate>,
    /// Write to `task_complete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_complete: Option<bool>,
    /// Write to `task_summary`. There is deliberately no way to clear the
    /// summary; workers only ever refresh it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_summary: Option<String>,
}

impl StateUpdate {
    /// Create an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    #[must_use]
    pub fn message(mut self, msg: Message) -> Self {
        self.messages.push(msg);
        self
    }

    /// Append several messages.
    #[must_use]
    pub fn with_messages(mut self, msgs: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(msgs);
        self
    }

    /// Write `current_worker`.
    #[must_use]
    pub fn current_worker(mut self, worker: Option<String>) -> Self {
        self.current_worker = Some(worker);
        self
    }

    /// Write `next`.
    #[must_use]
    pub fn next(mut self, route: Option<Route>) -> Self {
        self.next = Some(route);
        self
    }

    /// Write `pending_action`.
    #[must_use]
    pub fn pending_action(mut self, action: Option<PendingAction>) -> Self {
        self.pending_action = Some(action);
        self
    }

    /// Write `awaiting_approval`.
    #[must_use]
    pub const fn awaiting_approval(mut self, awaiting: bool) -> Self {
        self.awaiting_approval = Some(awaiting);
        self
    }

    /// Write `final_response`.
    #[must_use]
    pub fn final_response(mut self, response: Option<String>) -> Self {
        self.final_response = Some(response);
        self
    }

    /// Write `error`.
    #[must_use]
    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    /// Write `iteration_count`.
    #[must_use]
    pub const fn iteration_count(mut self, update: CounterUpdate) -> Self {
        self.iteration_count = Some(update);
        self
    }

    /// Write `worker_iteration_count`.
    #[must_use]
    pub const fn worker_iteration_count(mut self, update: CounterUpdate) -> Self {
        self.worker_iteration_count = Some(update);
        self
    }

    /// Write `task_complete`.
    #[must_use]
    pub const fn task_complete(mut self, complete: bool) -> Self {
        self.task_complete = Some(complete);
        self
    }

    /// Write `task_summary`.
    #[must_use]
    pub fn task_summary(mut self, summary: impl Into<String>) -> Self {
        self.task_summary = Some(summary.into());
        self
    }

    /// Serialize the present channels as `(channel, value)` pairs for the
    /// checkpointer's pending-writes table.
    pub fn to_writes(&self) -> Result<Vec<(String, Value)>, serde_json::Error> {
        let mut writes = Vec::new();
        if !self.messages.is_empty() {
            writes.push(("messages".to_owned(), serde_json::to_value(&self.messages)?));
        }
        macro_rules! push_channel {
            ($field:ident) => {
                if let Some(v) = &self.$field {
                    writes.push((stringify!($field).to_owned(), serde_json::to_value(v)?));
                }
            };
        }
        push_channel!(current_worker);
        push_channel!(next);
        push_channel!(pending_action);
        push_channel!(awaiting_approval);
        push_channel!(final_response);
        push_channel!(error);
        push_channel!(iteration_count);
        push_channel!(worker_iteration_count);
        push_channel!(task_complete);
        push_channel!(task_summary);
        Ok(writes)
    }
}
