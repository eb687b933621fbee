//! The supervisor: a structured-output routing decision over current state.
//!
//! The supervisor is a deterministic function of state: it short-circuits on
//! the iteration ceiling and on a recorded error, otherwise builds a pruned
//! context window and asks the routing model for a [`SupervisorDecision`].
//! It never mutates the transcript; its update only writes routing channels
//! and the per-turn counters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::message::Message;
use crate::model::{GenerateOptions, SharedModel};
use crate::prompts::{SUPERVISOR_DIRECTIVE, WorkerDescriptor, supervisor_prompt};
use crate::state::{CounterUpdate, GraphState, Route, StateUpdate};

/// The routing value that maps to END.
pub const FINISH: &str = "FINISH";

/// Fixed explanation used when the iteration ceiling forces an END.
pub const MAX_STEPS_MESSAGE: &str =
    "I reached the maximum number of steps for this task and stopped. \
     The work done so far is reflected above.";

/// Generic user-safe message for structured-output and model failures.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Something went wrong while deciding the next step. Please try again.";

/// Default final response when the model FINISHes without one.
pub const DEFAULT_FINAL_RESPONSE: &str = "Task completed.";

/// The structured output the routing model must produce.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SupervisorDecision {
    /// Why this routing decision was made.
    pub reasoning: String,
    /// A worker name, or `FINISH`.
    pub next: String,
    /// Terminal answer for the user; only meaningful with `FINISH`.
    #[serde(default)]
    pub final_response: Option<String>,
}

/// The supervisor node.
pub struct Supervisor {
    model: SharedModel,
    roster: Vec<WorkerDescriptor>,
    config: EngineConfig,
}

impl Supervisor {
    /// Create a supervisor over the given worker roster.
    #[must_use]
    pub fn new(model: SharedModel, roster: Vec<WorkerDescriptor>, config: EngineConfig) -> Self {
        Self {
            model,
            roster,
            config,
        }
    }

    /// The JSON schema enforced on the routing model's output.
    #[must_use]
    pub fn decision_schema() -> Value {
        serde_json::to_value(schemars::schema_for!(SupervisorDecision))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    /// Run one supervisor pass and return its state update.
    ///
    /// Failures never propagate; they map to an END decision with a
    /// user-safe message, per the error policy.
    pub async fn decide(&self, state: &GraphState) -> StateUpdate {
        // Counter bookkeeping happens on every pass, including terminal ones.
        let base = StateUpdate::new()
            .iteration_count(CounterUpdate::Increment)
            .worker_iteration_count(CounterUpdate::Set(0))
            .task_complete(false);

        if state.iteration_count >= self.config.max_iterations {
            warn!(
                iterations = state.iteration_count,
                "iteration ceiling reached, forcing END"
            );
            return Self::finish(base, MAX_STEPS_MESSAGE.to_owned());
        }

        if let Some(error) = &state.error {
            warn!(%error, "terminating run after node error");
            return Self::finish(base, format!("The task stopped due to an error: {error}"));
        }

        let context = self.build_context(state);
        let options = GenerateOptions::new().with_response_format(Self::decision_schema());

        let response = match self.model.generate(context, options).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "routing model call failed");
                return Self::finish(base, GENERIC_FAILURE_MESSAGE.to_owned());
            }
        };

        let Some(decision) = parse_decision(response.message.text()) else {
            warn!("routing model returned unparseable structured output");
            return Self::finish(base, GENERIC_FAILURE_MESSAGE.to_owned());
        };
        debug!(next = %decision.next, reasoning = %decision.reasoning, "supervisor decided");

        if decision.next == FINISH {
            let response = decision
                .final_response
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FINAL_RESPONSE.to_owned());
            return Self::finish(base, response);
        }

        if self.roster.iter().any(|w| w.name == decision.next) {
            return base
                .next(Some(Route::node(decision.next.clone())))
                .final_response(None)
                .current_worker(Some(decision.next));
        }

        warn!(next = %decision.next, "routing model chose an unknown worker");
        Self::finish(base, GENERIC_FAILURE_MESSAGE.to_owned())
    }

    fn finish(base: StateUpdate, response: String) -> StateUpdate {
        base.next(Some(Route::End))
            .final_response(Some(response))
            .current_worker(None)
    }

    /// Assemble the supervisor's pruned context window.
    ///
    /// System prompt, then the task summary as a synthetic user message,
    /// then the last `max_messages_for_supervisor` non-system messages with
    /// oversized tool-results truncated (view only; the stored transcript is
    /// untouched), then the trailing directive.
    pub(crate) fn build_context(&self, state: &GraphState) -> Vec<Message> {
        let mut context = vec![Message::system(supervisor_prompt(&self.roster))];

        if let Some(summary) = &state.task_summary {
            context.push(Message::user(format!(
                "Summary of the last worker step: {summary}"
            )));
        }

        let visible = state.non_system_messages();
        let start = visible
            .len()
            .saturating_sub(self.config.max_messages_for_supervisor);
        for msg in &visible[start..] {
            context.push(self.truncated_view(msg));
        }

        context.push(Message::user(SUPERVISOR_DIRECTIVE));
        context
    }

    fn truncated_view(&self, msg: &Message) -> Message {
        if msg.is_tool_result() {
            if let Some(content) = &msg.content {
                if content.chars().count() > self.config.max_tool_output_length {
                    let prefix: String = content
                        .chars()
                        .take(self.config.max_tool_output_length)
                        .collect();
                    let mut view = msg.clone();
                    view.content = Some(format!("{prefix}… [truncated]"));
                    return view;
                }
            }
        }
        msg.clone()
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("model", &self.model.model_id())
            .field("roster", &self.roster.iter().map(|w| &w.name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Parse a [`SupervisorDecision`] from raw model text.
///
/// Tries the whole payload first, then the first balanced JSON object, for
/// providers that wrap structured output in prose or fences.
fn parse_decision(text: &str) -> Option<SupervisorDecision> {
    let trimmed = text.trim();
    if let Ok(decision) = serde_json::from_str(trimmed) {
        return Some(decision);
    }

    let start = trimmed.find('{')?;
    let mut depth = 0usize;
    let mut end = None;
    for (i, c) in trimmed[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    serde_json::from_str(&trimmed[start..end?]).ok()
}
