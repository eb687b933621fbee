//! The multi-agent state graph.
//!
//! Nodes are the supervisor, one node per worker, and a no-op
//! `human_approval` interrupt marker. Edges are conditional on state: the
//! supervisor's out-edge follows its routing decision, a worker's out-edge
//! self-loops until the worker completes, hits its iteration ceiling, or
//! defers a sensitive call. In the deferred case the graph checkpoints and
//! yields control before the approval node runs (`interrupt_before`
//! semantics).
//!
//! Every node invocation commits a checkpoint plus its channel writes, so a
//! run can be resumed from its last committed state after a crash, a pause,
//! or a process restart.

pub mod events;

pub use events::{AgentEvent, EventStream, ToolCallInfo};

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, SharedCheckpointer,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::message::Message;
use crate::model::ModelSet;
use crate::prompts::WorkerDescriptor;
use crate::state::{CounterUpdate, GraphState, Route, StateUpdate};
use crate::supervisor::Supervisor;
use crate::worker::Worker;

/// Node name of the supervisor.
pub const SUPERVISOR_NODE: &str = "supervisor";

/// Node name of the human-approval interrupt marker.
pub const HUMAN_APPROVAL_NODE: &str = "human_approval";

/// Metadata source tag for the turn-start checkpoint.
const SOURCE_INPUT: &str = "input";
/// Metadata source tag for ordinary node checkpoints.
const SOURCE_LOOP: &str = "loop";
/// Metadata source tag for the checkpoint written at the approval pause.
const SOURCE_INTERRUPT: &str = "interrupt";
/// Metadata source tag for externally applied approve/deny writes.
const SOURCE_UPDATE: &str = "update";

/// Builder for [`AgentGraph`].
#[derive(Default)]
pub struct AgentGraphBuilder {
    workers: Vec<Worker>,
    models: Option<ModelSet>,
    checkpointer: Option<SharedCheckpointer>,
    config: EngineConfig,
}

impl AgentGraphBuilder {
    /// Add a worker node.
    #[must_use]
    pub fn worker(mut self, worker: Worker) -> Self {
        self.workers.push(worker);
        self
    }

    /// Add several worker nodes.
    #[must_use]
    pub fn workers(mut self, workers: impl IntoIterator<Item = Worker>) -> Self {
        self.workers.extend(workers);
        self
    }

    /// Set the model pair.
    #[must_use]
    pub fn models(mut self, models: ModelSet) -> Self {
        self.models = Some(models);
        self
    }

    /// Set the checkpoint store.
    #[must_use]
    pub fn checkpointer(mut self, checkpointer: SharedCheckpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Override the engine configuration.
    #[must_use]
    pub const fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Compile the graph.
    ///
    /// # Errors
    ///
    /// Fails when models or the checkpointer are missing, when no workers
    /// are registered, or when a worker name collides with a reserved node
    /// name or another worker.
    pub fn build(self) -> Result<AgentGraph> {
        let models = self
            .models
            .ok_or_else(|| EngineError::configuration("a model set is required"))?;
        let checkpointer = self
            .checkpointer
            .ok_or_else(|| EngineError::configuration("a checkpointer is required"))?;
        if self.workers.is_empty() {
            return Err(EngineError::configuration("at least one worker is required"));
        }

        let mut workers = HashMap::new();
        let mut roster = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            let name = worker.name().to_owned();
            if name == SUPERVISOR_NODE || name == HUMAN_APPROVAL_NODE {
                return Err(EngineError::configuration(format!(
                    "worker name '{name}' is reserved"
                )));
            }
            roster.push(WorkerDescriptor::new(&name, worker.description()));
            if workers.insert(name.clone(), Arc::new(worker)).is_some() {
                return Err(EngineError::configuration(format!(
                    "duplicate worker name '{name}'"
                )));
            }
        }

        let supervisor = Supervisor::new(Arc::clone(models.routing()), roster, self.config);

        Ok(AgentGraph {
            supervisor,
            workers,
            models,
            checkpointer,
            config: self.config,
        })
    }
}

/// The compiled graph: supervisor + workers + the approval interrupt, over a
/// durable checkpoint store.
pub struct AgentGraph {
    supervisor: Supervisor,
    workers: HashMap<String, Arc<Worker>>,
    models: ModelSet,
    checkpointer: SharedCheckpointer,
    config: EngineConfig,
}

impl AgentGraph {
    /// Create a graph builder.
    #[must_use]
    pub fn builder() -> AgentGraphBuilder {
        AgentGraphBuilder::default()
    }

    /// Current state of a thread, default for a thread never run.
    pub async fn state(&self, thread_id: &str) -> Result<GraphState> {
        let tuple = self
            .checkpointer
            .get_tuple(&CheckpointConfig::thread(thread_id))
            .await?;
        Ok(tuple.map(|t| t.checkpoint.state).unwrap_or_default())
    }

    /// Destroy a thread: purge all of its checkpoints and writes.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.checkpointer.delete_thread(thread_id).await
    }

    /// Execute the stored pending action after user approval and commit
    /// `{messages: [tool_result], pending_action: null, awaiting_approval:
    /// false}`. Must be followed by a resume to drive the stream.
    pub async fn approve(&self, thread_id: &str) -> Result<()> {
        let loaded = self.load(thread_id).await?;
        let (mut state, config, step) = loaded;

        let action = state
            .pending_action
            .clone()
            .ok_or_else(|| EngineError::graph("no pending action to approve"))?;
        let worker_name = state
            .current_worker
            .clone()
            .ok_or_else(|| EngineError::graph("no worker owns the pending action"))?;
        let worker = self
            .workers
            .get(&worker_name)
            .ok_or_else(|| EngineError::graph(format!("unknown worker '{worker_name}'")))?;

        info!(thread = thread_id, tool = %action.tool_name, "executing approved action");
        let result = worker.execute_pending(&action).await;

        let update = StateUpdate::new()
            .message(result)
            .pending_action(None)
            .awaiting_approval(false);
        state.apply(update.clone());
        self.commit(&config, state, SOURCE_UPDATE, step, HUMAN_APPROVAL_NODE, &update)
            .await?;
        Ok(())
    }

    /// Reject the stored pending action: append a synthetic user denial and
    /// clear the approval channels. Must be followed by a resume.
    pub async fn deny(&self, thread_id: &str, reason: Option<&str>) -> Result<()> {
        let loaded = self.load(thread_id).await?;
        let (mut state, config, step) = loaded;

        if state.pending_action.is_none() {
            return Err(EngineError::graph("no pending action to deny"));
        }

        let denial = match reason {
            Some(reason) => format!("Action denied by user: {reason}"),
            None => "Action denied by user".to_owned(),
        };
        info!(thread = thread_id, "pending action denied");

        let update = StateUpdate::new()
            .message(Message::user(denial))
            .pending_action(None)
            .awaiting_approval(false);
        state.apply(update.clone());
        self.commit(&config, state, SOURCE_UPDATE, step, HUMAN_APPROVAL_NODE, &update)
            .await?;
        Ok(())
    }

    /// Run the graph for one turn (or resume a paused one) and stream
    /// semantic events.
    ///
    /// `input` of `Some` starts a new turn by appending a user message and
    /// resetting the per-turn counters; `None` resumes from the last
    /// committed checkpoint. Resuming while still awaiting a decision only
    /// re-emits `approval_required`.
    pub fn stream(self: Arc<Self>, thread_id: &str, input: Option<String>) -> EventStream {
        let graph = self;
        let thread_id = thread_id.to_owned();

        Box::pin(stream! {
            let (mut state, mut config, mut step) = match graph.load(&thread_id).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    yield AgentEvent::Error { message: e.to_string() };
                    return;
                }
            };

            if let Some(text) = input {
                // Turn start: append the user message and reset per-turn
                // channels. A stale approval pause is abandoned so the new
                // turn starts from the supervisor.
                let update = StateUpdate::new()
                    .message(Message::user(text))
                    .iteration_count(CounterUpdate::Set(0))
                    .worker_iteration_count(CounterUpdate::Set(0))
                    .task_complete(false)
                    .final_response(None)
                    .error(None)
                    .next(None)
                    .pending_action(None)
                    .awaiting_approval(false);
                state.apply(update.clone());
                match graph.commit(&config, state.clone(), SOURCE_INPUT, step, "input", &update).await {
                    Ok(next_config) => config = next_config,
                    Err(e) => {
                        yield AgentEvent::Error { message: e.to_string() };
                        return;
                    }
                }
                step += 1;
            } else if state.awaiting_approval {
                // Resume without a decision: idempotent re-emission.
                match state.pending_action.clone() {
                    Some(action) => {
                        debug!(thread = %thread_id, "still awaiting approval");
                        yield AgentEvent::ApprovalRequired { action };
                    }
                    None => {
                        yield AgentEvent::Error {
                            message: "awaiting approval with no pending action".to_owned(),
                        };
                    }
                }
                return;
            } else {
                // A decision was applied; run the no-op approval node body
                // and continue at the supervisor.
                let update = StateUpdate::new().awaiting_approval(false);
                state.apply(update.clone());
                match graph.commit(&config, state.clone(), SOURCE_LOOP, step, HUMAN_APPROVAL_NODE, &update).await {
                    Ok(next_config) => config = next_config,
                    Err(e) => {
                        yield AgentEvent::Error { message: e.to_string() };
                        return;
                    }
                }
                step += 1;
            }

            let mut current = SUPERVISOR_NODE.to_owned();
            let mut transitions = 0u32;

            loop {
                transitions += 1;
                if transitions > graph.config.recursion_limit {
                    warn!(thread = %thread_id, limit = graph.config.recursion_limit, "recursion limit hit");
                    yield AgentEvent::Error {
                        message: format!(
                            "recursion limit of {} exceeded",
                            graph.config.recursion_limit
                        ),
                    };
                    return;
                }

                if current == SUPERVISOR_NODE {
                    let update = graph.supervisor.decide(&state).await;
                    state.apply(update.clone());
                    match graph.commit(&config, state.clone(), SOURCE_LOOP, step, SUPERVISOR_NODE, &update).await {
                        Ok(next_config) => config = next_config,
                        Err(e) => {
                            yield AgentEvent::Error { message: e.to_string() };
                            return;
                        }
                    }
                    step += 1;

                    match state.next.clone() {
                        Some(Route::Node(name)) => {
                            yield AgentEvent::Routing { next: name.clone() };
                            current = name;
                        }
                        Some(Route::End) | None => {
                            let response = state
                                .final_response
                                .clone()
                                .unwrap_or_else(|| "Task completed.".to_owned());
                            // The answer joins the transcript so later turns
                            // see it; the supervisor itself never writes
                            // messages.
                            let update = StateUpdate::new()
                                .message(Message::assistant(response.clone()));
                            state.apply(update.clone());
                            if let Err(e) = graph
                                .commit(&config, state.clone(), SOURCE_LOOP, step, "end", &update)
                                .await
                            {
                                yield AgentEvent::Error { message: e.to_string() };
                                return;
                            }
                            info!(thread = %thread_id, "run complete");
                            yield AgentEvent::Complete { response };
                            return;
                        }
                    }
                    continue;
                }

                let Some(worker) = graph.workers.get(&current).map(Arc::clone) else {
                    yield AgentEvent::Error {
                        message: format!("routing decision named unknown node '{current}'"),
                    };
                    return;
                };

                yield AgentEvent::WorkerStarted {
                    worker: current.clone(),
                };
                let worker_step = worker.step(&state, &graph.models).await;
                state.apply(worker_step.update.clone());

                // The checkpoint written here is the pause point when the
                // step deferred a sensitive call.
                let source = if state.awaiting_approval {
                    SOURCE_INTERRUPT
                } else {
                    SOURCE_LOOP
                };
                match graph.commit(&config, state.clone(), source, step, &current, &worker_step.update).await {
                    Ok(next_config) => config = next_config,
                    Err(e) => {
                        yield AgentEvent::Error { message: e.to_string() };
                        return;
                    }
                }
                step += 1;

                for event in worker_step.events {
                    yield event;
                }

                // Worker out-edge.
                if state.awaiting_approval {
                    match state.pending_action.clone() {
                        Some(action) => {
                            info!(thread = %thread_id, tool = %action.tool_name, "paused for approval");
                            yield AgentEvent::ApprovalRequired { action };
                        }
                        None => {
                            yield AgentEvent::Error {
                                message: "awaiting approval with no pending action".to_owned(),
                            };
                        }
                    }
                    return;
                }
                if state.task_complete
                    || state.worker_iteration_count >= graph.config.max_worker_iterations
                {
                    current = SUPERVISOR_NODE.to_owned();
                }
                // Otherwise self-loop: the model must see its tool results.
            }
        })
    }

    async fn load(&self, thread_id: &str) -> Result<(GraphState, CheckpointConfig, i64)> {
        let config = CheckpointConfig::thread(thread_id);
        let tuple = self.checkpointer.get_tuple(&config).await?;
        Ok(match tuple {
            Some(tuple) => (
                tuple.checkpoint.state,
                tuple.config,
                tuple.metadata.step + 1,
            ),
            None => (GraphState::default(), config, 0),
        })
    }

    async fn commit(
        &self,
        config: &CheckpointConfig,
        state: GraphState,
        source: &str,
        step: i64,
        node: &str,
        update: &StateUpdate,
    ) -> Result<CheckpointConfig> {
        let checkpoint = Checkpoint::snapshot(state);
        let metadata = CheckpointMetadata::new(source, step, node);
        let next_config = self.checkpointer.put(config, checkpoint, metadata).await?;

        let writes = update.to_writes()?;
        if !writes.is_empty() {
            let task_id = Uuid::new_v4().to_string();
            self.checkpointer
                .put_writes(&next_config, writes, &task_id)
                .await?;
        }
        Ok(next_config)
    }
}

impl std::fmt::Debug for AgentGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentGraph")
            .field("workers", &self.workers.keys().collect::<Vec<_>>())
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}
