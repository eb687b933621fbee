//! End-to-end tests for the graph: routing, tool execution, the approval
//! pause, iteration ceilings, context pruning and durability.

#![allow(clippy::unwrap_used, clippy::panic, clippy::clone_on_ref_ptr)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use assert_fs::TempDir;
use assert_fs::prelude::*;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use foreman::checkpoint::{CheckpointConfig, Checkpointer, InMemoryCheckpointer, ListOptions};
use foreman::graph::AgentGraph;
use foreman::history::InMemoryHistory;
use foreman::message::{Message, MessageRole, ToolCall};
use foreman::model::{GenerateOptions, LanguageModel, ModelBinding, ModelResponse, ModelSet};
use foreman::orchestrator::Orchestrator;
use foreman::prompts::SUPERVISOR_DIRECTIVE;
use foreman::tool::{Sensitivity, Tool, ToolRegistry};
use foreman::tools::{ListDirectoryTool, WriteFileTool};
use foreman::worker::{AWAITING_APPROVAL_PLACEHOLDER, Worker};
use foreman::{AgentEvent, EngineError, ToolError};

/// Model stub replaying a fixed script of assistant messages, recording
/// every input it receives.
struct ScriptedModel {
    script: Mutex<VecDeque<Message>>,
    inputs: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    fn new(script: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn push(&self, message: Message) {
        self.script.lock().unwrap().push_back(message);
    }

    /// Inputs of calls whose context ended with the supervisor directive.
    fn supervisor_inputs(&self) -> Vec<Vec<Message>> {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .filter(|input| input.last().is_some_and(|m| m.text() == SUPERVISOR_DIRECTIVE))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        messages: Vec<Message>,
        _options: GenerateOptions,
    ) -> Result<ModelResponse, EngineError> {
        self.inputs.lock().unwrap().push(messages);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .map(ModelResponse::new)
            .ok_or_else(|| EngineError::model("script exhausted"))
    }
}

fn route(worker: &str) -> Message {
    Message::assistant(format!(
        r#"{{"reasoning": "needs {worker}", "next": "{worker}"}}"#
    ))
}

fn finish(response: &str) -> Message {
    Message::assistant(format!(
        r#"{{"reasoning": "done", "next": "FINISH", "final_response": "{response}"}}"#
    ))
}

fn tool_call_msg(id: &str, name: &str, args: Value) -> Message {
    Message::assistant_with_tool_calls(None, vec![ToolCall::new(id, name, args)])
}

fn filesystem_worker() -> Worker {
    let mut registry = ToolRegistry::new();
    registry.add(ListDirectoryTool, Sensitivity::Safe);
    registry.add(WriteFileTool, Sensitivity::Sensitive);
    Worker::new(
        "filesystem",
        "Lists, reads and writes files.",
        "You are a filesystem assistant.",
        registry,
        ModelBinding::Routing,
    )
}

fn build(script: Vec<Message>, workers: Vec<Worker>) -> (Arc<AgentGraph>, Arc<ScriptedModel>) {
    build_with(script, workers, Arc::new(InMemoryCheckpointer::new()))
}

fn build_with(
    script: Vec<Message>,
    workers: Vec<Worker>,
    checkpointer: Arc<dyn Checkpointer>,
) -> (Arc<AgentGraph>, Arc<ScriptedModel>) {
    let model = ScriptedModel::new(script);
    let graph = AgentGraph::builder()
        .models(ModelSet::uniform(model.clone()))
        .checkpointer(checkpointer)
        .workers(workers)
        .build()
        .unwrap();
    (Arc::new(graph), model)
}

async fn collect(graph: &Arc<AgentGraph>, thread: &str, input: Option<&str>) -> Vec<AgentEvent> {
    let mut stream = graph.clone().stream(thread, input.map(str::to_owned));
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

fn event_names(events: &[AgentEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match e {
            AgentEvent::WorkerStarted { .. } => "worker_started",
            AgentEvent::Routing { .. } => "routing",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::ApprovalRequired { .. } => "approval_required",
            AgentEvent::Complete { .. } => "complete",
            AgentEvent::Error { .. } => "error",
            _ => "other",
        })
        .collect()
}

// ── Scenario 1: direct answer ───────────────────────────────────────────────

#[tokio::test]
async fn direct_answer_finishes_without_tools() {
    let (graph, _) = build(vec![finish("Hello.")], vec![filesystem_worker()]);

    let events = collect(&graph, "t1", Some("hi")).await;
    assert_eq!(event_names(&events), ["complete"]);
    let AgentEvent::Complete { response } = &events[0] else {
        panic!("expected complete");
    };
    assert_eq!(response, "Hello.");

    let state = graph.state("t1").await.unwrap();
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0].role, MessageRole::User);
    assert_eq!(state.messages[1].role, MessageRole::Assistant);
    assert_eq!(state.messages[1].text(), "Hello.");
    assert!(state.current_worker.is_none());
}

// ── Scenario 2: safe tool call ──────────────────────────────────────────────

#[tokio::test]
async fn safe_listing_executes_inline() {
    let dir = TempDir::new().unwrap();
    dir.child("a.txt").write_str("x").unwrap();
    dir.child("b.txt").write_str("y").unwrap();
    let path = dir.path().to_string_lossy().into_owned();

    let (graph, _) = build(
        vec![
            route("filesystem"),
            tool_call_msg("c1", "list_directory", serde_json::json!({"path": path})),
            Message::assistant("The directory has two files."),
            finish("Your Downloads folder holds a.txt and b.txt."),
        ],
        vec![filesystem_worker()],
    );

    let events = collect(&graph, "t2", Some("List my downloads")).await;
    assert_eq!(
        event_names(&events),
        [
            "routing",
            "worker_started",
            "tool_call",
            "tool_result",
            "worker_started",
            "complete",
        ]
    );

    let AgentEvent::ToolResult { result } = &events[3] else {
        panic!("expected tool result");
    };
    assert!(result.contains("a.txt"));
    assert!(result.contains("b.txt"));

    let state = graph.state("t2").await.unwrap();
    assert!(!state.awaiting_approval);
    assert!(state.pending_action.is_none());
    // The final self-loop step refreshed the summary; the keep-on-absent
    // reducer held the tool summary until then.
    assert_eq!(
        state.task_summary.as_deref(),
        Some("[filesystem] Processed request")
    );
}

// ── Scenario 3: sensitive write with approval ───────────────────────────────

#[tokio::test]
async fn sensitive_write_pauses_then_approval_executes() {
    let dir = TempDir::new().unwrap();
    let note = dir.path().join("note.txt");
    let note_path = note.to_string_lossy().into_owned();

    let (graph, model) = build(
        vec![
            route("filesystem"),
            tool_call_msg(
                "c1",
                "write_file",
                serde_json::json!({"path": note_path, "content": "hello"}),
            ),
        ],
        vec![filesystem_worker()],
    );

    let events = collect(&graph, "t3", Some("Create note.txt saying hello")).await;
    assert_eq!(
        event_names(&events),
        ["routing", "worker_started", "tool_call", "approval_required"]
    );
    let AgentEvent::ApprovalRequired { action } = events.last().unwrap() else {
        panic!("expected approval_required");
    };
    assert_eq!(action.tool_name, "write_file");
    assert_eq!(action.worker_name, "filesystem");
    assert!(action.description.contains(&note_path));

    // Paused: nothing written yet, placeholder holds the call id.
    assert!(!note.exists());
    let paused = graph.state("t3").await.unwrap();
    assert!(paused.awaiting_approval);
    assert_eq!(paused.current_worker.as_deref(), Some("filesystem"));
    let placeholder = paused
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c1"))
        .unwrap();
    assert_eq!(placeholder.text(), AWAITING_APPROVAL_PLACEHOLDER);

    // Approve: the real write happens and the placeholder is replaced.
    graph.approve("t3").await.unwrap();
    let approved = graph.state("t3").await.unwrap();
    assert!(!approved.awaiting_approval);
    assert!(approved.pending_action.is_none());
    let result = approved
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c1"))
        .unwrap();
    assert!(result.text().starts_with("Wrote 5 bytes"));
    assert_eq!(std::fs::read_to_string(&note).unwrap(), "hello");

    // Every assistant tool-call id resolves to exactly one tool-result.
    let call_ids: Vec<&str> = approved
        .messages
        .iter()
        .filter_map(|m| m.tool_calls.as_ref())
        .flatten()
        .map(|tc| tc.id.as_str())
        .collect();
    for id in call_ids {
        let matching = approved
            .messages
            .iter()
            .filter(|m| m.is_tool_result() && m.tool_call_id.as_deref() == Some(id))
            .count();
        assert_eq!(matching, 1, "call {id} resolved {matching} times");
    }

    // Resume runs to completion.
    model.push(finish("Created note.txt with your message."));
    let events = collect(&graph, "t3", None).await;
    assert_eq!(event_names(&events), ["complete"]);
}

// ── Scenario 4: sensitive write with denial ─────────────────────────────────

#[tokio::test]
async fn denied_write_never_executes() {
    let dir = TempDir::new().unwrap();
    let note = dir.path().join("note.txt");
    let note_path = note.to_string_lossy().into_owned();

    let (graph, model) = build(
        vec![
            route("filesystem"),
            tool_call_msg(
                "c1",
                "write_file",
                serde_json::json!({"path": note_path, "content": "hello"}),
            ),
        ],
        vec![filesystem_worker()],
    );

    collect(&graph, "t4", Some("Create note.txt")).await;
    graph.deny("t4", Some("not now")).await.unwrap();

    let state = graph.state("t4").await.unwrap();
    assert!(!state.awaiting_approval);
    assert!(state.pending_action.is_none());
    let denial = state.messages.last().unwrap();
    assert_eq!(denial.role, MessageRole::User);
    assert_eq!(denial.text(), "Action denied by user: not now");

    model.push(finish("Understood, I won't create the file."));
    let events = collect(&graph, "t4", None).await;
    assert_eq!(event_names(&events), ["complete"]);
    assert!(!note.exists());
}

// ── Scenario 5: forced return to supervisor on self-loop ceiling ────────────

struct PokeTool;

#[derive(Deserialize)]
struct PokeArgs {}

#[async_trait]
impl Tool for PokeTool {
    const NAME: &'static str = "poke";
    type Args = PokeArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Pokes.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok("poked".to_owned())
    }
}

#[tokio::test]
async fn worker_self_loop_is_bounded() {
    let mut registry = ToolRegistry::new();
    registry.add(PokeTool, Sensitivity::Safe);
    let poker = Worker::new(
        "poker",
        "Pokes forever.",
        "Poke.",
        registry,
        ModelBinding::Routing,
    );

    // The worker emits a tool call every step, so it never completes on its
    // own; the edge must force it back after five iterations.
    let mut script = vec![route("poker")];
    for i in 0..5 {
        script.push(tool_call_msg(
            &format!("c{i}"),
            "poke",
            serde_json::json!({}),
        ));
    }
    script.push(finish("Enough poking."));

    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let (graph, _) = build_with(script, vec![poker], checkpointer.clone());

    let events = collect(&graph, "t5", Some("poke away")).await;
    let starts = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::WorkerStarted { .. }))
        .count();
    assert_eq!(starts, 5);
    assert!(matches!(events.last(), Some(AgentEvent::Complete { .. })));

    // Observed counter sequence across checkpoints: 1..5 in the worker,
    // reset to 0 on supervisor entry.
    let tuples = checkpointer
        .list(&CheckpointConfig::thread("t5"), ListOptions::new())
        .await
        .unwrap();
    let mut by_step: Vec<(i64, String, u32)> = tuples
        .iter()
        .map(|t| {
            (
                t.metadata.step,
                t.metadata.node.clone(),
                t.checkpoint.state.worker_iteration_count,
            )
        })
        .collect();
    by_step.sort_by_key(|(step, _, _)| *step);

    let worker_counts: Vec<u32> = by_step
        .iter()
        .filter(|(_, node, _)| node == "poker")
        .map(|(_, _, count)| *count)
        .collect();
    assert_eq!(worker_counts, [1, 2, 3, 4, 5]);

    let after_supervisor = by_step
        .iter()
        .rev()
        .find(|(_, node, _)| node == "supervisor")
        .unwrap();
    assert_eq!(after_supervisor.2, 0);
}

// ── Scenario 6: context pruning ─────────────────────────────────────────────

struct FloodTool;

#[derive(Deserialize)]
struct FloodArgs {}

#[async_trait]
impl Tool for FloodTool {
    const NAME: &'static str = "flood";
    type Args = FloodArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Produces a lot of output.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok("x".repeat(800))
    }
}

#[tokio::test]
async fn supervisor_sees_pruned_and_truncated_context() {
    let mut registry = ToolRegistry::new();
    registry.add(FloodTool, Sensitivity::Safe);
    let dumper = Worker::new(
        "dumper",
        "Dumps output.",
        "Dump.",
        registry,
        ModelBinding::Routing,
    );

    // Sixteen direct-answer turns to grow the transcript past the window,
    // then a tool turn producing an oversized result.
    let mut script = Vec::new();
    for i in 0..16 {
        script.push(finish(&format!("answer {i}")));
    }
    script.push(route("dumper"));
    script.push(tool_call_msg("c1", "flood", serde_json::json!({})));
    script.push(Message::assistant("flooded"));
    script.push(finish("done"));

    let (graph, model) = build(script, vec![dumper]);
    for i in 0..16 {
        collect(&graph, "t6", Some(&format!("turn {i}"))).await;
    }
    collect(&graph, "t6", Some("flood me")).await;

    let supervisor_inputs = model.supervisor_inputs();

    // Pruning: one system message, at most 20 pruned messages, the
    // trailing directive.
    let sixteenth = &supervisor_inputs[15];
    assert_eq!(sixteenth.len(), 22);
    assert_eq!(sixteenth[0].role, MessageRole::System);
    assert_eq!(sixteenth.last().unwrap().text(), SUPERVISOR_DIRECTIVE);
    assert!(
        sixteenth
            .iter()
            .skip(1)
            .all(|m| m.role != MessageRole::System)
    );

    // Truncation: the oversized tool result is cut in the supervisor's view
    // only.
    let last = supervisor_inputs.last().unwrap();
    let view = last.iter().find(|m| m.is_tool_result()).unwrap();
    assert!(view.text().ends_with("… [truncated]"));
    assert!(view.text().chars().count() < 600);

    let state = graph.state("t6").await.unwrap();
    let stored = state
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c1"))
        .unwrap();
    assert_eq!(stored.text().len(), 800);
}

// ── Laws ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resume_while_paused_only_re_emits_approval() {
    let (graph, _) = build(
        vec![
            route("filesystem"),
            tool_call_msg(
                "c1",
                "write_file",
                serde_json::json!({"path": "/tmp/foreman-law1.txt", "content": "x"}),
            ),
        ],
        vec![filesystem_worker()],
    );

    collect(&graph, "law1", Some("write it")).await;
    let before = graph.state("law1").await.unwrap();

    for _ in 0..2 {
        let events = collect(&graph, "law1", None).await;
        assert_eq!(event_names(&events), ["approval_required"]);
    }

    let after = graph.state("law1").await.unwrap();
    assert_eq!(after.messages, before.messages);
    assert_eq!(after.pending_action, before.pending_action);
    assert!(after.awaiting_approval);
}

#[tokio::test]
async fn approved_execution_equals_inline_execution() {
    let dir = TempDir::new().unwrap();
    let inline_path = dir.path().join("inline.txt").to_string_lossy().into_owned();
    let paused_path = dir.path().join("paused.txt").to_string_lossy().into_owned();

    // Inline: the same tool registered as safe.
    let mut safe_registry = ToolRegistry::new();
    safe_registry.add(WriteFileTool, Sensitivity::Safe);
    let inline_worker = Worker::new(
        "scribe",
        "writes",
        "Write.",
        safe_registry,
        ModelBinding::Routing,
    );
    let (inline_graph, _) = build(
        vec![
            route("scribe"),
            tool_call_msg(
                "c1",
                "write_file",
                serde_json::json!({"path": inline_path, "content": "hello"}),
            ),
            Message::assistant("done"),
            finish("ok"),
        ],
        vec![inline_worker],
    );
    collect(&inline_graph, "eq-inline", Some("write")).await;
    let inline_state = inline_graph.state("eq-inline").await.unwrap();
    let inline_result = inline_state
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c1"))
        .unwrap()
        .text()
        .to_owned();

    // Paused then approved: the standard sensitive path.
    let (paused_graph, _) = build(
        vec![
            route("filesystem"),
            tool_call_msg(
                "c1",
                "write_file",
                serde_json::json!({"path": paused_path, "content": "hello"}),
            ),
        ],
        vec![filesystem_worker()],
    );
    collect(&paused_graph, "eq-paused", Some("write")).await;
    paused_graph.approve("eq-paused").await.unwrap();
    let paused_state = paused_graph.state("eq-paused").await.unwrap();
    let paused_result = paused_state
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c1"))
        .unwrap()
        .text()
        .to_owned();

    // Same tool, same inputs: same result shape and same side effect.
    assert_eq!(inline_result.replace(&inline_path, "<path>"),
               paused_result.replace(&paused_path, "<path>"));
    assert_eq!(std::fs::read_to_string(&inline_path).unwrap(), "hello");
    assert_eq!(std::fs::read_to_string(&paused_path).unwrap(), "hello");
}

#[tokio::test]
async fn denial_then_retry_routes_the_same_way() {
    let (graph, model) = build(
        vec![
            route("filesystem"),
            tool_call_msg(
                "c1",
                "write_file",
                serde_json::json!({"path": "/tmp/foreman-law3.txt", "content": "x"}),
            ),
        ],
        vec![filesystem_worker()],
    );

    collect(&graph, "law3", Some("Create the file")).await;
    graph.deny("law3", None).await.unwrap();
    model.push(finish("Okay, skipping it."));
    collect(&graph, "law3", None).await;

    // Same prompt, unchanged context: the router picks the same worker.
    model.push(route("filesystem"));
    model.push(tool_call_msg(
        "c2",
        "write_file",
        serde_json::json!({"path": "/tmp/foreman-law3.txt", "content": "x"}),
    ));
    let events = collect(&graph, "law3", Some("Create the file")).await;
    assert!(matches!(
        &events[0],
        AgentEvent::Routing { next } if next == "filesystem"
    ));
    assert!(matches!(
        events.last(),
        Some(AgentEvent::ApprovalRequired { .. })
    ));
}

// ── Orchestrator-driven approval round trip ─────────────────────────────────

#[tokio::test]
async fn orchestrator_ask_approve_resume_round_trip() {
    let dir = TempDir::new().unwrap();
    let note_path = dir.path().join("note.txt").to_string_lossy().into_owned();

    let (graph, model) = build(
        vec![
            route("filesystem"),
            tool_call_msg(
                "c1",
                "write_file",
                serde_json::json!({"path": note_path, "content": "hello"}),
            ),
        ],
        vec![filesystem_worker()],
    );
    let orch = Orchestrator::new(graph, Arc::new(InMemoryHistory::new()));

    let mut events = Vec::new();
    let response = orch
        .ask("t7", "Create note.txt", |e| events.push(e))
        .await
        .unwrap();
    assert!(response.is_none());
    assert!(matches!(
        events.last(),
        Some(AgentEvent::ApprovalRequired { .. })
    ));

    orch.approve_action("t7").await.unwrap();
    model.push(finish("Created it."));

    let mut resume_events = Vec::new();
    let response = orch
        .resume_agent("t7", |e| resume_events.push(e))
        .await
        .unwrap();
    assert_eq!(response.as_deref(), Some("Created it."));

    // Both sides of the turn reached the host history.
    let records = orch.history().load("t7").await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].content, "Created it.");
}

// ── Durability across process restarts ──────────────────────────────────────

#[tokio::test]
async fn paused_thread_survives_restart() {
    use foreman::checkpoint::SqliteCheckpointer;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("graph.db");
    let note_path = dir.path().join("note.txt").to_string_lossy().into_owned();

    let script = vec![
        route("filesystem"),
        tool_call_msg(
            "c1",
            "write_file",
            serde_json::json!({"path": note_path, "content": "hello"}),
        ),
    ];

    let paused_state = {
        let checkpointer = Arc::new(SqliteCheckpointer::open(&db_path).unwrap());
        let (graph, _) = build_with(script, vec![filesystem_worker()], checkpointer);
        collect(&graph, "t8", Some("Create note.txt")).await;
        graph.state("t8").await.unwrap()
    };
    assert!(paused_state.awaiting_approval);

    // A fresh process: new graph over the same database resumes the pause.
    let checkpointer = Arc::new(SqliteCheckpointer::open(&db_path).unwrap());
    let (graph, model) = build_with(Vec::new(), vec![filesystem_worker()], checkpointer);

    let reloaded = graph.state("t8").await.unwrap();
    assert_eq!(reloaded, paused_state);

    graph.approve("t8").await.unwrap();
    model.push(finish("Created after restart."));
    let events = collect(&graph, "t8", None).await;
    assert_eq!(event_names(&events), ["complete"]);
}
