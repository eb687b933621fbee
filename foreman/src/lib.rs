#![cfg_attr(docsrs, feature(doc_cfg))]
//! Foreman is a supervised multi-agent orchestration engine: a supervisor
//! routes each step of a conversation to capability-scoped tool workers,
//! sensitive tool invocations pause for human approval, and every
//! intermediate state is checkpointed to SQLite so a thread survives
//! crashes and can be resumed mid-approval.
//!
//! The core pieces:
//!
//! - [`state`]: the channel-based graph state and its reducers
//! - [`supervisor`]: the structured-output routing decision
//! - [`worker`]: the worker step protocol with the sensitivity split
//! - [`graph`]: node composition, conditional edges, iteration ceilings,
//!   the approval interrupt and the event stream
//! - [`checkpoint`]: durable snapshots over SQLite
//! - [`orchestrator`]: the user-turn façade over one compiled graph

// Core state machine
pub mod config;
pub mod graph;
pub mod state;
pub mod supervisor;
pub mod worker;
pub mod workers;

// Persistence
pub mod checkpoint;
pub mod history;

// Model and tool boundaries
pub mod message;
pub mod model;
pub mod prompts;
pub mod shell;
pub mod tool;
pub mod tools;

// Façade and support
pub mod error;
pub mod orchestrator;

// Re-export the types most embedders need.
pub use config::EngineConfig;
pub use error::{EngineError, Result, ToolError};
pub use graph::{AgentEvent, AgentGraph, EventStream};
pub use message::{Message, MessageRole, ToolCall};
pub use model::{GenerateOptions, LanguageModel, ModelBinding, ModelResponse, ModelSet};
pub use orchestrator::Orchestrator;
pub use state::{GraphState, PendingAction, Route, StateUpdate};
pub use tool::{Sensitivity, Tool, ToolRegistry};
pub use worker::Worker;
