//! The orchestrator façade.
//!
//! Translates user turns into graph runs: decides whether a turn starts
//! fresh or resumes a paused run, forwards the event stream to the caller,
//! and mirrors user/assistant messages into the host history store. The end
//! of the event callback sequence is the caller's "done" signal, after
//! either a `complete` or an `error` event.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, instrument};

use crate::error::Result;
use crate::graph::{AgentEvent, AgentGraph};
use crate::history::{ChatRecord, HistoryStore};
use crate::state::Route;

/// The user-facing façade over one compiled graph.
pub struct Orchestrator {
    graph: Arc<AgentGraph>,
    history: Arc<dyn HistoryStore>,
}

impl Orchestrator {
    /// Create an orchestrator over a graph and a host history store.
    #[must_use]
    pub fn new(graph: Arc<AgentGraph>, history: Arc<dyn HistoryStore>) -> Self {
        Self { graph, history }
    }

    /// Liveness probe.
    #[must_use]
    pub const fn ping(&self) -> &'static str {
        "pong"
    }

    /// The host history store.
    #[must_use]
    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Run one user turn, forwarding every event to `on_event`.
    ///
    /// If the thread is mid-run (paused at approval, or a decision was just
    /// applied), this resumes the existing run with an empty delta instead
    /// of starting a new turn. Returns the final response when the run
    /// completed.
    #[instrument(skip(self, text, on_event))]
    pub async fn ask(
        &self,
        thread_id: &str,
        text: &str,
        on_event: impl FnMut(AgentEvent) + Send,
    ) -> Result<Option<String>> {
        self.history
            .append(thread_id, ChatRecord::user(text))
            .await?;

        let state = self.graph.state(thread_id).await?;
        let mid_run = state.awaiting_approval
            || (matches!(state.next, Some(Route::Node(_))) && state.final_response.is_none());

        let input = if mid_run {
            info!(thread = thread_id, "resuming paused run");
            None
        } else {
            Some(text.to_owned())
        };

        self.drive(thread_id, input, on_event).await
    }

    /// Execute the pending action for a paused thread. Must be followed by
    /// [`Self::resume_agent`] (or the next [`Self::ask`]) to drive the
    /// stream.
    pub async fn approve_action(&self, thread_id: &str) -> Result<()> {
        self.graph.approve(thread_id).await
    }

    /// Reject the pending action, recording an optional reason.
    pub async fn deny_action(&self, thread_id: &str, reason: Option<&str>) -> Result<()> {
        self.graph.deny(thread_id, reason).await
    }

    /// Resume a paused run with an empty delta.
    #[instrument(skip(self, on_event))]
    pub async fn resume_agent(
        &self,
        thread_id: &str,
        on_event: impl FnMut(AgentEvent) + Send,
    ) -> Result<Option<String>> {
        self.drive(thread_id, None, on_event).await
    }

    /// Destroy a thread: graph checkpoints and host history.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.graph.delete_thread(thread_id).await?;
        self.history.delete(thread_id).await
    }

    async fn drive(
        &self,
        thread_id: &str,
        input: Option<String>,
        mut on_event: impl FnMut(AgentEvent) + Send,
    ) -> Result<Option<String>> {
        let mut stream = Arc::clone(&self.graph).stream(thread_id, input);
        let mut final_response = None;

        while let Some(event) = stream.next().await {
            if let AgentEvent::Complete { response } = &event {
                final_response = Some(response.clone());
            }
            on_event(event);
        }

        if let Some(response) = &final_response {
            self.history
                .append(thread_id, ChatRecord::assistant(response))
                .await?;
        }
        Ok(final_response)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}
