//! Engine configuration.

/// Tunable ceilings and budgets for a graph run.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Maximum supervisor passes per turn before a forced END.
    pub max_iterations: u32,
    /// Maximum worker self-loops before a forced return to the supervisor.
    pub max_worker_iterations: u32,
    /// How many transcript messages the supervisor sees.
    pub max_messages_for_supervisor: usize,
    /// Tool-result length (characters) above which the supervisor's view is
    /// truncated. The stored transcript is never modified.
    pub max_tool_output_length: usize,
    /// Hard ceiling on node transitions per stream call, as defense in depth
    /// against mis-configured edges.
    pub recursion_limit: u32,
}

impl EngineConfig {
    /// Default maximum supervisor passes per turn.
    pub const DEFAULT_MAX_ITERATIONS: u32 = 15;
    /// Default maximum worker self-loops.
    pub const DEFAULT_MAX_WORKER_ITERATIONS: u32 = 5;
    /// Default supervisor context window, in messages.
    pub const DEFAULT_MAX_MESSAGES_FOR_SUPERVISOR: usize = 20;
    /// Default tool-result truncation threshold, in characters.
    pub const DEFAULT_MAX_TOOL_OUTPUT_LENGTH: usize = 500;
    /// Default recursion ceiling.
    pub const DEFAULT_RECURSION_LIMIT: u32 = 50;

    /// Create a config with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            max_worker_iterations: Self::DEFAULT_MAX_WORKER_ITERATIONS,
            max_messages_for_supervisor: Self::DEFAULT_MAX_MESSAGES_FOR_SUPERVISOR,
            max_tool_output_length: Self::DEFAULT_MAX_TOOL_OUTPUT_LENGTH,
            recursion_limit: Self::DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
