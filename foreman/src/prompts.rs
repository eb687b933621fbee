//! System prompts for the supervisor and the stock workers.

/// Describes one worker to the supervisor.
#[derive(Debug, Clone)]
pub struct WorkerDescriptor {
    /// Node name the supervisor routes to.
    pub name: String,
    /// What the worker is for, one sentence.
    pub description: String,
}

impl WorkerDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Build the supervisor's system prompt from the worker roster.
#[must_use]
pub fn supervisor_prompt(roster: &[WorkerDescriptor]) -> String {
    let mut prompt = String::from(
        "You are a supervisor coordinating a team of workers on the user's machine. \
         At each step you either route the task to one worker or FINISH with a final \
         answer for the user.\n\nWorkers:\n",
    );
    for worker in roster {
        prompt.push_str(&format!("- {}: {}\n", worker.name, worker.description));
    }
    prompt.push_str(&format!(
        "\nHost platform: {}. User home directory: {}.\n\
         Route to a worker only when its capabilities are needed. When the task is \
         done, or needs no tools at all, respond with FINISH and a finalResponse the \
         user will read.",
        std::env::consts::OS,
        home_dir().unwrap_or_else(|| "unknown".to_owned()),
    ));
    prompt
}

/// The trailing directive appended to the supervisor's context window.
pub const SUPERVISOR_DIRECTIVE: &str =
    "Given the conversation above, decide the next action: route to a worker, or FINISH.";

/// System prompt for the filesystem worker.
pub const FILESYSTEM_WORKER_PROMPT: &str = "You are a filesystem assistant. You inspect and \
    modify files on the user's machine using your tools. Use absolute paths where possible. \
    Report what you did, not what you plan to do.";

/// System prompt for the system worker.
pub const SYSTEM_WORKER_PROMPT: &str = "You are a system assistant. You inspect the host and \
    run shell commands using your tools. Prefer read-only commands; destructive commands are \
    rejected. Report command output faithfully.";

/// System prompt for the researcher worker.
pub const RESEARCHER_WORKER_PROMPT: &str = "You are a research assistant. You read local \
    files and summarize their content. Keep summaries short and factual; the user's data \
    never leaves the machine.";

/// System prompt for the code worker.
pub const CODE_WORKER_PROMPT: &str = "You are a coding assistant. You read, analyze and write \
    code using your tools. Explain changes briefly and keep diffs minimal.";

/// The user's home directory, when the environment exposes one.
#[must_use]
pub fn home_dir() -> Option<String> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
}
