//! The four stock workers.
//!
//! They differ only by tool set, system prompt and model binding. The
//! researcher binds the local summarization model so file contents never
//! leave the machine; the rest use the routing-class model.

use crate::model::ModelBinding;
use crate::prompts;
use crate::tools;
use crate::worker::Worker;

/// Node name of the filesystem worker.
pub const FILESYSTEM_WORKER: &str = "filesystem";
/// Node name of the system worker.
pub const SYSTEM_WORKER: &str = "system";
/// Node name of the researcher worker.
pub const RESEARCHER_WORKER: &str = "researcher";
/// Node name of the code worker.
pub const CODE_WORKER: &str = "code";

/// Build the stock worker set.
#[must_use]
pub fn stock_workers() -> Vec<Worker> {
    vec![
        Worker::new(
            FILESYSTEM_WORKER,
            "Lists, reads, writes and deletes files and directories.",
            prompts::FILESYSTEM_WORKER_PROMPT,
            tools::filesystem_registry(),
            ModelBinding::Routing,
        ),
        Worker::new(
            SYSTEM_WORKER,
            "Reports host information and runs whitelisted shell commands.",
            prompts::SYSTEM_WORKER_PROMPT,
            tools::system_registry(),
            ModelBinding::Routing,
        ),
        Worker::new(
            RESEARCHER_WORKER,
            "Reads and summarizes local files without sending their content to the cloud.",
            prompts::RESEARCHER_WORKER_PROMPT,
            tools::researcher_registry(),
            ModelBinding::Local,
        ),
        Worker::new(
            CODE_WORKER,
            "Reads, analyzes and writes code.",
            prompts::CODE_WORKER_PROMPT,
            tools::code_registry(),
            ModelBinding::Routing,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_roster_has_four_distinct_workers() {
        let workers = stock_workers();
        let names: Vec<&str> = workers.iter().map(Worker::name).collect();
        assert_eq!(
            names,
            [FILESYSTEM_WORKER, SYSTEM_WORKER, RESEARCHER_WORKER, CODE_WORKER]
        );
    }

    #[test]
    fn every_stock_worker_has_tools_and_a_description() {
        for worker in stock_workers() {
            assert!(!worker.registry().is_empty(), "{}", worker.name());
            assert!(!worker.description().is_empty(), "{}", worker.name());
        }
    }
}
