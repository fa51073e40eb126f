use tracing::info;

use crate::commands::{block_on, CommandResult, Session};

const COMMAND: &str = "ask";

/// Classifies one query and prints `{intent, confidence, reasoning, final_response}`.
/// With `trace` the analysis flags and the domain loop trace are included.
pub fn run(session: &Session, query: &str, trace: bool) -> CommandResult {
    let query = query.trim();
    if query.is_empty() {
        return CommandResult::failure(COMMAND, "bad_request", "query must not be empty", 2);
    }

    let runtime = session.runtime();
    info!(event_name = "cli.ask.start", service = session.service.name(), "answering query");

    if trace {
        match block_on(COMMAND, runtime.handle(query)) {
            Ok(outcome) => CommandResult::document(COMMAND, &outcome),
            Err(failure) => failure,
        }
    } else {
        match block_on(COMMAND, runtime.classify(query)) {
            Ok(report) => CommandResult::document(COMMAND, &report),
            Err(failure) => failure,
        }
    }
}
