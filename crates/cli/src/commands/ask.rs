use serde::Serialize;

use askdb_agent::AgentError;
use askdb_core::config::AppConfig;

use crate::commands::{build_agent, CommandResult};

#[derive(Debug, Serialize)]
struct AskOutput {
    answer: String,
    session_id: String,
    answered_at: String,
}

pub async fn run(config: &AppConfig, question: &str) -> CommandResult {
    let (runtime, _store) = match build_agent(config).await {
        Ok(parts) => parts,
        Err(error) => return CommandResult::failure("ask", "bootstrap", error.to_string(), 1),
    };

    match runtime.ask(None, question).await {
        Ok(outcome) => {
            let payload = AskOutput {
                answer: outcome.answer,
                session_id: outcome.session_id,
                answered_at: outcome.answered_at.to_rfc3339(),
            };
            match serde_json::to_string_pretty(&payload) {
                Ok(output) => CommandResult::plain(output),
                Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 1),
            }
        }
        Err(error) => CommandResult::failure("ask", error_class(&error), error.to_string(), 1),
    }
}

fn error_class(error: &AgentError) -> &'static str {
    match error {
        AgentError::ModelUnavailable(_) => "model_unavailable",
        AgentError::Store(_) => "unknown_session",
    }
}
