pub mod ask;
pub mod chat;
pub mod doctor;

use std::sync::Arc;

use serde::Serialize;

use askdb_agent::{
    AgentRuntime, ConversationStore, OpenAiClient, SqlGuardrail, SqlQueryTool, ToolRegistry,
};
use askdb_core::config::AppConfig;
use askdb_core::prompts::SystemDirectives;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn plain(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Shared bootstrap: pool, guardrail, tool registry, model client, and the
/// per-process conversation store, wired into one agent runtime.
pub(crate) async fn build_agent(
    config: &AppConfig,
) -> anyhow::Result<(AgentRuntime, Arc<ConversationStore>)> {
    let pool = askdb_db::connect(&config.database).await?;
    let guardrail = SqlGuardrail::new(pool, config.agent.row_limit);

    let mut registry = ToolRegistry::default();
    registry.register(SqlQueryTool::new(guardrail));

    let model = OpenAiClient::from_config(&config.llm)?;
    let directives = SystemDirectives::from_agent_config(&config.agent)?;

    let store = Arc::new(ConversationStore::new());
    let runtime = AgentRuntime::new(
        Arc::clone(&store),
        registry,
        Arc::new(model),
        directives,
        config.agent.max_tool_round_trips,
    );
    Ok((runtime, store))
}
