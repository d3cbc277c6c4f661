use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

use askdb_core::prompts::SystemDirectives;

use crate::llm::{AssistantTurn, ModelClient, ModelError};
use crate::messages::{Message, ToolCall};
use crate::sessions::{ConversationStore, StoreError};
use crate::tools::ToolRegistry;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug)]
pub struct AskOutcome {
    pub answer: String,
    pub session_id: String,
    pub answered_at: DateTime<Utc>,
}

enum LoopState {
    Analyze,
    ExecuteTool(Vec<ToolCall>),
    Done(AssistantTurn),
}

/// Drives the ANALYZE ⇄ EXECUTE_TOOL loop for one question at a time.
///
/// The tool round-trip cap is enforced here, in code: once the budget is
/// spent, further tool requests from the model are ignored and its reply is
/// taken as the final answer. Tool failures degrade into the transcript as
/// structured error text; model failures abort the exchange.
pub struct AgentRuntime {
    store: Arc<ConversationStore>,
    registry: ToolRegistry,
    model: Arc<dyn ModelClient>,
    directives: SystemDirectives,
    max_tool_round_trips: u32,
}

impl AgentRuntime {
    pub fn new(
        store: Arc<ConversationStore>,
        registry: ToolRegistry,
        model: Arc<dyn ModelClient>,
        directives: SystemDirectives,
        max_tool_round_trips: u32,
    ) -> Self {
        // The cap is validated to 1..=8 at config load; a zero here is a
        // wiring bug, not a runtime condition.
        debug_assert!(max_tool_round_trips >= 1, "tool round-trip cap must be at least 1");
        Self { store, registry, model, directives, max_tool_round_trips }
    }

    pub async fn ask(
        &self,
        session_id: Option<&str>,
        question: &str,
    ) -> Result<AskOutcome, AgentError> {
        let session_id = self.store.get_or_create(session_id).await.session_id;
        let history = self.store.get(&session_id).await?;

        tracing::info!(
            event_name = "agent.ask_started",
            session_id = %session_id,
            history_len = history.len(),
            "processing question"
        );

        // The question is stored before the model runs: a failed exchange
        // still keeps the user turn available for a retry with context.
        let user_turn = Message::user(question);
        self.store.append(&session_id, vec![user_turn.clone()]).await?;

        let mut working = Vec::with_capacity(history.len() + 4);
        working.push(Message::system(self.directives.opening_directive()));
        working.extend(history);
        working.push(user_turn);

        let descriptors = self.registry.descriptors();
        let mut tool_round_trips = 0u32;
        let mut state = LoopState::Analyze;

        let final_turn = loop {
            state = match state {
                LoopState::Analyze => {
                    let reply = self.model.complete(&working, &descriptors).await?;
                    if !reply.tool_calls.is_empty() && tool_round_trips < self.max_tool_round_trips
                    {
                        working.push(reply.clone().into_message());
                        LoopState::ExecuteTool(reply.tool_calls)
                    } else {
                        LoopState::Done(reply)
                    }
                }
                LoopState::ExecuteTool(calls) => {
                    for call in calls {
                        working.push(self.run_tool_call(&session_id, call).await);
                    }
                    tool_round_trips += 1;
                    if tool_round_trips >= self.max_tool_round_trips {
                        working.push(Message::system(self.directives.post_tool.clone()));
                    }
                    LoopState::Analyze
                }
                LoopState::Done(turn) => break turn,
            };
        };

        let answer = final_turn.content;
        self.store.append(&session_id, vec![Message::assistant(answer.clone())]).await?;

        tracing::info!(
            event_name = "agent.ask_completed",
            session_id = %session_id,
            tool_round_trips,
            "question answered"
        );

        Ok(AskOutcome { answer, session_id, answered_at: Utc::now() })
    }

    async fn run_tool_call(&self, session_id: &str, call: ToolCall) -> Message {
        match self.registry.invoke(&call.name, call.arguments).await {
            Ok(value) => {
                tracing::info!(
                    event_name = "agent.tool_invoked",
                    session_id = %session_id,
                    tool = %call.name,
                    "tool call succeeded"
                );
                Message::tool_result(call.id, value.to_string())
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.tool_failed",
                    session_id = %session_id,
                    tool = %call.name,
                    error = %error,
                    "tool call failed; feeding error back to the model"
                );
                Message::tool_result(call.id, json!({ "error": error.to_string() }).to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use askdb_core::prompts::SystemDirectives;

    use crate::llm::{AssistantTurn, ModelClient, ModelError};
    use crate::messages::{Message, ToolCall};
    use crate::sessions::ConversationStore;
    use crate::tools::{Tool, ToolError, ToolRegistry};

    use super::{AgentError, AgentRuntime};

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<AssistantTurn, ModelError>>>,
        seen_transcripts: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<AssistantTurn, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen_transcripts: Mutex::new(Vec::new()),
            }
        }

        async fn transcripts(&self) -> Vec<Vec<Message>> {
            self.seen_transcripts.lock().await.clone()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[crate::tools::ToolDescriptor],
        ) -> Result<AssistantTurn, ModelError> {
            self.seen_transcripts.lock().await.push(messages.to_vec());
            self.replies.lock().await.pop_front().unwrap_or_else(|| {
                Err(ModelError::Unavailable { message: "script exhausted".to_string() })
            })
        }
    }

    struct RecordingTool {
        invocations: Arc<Mutex<Vec<Value>>>,
        result: Result<Value, &'static str>,
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &'static str {
            "run_sql"
        }

        fn description(&self) -> &'static str {
            "recording stand-in for the sql tool"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
            self.invocations.lock().await.push(arguments);
            match &self.result {
                Ok(value) => Ok(value.clone()),
                Err(message) => Err(ToolError::InvalidArguments {
                    tool: "run_sql".to_string(),
                    message: (*message).to_string(),
                }),
            }
        }
    }

    fn sql_tool_call(id: &str, query: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "run_sql".to_string(),
            arguments: json!({ "query": query }),
        }
    }

    fn runtime_with(
        model: Arc<ScriptedModel>,
        tool_result: Result<Value, &'static str>,
        max_tool_round_trips: u32,
    ) -> (AgentRuntime, Arc<ConversationStore>, Arc<Mutex<Vec<Value>>>) {
        let store = Arc::new(ConversationStore::new());
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::default();
        registry.register(RecordingTool {
            invocations: Arc::clone(&invocations),
            result: tool_result,
        });

        let runtime = AgentRuntime::new(
            Arc::clone(&store),
            registry,
            model,
            SystemDirectives::default(),
            max_tool_round_trips,
        );
        (runtime, store, invocations)
    }

    #[tokio::test]
    async fn answers_directly_when_no_tool_is_requested() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(AssistantTurn::answer(
            "There are 12 tables.",
        ))]));
        let (runtime, store, invocations) =
            runtime_with(Arc::clone(&model), Ok(json!({"rows": []})), 1);

        let outcome = runtime.ask(None, "what tables exist?").await.expect("ask");

        assert_eq!(outcome.answer, "There are 12 tables.");
        assert!(invocations.lock().await.is_empty());

        let transcript = store.get(&outcome.session_id).await.expect("transcript");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0], Message::user("what tables exist?"));
        assert_eq!(transcript[1], Message::assistant("There are 12 tables."));
    }

    #[tokio::test]
    async fn executes_one_tool_round_trip_and_injects_post_tool_directive() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(AssistantTurn {
                content: String::new(),
                tool_calls: vec![sql_tool_call("call-1", "select count(*) from orders")],
            }),
            Ok(AssistantTurn::answer("There are 99441 orders.")),
        ]));
        let (runtime, store, invocations) =
            runtime_with(Arc::clone(&model), Ok(json!({"row_count": 1, "rows": [{"c": 99441}]})), 1);

        let outcome = runtime.ask(None, "how many orders?").await.expect("ask");

        assert_eq!(outcome.answer, "There are 99441 orders.");
        assert_eq!(invocations.lock().await.len(), 1);
        assert_eq!(
            invocations.lock().await[0],
            json!({"query": "select count(*) from orders"})
        );

        // The second model call sees the tool result plus the closing system
        // directive; none of that is ever persisted.
        let transcripts = model.transcripts().await;
        assert_eq!(transcripts.len(), 2);
        let second = &transcripts[1];
        assert!(second
            .iter()
            .any(|message| matches!(message, Message::ToolResult { tool_call_id, .. } if tool_call_id == "call-1")));
        assert!(matches!(second.last(), Some(Message::System { .. })));

        let transcript = store.get(&outcome.session_id).await.expect("transcript");
        assert_eq!(transcript.len(), 2);
        assert!(transcript.iter().all(Message::is_persistable));
    }

    #[tokio::test]
    async fn round_trip_cap_is_enforced_regardless_of_model_requests() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(AssistantTurn {
                content: String::new(),
                tool_calls: vec![sql_tool_call("call-1", "select 1")],
            }),
            // The model misbehaves and keeps asking for tools past the budget.
            Ok(AssistantTurn {
                content: "Based on the first query: 1.".to_string(),
                tool_calls: vec![sql_tool_call("call-2", "select 2")],
            }),
        ]));
        let (runtime, _store, invocations) =
            runtime_with(Arc::clone(&model), Ok(json!({"rows": []})), 1);

        let outcome = runtime.ask(None, "chase the data").await.expect("ask");

        assert_eq!(outcome.answer, "Based on the first query: 1.");
        assert_eq!(invocations.lock().await.len(), 1, "second tool request must be ignored");
        assert_eq!(model.transcripts().await.len(), 2);
    }

    #[tokio::test]
    async fn configurable_cap_allows_a_second_round_trip() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(AssistantTurn {
                content: String::new(),
                tool_calls: vec![sql_tool_call("call-1", "select 1")],
            }),
            Ok(AssistantTurn {
                content: String::new(),
                tool_calls: vec![sql_tool_call("call-2", "select 2")],
            }),
            Ok(AssistantTurn::answer("Combined answer.")),
        ]));
        let (runtime, _store, invocations) =
            runtime_with(Arc::clone(&model), Ok(json!({"rows": []})), 2);

        let outcome = runtime.ask(None, "two-step question").await.expect("ask");

        assert_eq!(outcome.answer, "Combined answer.");
        assert_eq!(invocations.lock().await.len(), 2);
    }

    #[test]
    #[should_panic(expected = "tool round-trip cap")]
    fn zero_round_trip_cap_is_a_wiring_bug() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let _ = runtime_with(model, Ok(json!({"rows": []})), 0);
    }

    #[tokio::test]
    async fn tool_failure_is_fed_back_instead_of_aborting() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(AssistantTurn {
                content: String::new(),
                tool_calls: vec![sql_tool_call("call-1", "select 1")],
            }),
            Ok(AssistantTurn::answer("The query failed; try naming a table.")),
        ]));
        let (runtime, store, _invocations) =
            runtime_with(Arc::clone(&model), Err("expected a string `query` field"), 1);

        let outcome = runtime.ask(None, "broken question").await.expect("ask");

        assert_eq!(outcome.answer, "The query failed; try naming a table.");

        let transcripts = model.transcripts().await;
        let error_result = transcripts[1]
            .iter()
            .find_map(|message| match message {
                Message::ToolResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .expect("tool result present");
        assert!(error_result.contains("error"));
        assert!(error_result.contains("expected a string `query` field"));

        let transcript = store.get(&outcome.session_id).await.expect("transcript");
        assert_eq!(transcript.len(), 2);
    }

    #[tokio::test]
    async fn model_failure_is_fatal_but_keeps_the_user_turn() {
        let model = Arc::new(ScriptedModel::new(vec![Err(ModelError::Unavailable {
            message: "connection refused".to_string(),
        })]));
        let (runtime, store, _invocations) =
            runtime_with(Arc::clone(&model), Ok(json!({"rows": []})), 1);

        let session_id = store.get_or_create(None).await.session_id;
        let error = runtime.ask(Some(&session_id), "doomed question").await.expect_err("ask fails");

        assert!(matches!(error, AgentError::ModelUnavailable(_)));
        let transcript = store.get(&session_id).await.expect("transcript");
        assert_eq!(transcript, vec![Message::user("doomed question")]);
    }

    #[tokio::test]
    async fn sequential_asks_reuse_the_session_and_grow_by_two() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(AssistantTurn::answer("first answer")),
            Ok(AssistantTurn::answer("second answer")),
        ]));
        let (runtime, store, _invocations) =
            runtime_with(Arc::clone(&model), Ok(json!({"rows": []})), 1);

        let first = runtime.ask(None, "top 5 states by revenue").await.expect("first ask");
        let second = runtime
            .ask(Some(&first.session_id), "and by order count?")
            .await
            .expect("second ask");

        assert_eq!(first.session_id, second.session_id);

        let transcript = store.get(&first.session_id).await.expect("transcript");
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[0], Message::user("top 5 states by revenue"));
        assert_eq!(transcript[1], Message::assistant("first answer"));
        assert_eq!(transcript[2], Message::user("and by order count?"));
        assert_eq!(transcript[3], Message::assistant("second answer"));

        // The second exchange's working transcript starts from the stored
        // history: system directive + 2 prior turns + the new question.
        let transcripts = model.transcripts().await;
        assert_eq!(transcripts[1].len(), 4);
        assert!(matches!(transcripts[1][0], Message::System { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_request_degrades_into_error_result() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(AssistantTurn {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: "call-1".to_string(),
                    name: "drop_tables".to_string(),
                    arguments: json!({}),
                }],
            }),
            Ok(AssistantTurn::answer("I cannot do that.")),
        ]));
        let (runtime, _store, invocations) =
            runtime_with(Arc::clone(&model), Ok(json!({"rows": []})), 1);

        let outcome = runtime.ask(None, "wipe everything").await.expect("ask");

        assert_eq!(outcome.answer, "I cannot do that.");
        assert!(invocations.lock().await.is_empty(), "registered tool must not run");

        let transcripts = model.transcripts().await;
        let error_result = transcripts[1]
            .iter()
            .find_map(|message| match message {
                Message::ToolResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .expect("tool result present");
        assert!(error_result.contains("unknown tool"));
    }
}
