use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use askdb_core::config::LlmConfig;

use crate::llm::{AssistantTurn, ModelClient, ModelError};
use crate::messages::{Message, ToolCall};
use crate::tools::ToolDescriptor;

const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Chat-completions client for OpenAI and OpenAI-compatible servers (the
/// base URL is configurable, so an Ollama `/v1` endpoint works unchanged).
/// No automatic retry: a failed call surfaces as `ModelError` and the caller
/// decides.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| ModelError::Unavailable { message: error.to_string() })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<AssistantTurn, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            tools: tools.iter().map(|tool| WireTool { kind: "function", function: tool }).collect(),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.http.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|error| ModelError::Unavailable { message: error.to_string() })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| ModelError::Unavailable { message: error.to_string() })?;

        if !status.is_success() {
            return Err(ModelError::Unavailable {
                message: format!("http status {status}: {}", preview(&body)),
            });
        }

        parse_reply(&body)
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() <= ERROR_BODY_PREVIEW_CHARS {
        body.to_string()
    } else {
        body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect()
    }
}

fn to_wire(message: &Message) -> WireMessage {
    match message {
        Message::System { content } => WireMessage {
            role: "system",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::User { content } => WireMessage {
            role: "user",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Assistant { content, tool_calls } => WireMessage {
            role: "assistant",
            // The wire format expects null content on pure tool-call turns.
            content: (!content.is_empty() || tool_calls.is_empty()).then(|| content.clone()),
            tool_calls: (!tool_calls.is_empty()).then(|| {
                tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: None,
        },
        Message::ToolResult { tool_call_id, content } => WireMessage {
            role: "tool",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

fn parse_reply(body: &str) -> Result<AssistantTurn, ModelError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|error| ModelError::MalformedResponse { message: error.to_string() })?;
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        ModelError::MalformedResponse { message: "response carried no choices".to_string() }
    })?;

    let mut tool_calls = Vec::with_capacity(choice.message.tool_calls.len());
    for call in choice.message.tool_calls {
        let arguments =
            serde_json::from_str(&call.function.arguments).map_err(|error| {
                ModelError::MalformedResponse {
                    message: format!("tool call arguments are not valid JSON: {error}"),
                }
            })?;
        tool_calls.push(ToolCall { id: call.id, name: call.function.name, arguments });
    }

    Ok(AssistantTurn { content: choice.message.content.unwrap_or_default(), tool_calls })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDescriptor,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    // The wire format double-encodes arguments as a JSON string.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}
