use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::guardrails::{QueryError, SqlGuardrail};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Machine-readable capability description handed to the model adapter.
#[derive(Clone, Debug, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema for the arguments payload.
    fn parameters_schema(&self) -> Value;
    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Named capability lookup table. The orchestrator dispatches model-requested
/// tool calls through here; unknown names come back as `ToolError`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = self
            .tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect::<Vec<_>>();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(arguments).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The default (and currently only) capability: run one guarded read-only SQL
/// query and return the matching rows.
pub struct SqlQueryTool {
    guardrail: SqlGuardrail,
}

impl SqlQueryTool {
    pub fn new(guardrail: SqlGuardrail) -> Self {
        Self { guardrail }
    }
}

#[async_trait]
impl Tool for SqlQueryTool {
    fn name(&self) -> &'static str {
        "run_sql"
    }

    fn description(&self) -> &'static str {
        "Execute a single read-only SQL query against the database and return \
         the matching rows as JSON. Only SELECT statements (including WITH \
         CTEs) are accepted, and results are capped at a bounded row count."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A single read-only SQL SELECT statement"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "run_sql".to_string(),
                message: "expected a string `query` field".to_string(),
            })?;

        let rows = self.guardrail.execute(query).await?;
        Ok(json!({ "row_count": rows.len(), "rows": rows }))
    }
}
